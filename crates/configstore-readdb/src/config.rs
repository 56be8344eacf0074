use serde::Deserialize;

/// Selects and configures the read model backend.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ReadModelConfig {
    #[default]
    Memory,
    #[cfg(feature = "sqlite")]
    Sqlite {
        db_path: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

#[cfg(feature = "sqlite")]
const fn default_max_connections() -> u32 {
    5
}
