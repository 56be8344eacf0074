use std::sync::Arc;

use crate::config::ReadModelConfig;
use crate::error::{ReadDbError, ReadDbResult};
use crate::traits::{ProjectionSink, ReadModel};

#[cfg(feature = "memory")]
use crate::memory::MemoryReadDb;

#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteReadDb;

/// Holds the two faces of one read model backend: the query side used by the
/// core and the projection side fed by the write path.
#[derive(Clone, Default)]
pub struct ReadModelProvider {
    model: Option<Arc<dyn ReadModel>>,
    sink: Option<Arc<dyn ProjectionSink>>,
}

impl ReadModelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_config(config: &ReadModelConfig) -> ReadDbResult<Self> {
        match config {
            #[cfg(feature = "memory")]
            ReadModelConfig::Memory => Ok(Self::from_backend(Arc::new(MemoryReadDb::new()))),

            #[cfg(feature = "sqlite")]
            ReadModelConfig::Sqlite {
                db_path,
                max_connections,
            } => {
                let db = SqliteReadDb::open(db_path, *max_connections).await?;
                Ok(Self::from_backend(Arc::new(db)))
            }

            #[allow(unreachable_patterns)]
            _ => Err(ReadDbError::UnsupportedBackend(
                "No suitable read model backend enabled".to_string(),
            )),
        }
    }

    /// Uses one backend for both faces.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ReadModel + ProjectionSink + 'static,
    {
        let model: Arc<dyn ReadModel> = backend.clone();
        let sink: Arc<dyn ProjectionSink> = backend;
        Self {
            model: Some(model),
            sink: Some(sink),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ReadModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProjectionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn model(&self) -> ReadDbResult<Arc<dyn ReadModel>> {
        self.model
            .clone()
            .ok_or(ReadDbError::NotConfigured("read model".to_string()))
    }

    pub fn sink(&self) -> ReadDbResult<Arc<dyn ProjectionSink>> {
        self.sink
            .clone()
            .ok_or(ReadDbError::NotConfigured("projection sink".to_string()))
    }
}

impl std::fmt::Debug for ReadModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadModelProvider")
            .field("model", &self.model.is_some())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_provider_is_not_configured() {
        let provider = ReadModelProvider::new();

        assert!(matches!(provider.model(), Err(ReadDbError::NotConfigured(_))));
        assert!(matches!(provider.sink(), Err(ReadDbError::NotConfigured(_))));
    }

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn provider_from_memory_config() {
        let provider = ReadModelProvider::from_config(&ReadModelConfig::Memory)
            .await
            .unwrap();

        assert!(provider.model().is_ok());
        assert!(provider.sink().is_ok());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn provider_from_sqlite_config() {
        use crate::traits::ReadTx as _;

        let dir = tempfile::TempDir::new().unwrap();
        let config = ReadModelConfig::Sqlite {
            db_path: dir.path().join("read.sqlite").display().to_string(),
            max_connections: 2,
        };
        let provider = ReadModelProvider::from_config(&config).await.unwrap();

        let mut tx = provider.model().unwrap().begin().await.unwrap();
        tx.release().await.unwrap();
    }

    #[cfg(feature = "memory")]
    #[test]
    fn provider_builder_pattern() {
        let db = Arc::new(MemoryReadDb::new());
        let provider = ReadModelProvider::new()
            .with_model(db.clone())
            .with_sink(db);

        assert!(provider.model().is_ok());
        assert!(provider.sink().is_ok());
    }
}
