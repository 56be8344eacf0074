//! Provider factory wiring a read model, the query service and a command
//! handler from configuration.

use std::sync::Arc;

use configstore_readdb::{ReadDbError, ReadModelProvider};

use crate::api::SecretsApi;
use crate::command::CommandHandler;
use crate::config::SecretsConfig;
use crate::error::{SecretsError, SecretsResult};
use crate::query::SecretQueryService;

#[cfg(feature = "memory")]
use crate::memory::MemoryCommandHandler;

/// Provider for the secrets engine.
///
/// Follows the same factory pattern as `ReadModelProvider`: built from
/// configuration or assembled with `with_*` methods, and reporting
/// `NotConfigured` for missing parts.
#[derive(Clone, Default)]
#[must_use]
pub struct SecretsProvider {
    queries: Option<SecretQueryService>,
    commands: Option<Arc<dyn CommandHandler>>,
    #[cfg(feature = "memory")]
    memory: Option<Arc<MemoryCommandHandler>>,
}

impl SecretsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider from configuration.
    ///
    /// The read model is opened according to `read_model`. With the `memory`
    /// feature, a [`MemoryCommandHandler`] feeding that read model is
    /// installed as the write path. Must be called within a Tokio runtime.
    pub async fn from_config(config: &SecretsConfig) -> SecretsResult<Self> {
        let read_model = ReadModelProvider::from_config(&config.read_model)
            .await
            .map_err(backend_error)?;
        let queries = SecretQueryService::with_options(
            read_model.model().map_err(backend_error)?,
            config.query.to_options(),
        );

        let provider = Self::new().with_queries(queries);

        #[cfg(feature = "memory")]
        let provider = {
            let handler = Arc::new(MemoryCommandHandler::with_options(
                read_model.sink().map_err(backend_error)?,
                config.projection.to_options(),
                config.query.max_depth,
            ));
            provider.with_memory_commands(handler)
        };

        Ok(provider)
    }

    pub fn with_queries(mut self, queries: SecretQueryService) -> Self {
        self.queries = Some(queries);
        self
    }

    pub fn with_commands(mut self, commands: Arc<dyn CommandHandler>) -> Self {
        self.commands = Some(commands);
        #[cfg(feature = "memory")]
        {
            self.memory = None;
        }
        self
    }

    /// Installs an in-memory command handler, keeping it reachable for
    /// seeding nodes.
    #[cfg(feature = "memory")]
    pub fn with_memory_commands(mut self, handler: Arc<MemoryCommandHandler>) -> Self {
        let commands: Arc<dyn CommandHandler> = handler.clone();
        self.commands = Some(commands);
        self.memory = Some(handler);
        self
    }

    pub fn queries(&self) -> SecretsResult<&SecretQueryService> {
        self.queries.as_ref().ok_or(SecretsError::NotConfigured)
    }

    pub fn commands(&self) -> SecretsResult<Arc<dyn CommandHandler>> {
        self.commands.clone().ok_or(SecretsError::NotConfigured)
    }

    /// The in-memory command handler, when that is the installed write path.
    #[cfg(feature = "memory")]
    pub fn memory_commands(&self) -> SecretsResult<Arc<MemoryCommandHandler>> {
        self.memory.clone().ok_or(SecretsError::NotConfigured)
    }

    /// Assembles the boundary over the configured services.
    pub fn api(&self) -> SecretsResult<SecretsApi> {
        Ok(SecretsApi::new(self.queries()?.clone(), self.commands()?))
    }
}

fn backend_error(e: ReadDbError) -> SecretsError {
    match e {
        ReadDbError::NotConfigured(_) => SecretsError::NotConfigured,
        ReadDbError::UnsupportedBackend(msg) => SecretsError::UnsupportedBackend(msg),
        other => SecretsError::Configuration(other.to_string()),
    }
}

impl std::fmt::Debug for SecretsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsProvider")
            .field("queries", &self.queries.is_some())
            .field("commands", &self.commands.is_some())
            .finish()
    }
}
