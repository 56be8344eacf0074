//! Transport-agnostic boundary for the four secret operations.

use std::sync::Arc;

use configstore_readdb::{NodeType, Secret, SecretId};
use http::StatusCode;
use thiserror::Error;

use crate::command::{CommandHandler, NewSecret};
use crate::error::{QueryError, QueryStage, SecretsError};
use crate::query::SecretQueryService;

/// Result type alias for boundary operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned across the boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A read query failed at some stage.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The request was rejected or a command failed.
    #[error(transparent)]
    Secrets(#[from] SecretsError),
}

impl ApiError {
    pub const fn error(&self) -> &SecretsError {
        match self {
            Self::Query(e) => e.error(),
            Self::Secrets(e) => e,
        }
    }

    /// The failing query stage, for read operations.
    pub const fn stage(&self) -> Option<QueryStage> {
        match self {
            Self::Query(e) => Some(e.stage()),
            Self::Secrets(_) => None,
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        self.error().status_code()
    }

    pub const fn error_type(&self) -> &'static str {
        self.error().error_type()
    }

    pub fn public_message(&self) -> String {
        self.error().public_message()
    }
}

/// Get, list, create and delete over a query service and a command handler.
#[derive(Clone)]
pub struct SecretsApi {
    queries: SecretQueryService,
    commands: Arc<dyn CommandHandler>,
}

impl SecretsApi {
    pub fn new(queries: SecretQueryService, commands: Arc<dyn CommandHandler>) -> Self {
        Self { queries, commands }
    }

    pub const fn queries(&self) -> &SecretQueryService {
        &self.queries
    }

    /// Looks up one secret by id. Absence is `Ok(None)`.
    pub async fn get_secret(&self, id: &str) -> ApiResult<Option<Secret>> {
        if id.is_empty() {
            return Err(SecretsError::invalid_reference(id, "secret id is empty").into());
        }
        Ok(self.queries.get_secret(&SecretId::new(id)).await?)
    }

    /// Lists the secrets of a node, or of the node and its ancestors when
    /// `tree` is set.
    pub async fn list_secrets(
        &self,
        owner_type: &str,
        owner_ref: &str,
        tree: bool,
    ) -> ApiResult<Vec<Secret>> {
        let owner_type = parse_node_type(owner_type)?;
        Ok(self.queries.list(owner_type, owner_ref, tree).await?)
    }

    pub async fn create_secret(
        &self,
        owner_type: &str,
        owner_ref: &str,
        secret: NewSecret,
    ) -> ApiResult<Secret> {
        let owner_type = parse_node_type(owner_type)?;
        Ok(self
            .commands
            .create_secret(owner_type, owner_ref, secret)
            .await?)
    }

    pub async fn delete_secret(
        &self,
        owner_type: &str,
        owner_ref: &str,
        name: &str,
    ) -> ApiResult<()> {
        let owner_type = parse_node_type(owner_type)?;
        Ok(self
            .commands
            .delete_secret(owner_type, owner_ref, name)
            .await?)
    }
}

impl std::fmt::Debug for SecretsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsApi")
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

fn parse_node_type(s: &str) -> Result<NodeType, SecretsError> {
    Ok(s.parse::<NodeType>()?)
}
