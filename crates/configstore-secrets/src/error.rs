//! Error types for secret resolution and queries.

use std::fmt;

use configstore_readdb::{NodeType, ReadDbError};
use http::StatusCode;
use thiserror::Error;

/// Result type alias using [`SecretsError`].
pub type SecretsResult<T> = Result<T, SecretsError>;

/// What a not-found or conflict error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A node of the given type, named by the caller.
    Node(NodeType),
    /// A parent referenced by a live node but missing from the snapshot.
    Ancestor,
    Secret,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(node_type) => write!(f, "{node_type}"),
            Self::Ancestor => f.write_str("ancestor"),
            Self::Secret => f.write_str("secret"),
        }
    }
}

/// Errors raised by the resolution engine and the write-side contract.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// The referenced node, ancestor or secret does not exist.
    #[error("{what} not found: {reference}")]
    NotFound {
        /// The kind of entity that was looked up.
        what: Entity,
        /// The reference as the caller supplied it.
        reference: String,
    },

    /// The reference is syntactically malformed.
    #[error("invalid reference {reference:?}: {reason}")]
    InvalidReference {
        /// The offending reference.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A secret payload failed domain validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A name is already taken under the same owner.
    #[error("{what} {name:?} already exists")]
    AlreadyExists {
        /// The kind of entity.
        what: Entity,
        /// The conflicting name.
        name: String,
    },

    /// The hierarchy in the read model is corrupted.
    #[error("hierarchy invariant violated: {0}")]
    InvariantViolation(String),

    /// No read snapshot could be acquired.
    #[error("failed to acquire read snapshot: {0}")]
    SnapshotAcquisition(String),

    /// A read inside an acquired snapshot failed.
    #[error("read model error: {0}")]
    ReadModel(#[from] ReadDbError),

    /// The projection pipeline stopped.
    #[error("projection error: {0}")]
    Projection(String),

    /// Backend not configured.
    #[error("secrets backend not configured")]
    NotConfigured,

    /// Unsupported backend type.
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SecretsError {
    pub fn not_found(what: Entity, reference: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            reference: reference.into(),
        }
    }

    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Transient failures the caller may retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SnapshotAcquisition(_))
    }

    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidReference { .. } => "invalid_reference",
            Self::Validation(_) => "validation_error",
            Self::AlreadyExists { .. } => "already_exists",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::SnapshotAcquisition(_) => "snapshot_acquisition",
            Self::ReadModel(_) => "read_model_error",
            Self::Projection(_) => "projection_error",
            Self::NotConfigured => "not_configured",
            Self::UnsupportedBackend(_) => "unsupported_backend",
            Self::Configuration(_) => "config_error",
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidReference { .. } | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists { .. } => StatusCode::CONFLICT,
            Self::SnapshotAcquisition(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvariantViolation(_)
            | Self::ReadModel(_)
            | Self::Projection(_)
            | Self::NotConfigured
            | Self::UnsupportedBackend(_)
            | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to a client. Server-side faults are reduced to
    /// a generic description.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            match self {
                Self::SnapshotAcquisition(_) => "read model temporarily unavailable".to_owned(),
                _ => "internal error".to_owned(),
            }
        } else {
            self.to_string()
        }
    }
}

impl From<configstore_readdb::UnknownNodeType> for SecretsError {
    fn from(e: configstore_readdb::UnknownNodeType) -> Self {
        Self::invalid_reference(e.0.clone(), e.to_string())
    }
}

/// The step of a query that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Snapshot,
    Resolution,
    Traversal,
    PathBuild,
    Fetch,
}

impl QueryStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Resolution => "resolution",
            Self::Traversal => "traversal",
            Self::PathBuild => "path_build",
            Self::Fetch => "fetch",
        }
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`SecretsError`] annotated with the query stage that raised it.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct QueryError {
    stage: QueryStage,
    #[source]
    error: SecretsError,
}

impl QueryError {
    #[must_use]
    pub const fn new(stage: QueryStage, error: SecretsError) -> Self {
        Self { stage, error }
    }

    #[must_use]
    pub const fn stage(&self) -> QueryStage {
        self.stage
    }

    #[must_use]
    pub const fn error(&self) -> &SecretsError {
        &self.error
    }

    #[must_use]
    pub fn into_error(self) -> SecretsError {
        self.error
    }
}

/// Adapter for `map_err` that tags an error with its stage.
pub(crate) fn at(stage: QueryStage) -> impl FnOnce(SecretsError) -> QueryError {
    move |error| QueryError::new(stage, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            SecretsError::not_found(Entity::Node(NodeType::Project), "p1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SecretsError::invalid_reference("", "empty").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SecretsError::SnapshotAcquisition("timed out".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            SecretsError::invariant("cycle").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn query_error_names_the_stage() {
        let err = QueryError::new(
            QueryStage::Resolution,
            SecretsError::not_found(Entity::Node(NodeType::Project), "p9"),
        );
        assert_eq!(err.to_string(), "resolution failed: project not found: p9");
        assert_eq!(err.stage(), QueryStage::Resolution);
        assert!(err.error().is_not_found());
    }

    #[test]
    fn public_message_hides_server_faults() {
        let err = SecretsError::invariant("cycle detected at node g-7");
        assert_eq!(err.public_message(), "internal error");

        let err = SecretsError::validation("name must not be empty");
        assert_eq!(err.public_message(), "validation failed: name must not be empty");
    }

    #[test]
    fn only_snapshot_failures_are_retryable() {
        assert!(SecretsError::SnapshotAcquisition("busy".into()).is_retryable());
        assert!(!SecretsError::invariant("cycle").is_retryable());
        assert!(!SecretsError::validation("bad").is_retryable());
    }
}
