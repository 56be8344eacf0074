//! Hierarchical secret resolution for the config store.
//!
//! Secrets are owned by nodes of a forest of organizations, project groups
//! and projects. This crate answers read queries against a snapshot-isolated
//! read model and defines the write-side contract whose committed changes
//! reach that read model asynchronously.
//!
//! # Queries
//!
//! [`SecretQueryService`] reads through exactly one read transaction per
//! call:
//!
//! - **resolve** maps a node type and reference (canonical id, root name, or
//!   name path such as `acme/backend/api`) to a canonical id;
//! - **list_owned** returns the secrets a node owns directly;
//! - **list_visible** returns the secrets of the node and all its ancestors,
//!   root first, with same-named secrets handled by a [`ShadowPolicy`].
//!
//! Every returned secret carries its owner's path in `parent.path`.
//!
//! # Writes
//!
//! [`CommandHandler`] validates and persists secret mutations. With the
//! `memory` feature, [`MemoryCommandHandler`] implements it and feeds the
//! read model through a background [`Projector`].
//!
//! # Example
//!
//! ```rust,ignore
//! use configstore_secrets::{SecretsConfig, SecretsProvider};
//!
//! let provider = SecretsProvider::from_config(&SecretsConfig::load()?).await?;
//! let api = provider.api()?;
//! let visible = api.list_secrets("project", "acme/backend/api", true).await?;
//! ```

mod api;
mod command;
mod error;
mod path;
mod projection;
mod query;
mod resolver;
mod walk;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "config")]
mod config;

#[cfg(feature = "config")]
mod provider;

pub use api::{ApiError, ApiResult, SecretsApi};
pub use command::{validate_data, validate_name, validate_new_secret, CommandHandler, NewSecret};
pub use error::{Entity, QueryError, QueryStage, SecretsError, SecretsResult};
pub use projection::{
    ProjectionBatch, ProjectionOptions, ProjectionPermit, ProjectionPublisher, Projector,
};
pub use query::{QueryOptions, QueryResult, SecretQueryService, ShadowPolicy};
pub use resolver::{resolve, ConfigRef, MAX_SEGMENT_LEN};

#[cfg(feature = "memory")]
pub use memory::MemoryCommandHandler;

#[cfg(feature = "config")]
pub use config::{ProjectionConfig, QueryConfig, SecretsConfig};

#[cfg(feature = "config")]
pub use provider::SecretsProvider;

/// Re-export of the read model crate.
pub use configstore_readdb as readdb;
