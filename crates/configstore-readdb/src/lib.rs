//! Read model for the hierarchical config store.
//!
//! The read model is the query-side projection of the configuration
//! hierarchy (organizations, project groups, projects) and the secrets they
//! own. It is fed asynchronously by the write path through
//! [`ProjectionSink`] and queried through snapshot-isolated [`ReadTx`]
//! transactions acquired from a [`ReadModel`].
//!
//! # Backends
//!
//! - **Memory** (`memory` feature): copy-on-write snapshots, for tests and
//!   single-process deployments
//! - **SQLite** (`sqlite` feature): WAL database with one deferred
//!   transaction per snapshot

mod error;
mod traits;
mod types;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "config")]
mod config;

#[cfg(feature = "config")]
mod provider;

pub use error::{ReadDbError, ReadDbResult, UnknownNodeType};
pub use traits::{ProjectionSink, ReadModel, ReadTx};
pub use types::{
    Node, NodeId, NodeRef, NodeType, ParentPath, ParentRef, PathSegment, ProjectionEvent, Secret,
    SecretData, SecretId, SecretValue,
};

#[cfg(feature = "memory")]
pub use memory::MemoryReadDb;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteReadDb;

#[cfg(feature = "config")]
pub use config::ReadModelConfig;

#[cfg(feature = "config")]
pub use provider::ReadModelProvider;
