use async_trait::async_trait;

use crate::error::ReadDbResult;
use crate::types::{Node, NodeId, NodeType, ProjectionEvent, Secret, SecretId};

/// A snapshot-isolated source of hierarchy and secret data.
///
/// Every read issued through one [`ReadTx`] observes the store as of a single
/// instant. Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait ReadModel: Send + Sync {
    /// Acquires a read transaction pinned to the current snapshot.
    async fn begin(&self) -> ReadDbResult<Box<dyn ReadTx>>;
}

/// Reads scoped to one acquired snapshot.
///
/// Secrets returned from a read transaction never carry a parent path.
#[async_trait]
pub trait ReadTx: Send {
    async fn node(&mut self, id: &NodeId) -> ReadDbResult<Option<Node>>;

    /// Looks up a node by name among the children of `parent`, or among the
    /// roots when `parent` is `None`.
    async fn child_by_name(
        &mut self,
        parent: Option<&NodeId>,
        node_type: NodeType,
        name: &str,
    ) -> ReadDbResult<Option<Node>>;

    async fn secret(&mut self, id: &SecretId) -> ReadDbResult<Option<Secret>>;

    async fn secret_by_name(&mut self, owner: &NodeId, name: &str)
        -> ReadDbResult<Option<Secret>>;

    /// Returns the secrets owned directly by `owner`, ordered by name.
    async fn secrets_owned_by(&mut self, owner: &NodeId) -> ReadDbResult<Vec<Secret>>;

    /// Releases the snapshot. Reads after release fail with `Closed`.
    /// Releasing twice is a no-op.
    async fn release(&mut self) -> ReadDbResult<()>;
}

/// The write side of a read model, fed by the projector.
#[async_trait]
pub trait ProjectionSink: Send + Sync {
    /// Applies a batch of committed events atomically: readers observe either
    /// none or all of them.
    async fn apply(&self, events: &[ProjectionEvent]) -> ReadDbResult<()>;
}
