//! In-memory read model built on copy-on-write snapshots.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{ReadDbError, ReadDbResult};
use crate::traits::{ProjectionSink, ReadModel, ReadTx};
use crate::types::{Node, NodeId, NodeType, ProjectionEvent, Secret, SecretId};

/// Sibling-name index key: parent, type, name.
type ChildKey = (Option<NodeId>, NodeType, String);

#[derive(Debug, Clone, Default)]
struct Snapshot {
    nodes: HashMap<NodeId, Node>,
    children: HashMap<ChildKey, NodeId>,
    secrets: HashMap<SecretId, Secret>,
    owned: HashMap<NodeId, BTreeMap<String, SecretId>>,
}

impl Snapshot {
    fn child_key(node: &Node) -> ChildKey {
        (node.parent.clone(), node.node_type, node.name.clone())
    }

    fn put_node(&mut self, node: Node) {
        if let Some(previous) = self.nodes.get(&node.id) {
            let key = Self::child_key(previous);
            self.children.remove(&key);
        }
        self.children.insert(Self::child_key(&node), node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    fn remove_node(&mut self, id: &NodeId) {
        if let Some(previous) = self.nodes.remove(id) {
            self.children.remove(&Self::child_key(&previous));
        }
    }

    fn put_secret(&mut self, mut secret: Secret) {
        secret.parent.path = None;
        if let Some(previous) = self.secrets.get(&secret.id) {
            if let Some(names) = self.owned.get_mut(&previous.parent.id) {
                names.remove(&previous.name);
            }
        }
        self.owned
            .entry(secret.parent.id.clone())
            .or_default()
            .insert(secret.name.clone(), secret.id.clone());
        self.secrets.insert(secret.id.clone(), secret);
    }

    fn remove_secret(&mut self, id: &SecretId) {
        if let Some(previous) = self.secrets.remove(id) {
            if let Some(names) = self.owned.get_mut(&previous.parent.id) {
                names.remove(&previous.name);
                if names.is_empty() {
                    self.owned.remove(&previous.parent.id);
                }
            }
        }
    }

    fn apply(&mut self, event: &ProjectionEvent) {
        match event {
            ProjectionEvent::NodePut(node) => self.put_node(node.clone()),
            ProjectionEvent::NodeRemoved(id) => self.remove_node(id),
            ProjectionEvent::SecretPut(secret) => self.put_secret(secret.clone()),
            ProjectionEvent::SecretRemoved(id) => self.remove_secret(id),
        }
    }
}

/// In-memory read model.
///
/// The whole state is an immutable snapshot behind an `Arc`. A read
/// transaction holds one `Arc`, and every applied batch publishes a fresh
/// snapshot, so readers never observe a half-applied batch.
///
/// The store does not validate hierarchy invariants; it mirrors whatever the
/// write path projects into it.
#[derive(Debug, Clone, Default)]
pub struct MemoryReadDb {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl MemoryReadDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a read model pre-populated with the given events.
    pub async fn seeded(events: &[ProjectionEvent]) -> Self {
        let db = Self::new();
        db.publish(events).await;
        db
    }

    async fn publish(&self, events: &[ProjectionEvent]) {
        let mut current = self.current.write().await;
        let mut next = Snapshot::clone(&current);
        for event in events {
            next.apply(event);
        }
        *current = Arc::new(next);
    }
}

#[async_trait]
impl ReadModel for MemoryReadDb {
    async fn begin(&self) -> ReadDbResult<Box<dyn ReadTx>> {
        let snapshot = Arc::clone(&*self.current.read().await);
        Ok(Box::new(MemoryTx {
            snapshot: Some(snapshot),
        }))
    }
}

#[async_trait]
impl ProjectionSink for MemoryReadDb {
    async fn apply(&self, events: &[ProjectionEvent]) -> ReadDbResult<()> {
        self.publish(events).await;
        tracing::debug!(events = events.len(), "Projection batch applied");
        Ok(())
    }
}

struct MemoryTx {
    snapshot: Option<Arc<Snapshot>>,
}

impl MemoryTx {
    fn snapshot(&self) -> ReadDbResult<&Snapshot> {
        self.snapshot.as_deref().ok_or(ReadDbError::Closed)
    }
}

#[async_trait]
impl ReadTx for MemoryTx {
    async fn node(&mut self, id: &NodeId) -> ReadDbResult<Option<Node>> {
        Ok(self.snapshot()?.nodes.get(id).cloned())
    }

    async fn child_by_name(
        &mut self,
        parent: Option<&NodeId>,
        node_type: NodeType,
        name: &str,
    ) -> ReadDbResult<Option<Node>> {
        let snapshot = self.snapshot()?;
        let key = (parent.cloned(), node_type, name.to_owned());
        Ok(snapshot
            .children
            .get(&key)
            .and_then(|id| snapshot.nodes.get(id))
            .cloned())
    }

    async fn secret(&mut self, id: &SecretId) -> ReadDbResult<Option<Secret>> {
        Ok(self.snapshot()?.secrets.get(id).cloned())
    }

    async fn secret_by_name(
        &mut self,
        owner: &NodeId,
        name: &str,
    ) -> ReadDbResult<Option<Secret>> {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .owned
            .get(owner)
            .and_then(|names| names.get(name))
            .and_then(|id| snapshot.secrets.get(id))
            .cloned())
    }

    async fn secrets_owned_by(&mut self, owner: &NodeId) -> ReadDbResult<Vec<Secret>> {
        let snapshot = self.snapshot()?;
        let Some(names) = snapshot.owned.get(owner) else {
            return Ok(Vec::new());
        };
        Ok(names
            .values()
            .filter_map(|id| snapshot.secrets.get(id))
            .cloned()
            .collect())
    }

    async fn release(&mut self) -> ReadDbResult<()> {
        self.snapshot = None;
        Ok(())
    }
}
