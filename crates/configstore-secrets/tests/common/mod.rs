//! Shared fixtures and read model test doubles.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use configstore_secrets::readdb::{
    MemoryReadDb, Node, NodeId, NodeType, ProjectionEvent, ReadDbError, ReadDbResult, ReadModel,
    ReadTx, Secret, SecretData, SecretId,
};
use rstest::fixture;

pub fn secret(id: &str, name: &str, owner_type: NodeType, owner: &str) -> Secret {
    Secret::new(
        name,
        owner_type,
        NodeId::new(owner),
        SecretData::internal([("value", format!("{name}@{owner}"))]),
    )
    .with_id(id)
}

/// A small forest:
///
/// ```text
/// acme (o1)                    secrets: db-password, shared-token
/// ├── backend (g1)             secrets: cache-url, db-password
/// │   └── payments (g2)
/// │       └── api (p1)         secrets: api-key, db-password
/// └── web (p2)                 secrets: web-key
/// globex (o2)
/// ```
#[fixture]
pub fn hierarchy() -> Vec<ProjectionEvent> {
    vec![
        ProjectionEvent::NodePut(Node::organization("o1", "acme")),
        ProjectionEvent::NodePut(Node::project_group("g1", "backend", "o1")),
        ProjectionEvent::NodePut(Node::project_group("g2", "payments", "g1")),
        ProjectionEvent::NodePut(Node::project("p1", "api", "g2")),
        ProjectionEvent::NodePut(Node::project("p2", "web", "o1")),
        ProjectionEvent::NodePut(Node::organization("o2", "globex")),
        ProjectionEvent::SecretPut(secret("s-o1-db", "db-password", NodeType::Organization, "o1")),
        ProjectionEvent::SecretPut(secret("s-o1-tok", "shared-token", NodeType::Organization, "o1")),
        ProjectionEvent::SecretPut(secret("s-g1-cache", "cache-url", NodeType::ProjectGroup, "g1")),
        ProjectionEvent::SecretPut(secret("s-g1-db", "db-password", NodeType::ProjectGroup, "g1")),
        ProjectionEvent::SecretPut(secret("s-p1-key", "api-key", NodeType::Project, "p1")),
        ProjectionEvent::SecretPut(secret("s-p1-db", "db-password", NodeType::Project, "p1")),
        ProjectionEvent::SecretPut(secret("s-p2-key", "web-key", NodeType::Project, "p2")),
    ]
}

/// A hierarchy whose groups point at each other.
#[fixture]
pub fn cyclic_hierarchy() -> Vec<ProjectionEvent> {
    vec![
        ProjectionEvent::NodePut(Node::project_group("g1", "left", "g2")),
        ProjectionEvent::NodePut(Node::project_group("g2", "right", "g1")),
        ProjectionEvent::NodePut(Node::project("p1", "trapped", "g1")),
        ProjectionEvent::SecretPut(secret("s-p1", "token", NodeType::Project, "p1")),
    ]
}

pub async fn memory_db(events: &[ProjectionEvent]) -> Arc<MemoryReadDb> {
    Arc::new(MemoryReadDb::seeded(events).await)
}

pub fn names(secrets: &[Secret]) -> Vec<&str> {
    secrets.iter().map(|s| s.name.as_str()).collect()
}

pub fn ids(secrets: &[Secret]) -> Vec<&str> {
    secrets.iter().map(|s| s.id.as_str()).collect()
}

/// Snapshot accounting shared between a model and its transactions.
#[derive(Debug, Default)]
pub struct Counters {
    begun: AtomicUsize,
    released: AtomicUsize,
}

impl Counters {
    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Wraps a read model to count snapshots and inject faults.
pub struct InstrumentedReadModel {
    inner: Arc<dyn ReadModel>,
    counters: Arc<Counters>,
    begin_delay: Duration,
    fail_begin: bool,
    fail_fetch_for: Option<NodeId>,
}

impl InstrumentedReadModel {
    pub fn new(inner: Arc<dyn ReadModel>) -> Self {
        Self {
            inner,
            counters: Arc::new(Counters::default()),
            begin_delay: Duration::ZERO,
            fail_begin: false,
            fail_fetch_for: None,
        }
    }

    pub fn with_begin_delay(mut self, delay: Duration) -> Self {
        self.begin_delay = delay;
        self
    }

    pub fn failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    /// Makes every secret fetch for `owner` fail.
    pub fn failing_fetch_for(mut self, owner: &str) -> Self {
        self.fail_fetch_for = Some(NodeId::new(owner));
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl ReadModel for InstrumentedReadModel {
    async fn begin(&self) -> ReadDbResult<Box<dyn ReadTx>> {
        if !self.begin_delay.is_zero() {
            tokio::time::sleep(self.begin_delay).await;
        }
        if self.fail_begin {
            return Err(ReadDbError::Connection("connection refused".into()));
        }
        let inner = self.inner.begin().await?;
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InstrumentedTx {
            inner,
            counters: Arc::clone(&self.counters),
            released: false,
            fail_fetch_for: self.fail_fetch_for.clone(),
        }))
    }
}

struct InstrumentedTx {
    inner: Box<dyn ReadTx>,
    counters: Arc<Counters>,
    released: bool,
    fail_fetch_for: Option<NodeId>,
}

#[async_trait]
impl ReadTx for InstrumentedTx {
    async fn node(&mut self, id: &NodeId) -> ReadDbResult<Option<Node>> {
        self.inner.node(id).await
    }

    async fn child_by_name(
        &mut self,
        parent: Option<&NodeId>,
        node_type: NodeType,
        name: &str,
    ) -> ReadDbResult<Option<Node>> {
        self.inner.child_by_name(parent, node_type, name).await
    }

    async fn secret(&mut self, id: &SecretId) -> ReadDbResult<Option<Secret>> {
        self.inner.secret(id).await
    }

    async fn secret_by_name(
        &mut self,
        owner: &NodeId,
        name: &str,
    ) -> ReadDbResult<Option<Secret>> {
        self.inner.secret_by_name(owner, name).await
    }

    async fn secrets_owned_by(&mut self, owner: &NodeId) -> ReadDbResult<Vec<Secret>> {
        if self.fail_fetch_for.as_ref() == Some(owner) {
            return Err(ReadDbError::Database(format!("injected failure for {owner}")));
        }
        self.inner.secrets_owned_by(owner).await
    }

    async fn release(&mut self) -> ReadDbResult<()> {
        if !self.released {
            self.released = true;
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.release().await
    }
}
