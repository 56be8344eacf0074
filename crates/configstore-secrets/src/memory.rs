//! In-memory command handler for testing and development.

use std::sync::Arc;

use async_trait::async_trait;
use configstore_readdb::{
    MemoryReadDb, Node, NodeId, NodeType, ProjectionEvent, ProjectionSink, ReadModel, ReadTx,
    Secret,
};
use tokio::sync::Mutex;

use crate::command::{validate_name, validate_new_secret, CommandHandler, NewSecret};
use crate::error::{Entity, SecretsError, SecretsResult};
use crate::projection::{ProjectionBatch, ProjectionOptions, ProjectionPublisher, Projector};
use crate::resolver;

/// Reference implementation of the write path.
///
/// Keeps its own authoritative state, validates every mutation against it,
/// and forwards committed changes to a read model through a [`Projector`].
/// Commits are serialised, so sequence numbers follow commit order.
///
/// Must be created within a Tokio runtime.
pub struct MemoryCommandHandler {
    state: MemoryReadDb,
    /// Sequence number of the last commit.
    commit: Mutex<u64>,
    publisher: ProjectionPublisher,
    projector: Projector,
    max_depth: usize,
}

impl MemoryCommandHandler {
    /// Creates a handler projecting into `read_model` with default options.
    pub fn new(read_model: Arc<dyn ProjectionSink>) -> Self {
        Self::with_options(read_model, ProjectionOptions::default(), 64)
    }

    pub fn with_options(
        read_model: Arc<dyn ProjectionSink>,
        options: ProjectionOptions,
        max_depth: usize,
    ) -> Self {
        let (publisher, projector) = Projector::spawn(read_model, options);
        Self {
            state: MemoryReadDb::new(),
            commit: Mutex::new(0),
            publisher,
            projector,
            max_depth,
        }
    }

    /// Creates a root organization with a generated id.
    pub async fn create_organization(&self, name: &str) -> SecretsResult<Node> {
        self.create_node(Node::organization(NodeId::generate(), name))
            .await
    }

    /// Creates a project group under the referenced organization or group.
    pub async fn create_project_group(
        &self,
        name: &str,
        parent_type: NodeType,
        parent_ref: &str,
    ) -> SecretsResult<Node> {
        self.create_child(NodeType::ProjectGroup, name, parent_type, parent_ref)
            .await
    }

    /// Creates a project under the referenced organization or group.
    pub async fn create_project(
        &self,
        name: &str,
        parent_type: NodeType,
        parent_ref: &str,
    ) -> SecretsResult<Node> {
        self.create_child(NodeType::Project, name, parent_type, parent_ref)
            .await
    }

    /// Creates a node with a caller-chosen id. The parent, if any, is given
    /// by canonical id.
    pub async fn create_node(&self, node: Node) -> SecretsResult<Node> {
        let mut sequence = self.commit.lock().await;

        let mut tx = self.state.begin().await?;
        let checked = check_node(tx.as_mut(), &node).await;
        tx.release().await?;
        checked?;

        self.commit(&mut sequence, vec![ProjectionEvent::NodePut(node.clone())])
            .await?;
        tracing::info!(
            node.id = %node.id,
            node.name = %node.name,
            node_type = %node.node_type,
            "Node created"
        );
        Ok(node)
    }

    async fn create_child(
        &self,
        node_type: NodeType,
        name: &str,
        parent_type: NodeType,
        parent_ref: &str,
    ) -> SecretsResult<Node> {
        let mut sequence = self.commit.lock().await;

        let mut tx = self.state.begin().await?;
        let checked = async {
            let parent =
                resolver::resolve(tx.as_mut(), parent_type, parent_ref, self.max_depth).await?;
            let node = Node {
                id: NodeId::generate(),
                node_type,
                name: name.to_owned(),
                parent: Some(parent.id),
            };
            check_node(tx.as_mut(), &node).await?;
            Ok::<_, SecretsError>(node)
        }
        .await;
        tx.release().await?;
        let node = checked?;

        self.commit(&mut sequence, vec![ProjectionEvent::NodePut(node.clone())])
            .await?;
        tracing::info!(
            node.id = %node.id,
            node.name = %node.name,
            node_type = %node.node_type,
            "Node created"
        );
        Ok(node)
    }

    /// Sequence number of the last committed change.
    pub async fn committed_sequence(&self) -> u64 {
        *self.commit.lock().await
    }

    /// Sequence number of the last change visible in the read model.
    pub fn applied_sequence(&self) -> u64 {
        self.projector.applied_sequence()
    }

    /// Waits until the change with `sequence` is visible in the read model.
    pub async fn wait_for_sequence(&self, sequence: u64) -> SecretsResult<()> {
        self.projector.wait_for_sequence(sequence).await
    }

    /// Waits until every change committed so far is visible in the read
    /// model.
    pub async fn sync(&self) -> SecretsResult<()> {
        let sequence = self.committed_sequence().await;
        self.wait_for_sequence(sequence).await
    }

    pub const fn projector(&self) -> &Projector {
        &self.projector
    }

    /// Applies events to the authoritative state and queues them for
    /// projection. The caller holds the commit lock.
    ///
    /// Nothing changes unless the batch can be queued.
    async fn commit(&self, sequence: &mut u64, events: Vec<ProjectionEvent>) -> SecretsResult<u64> {
        let permit = self.publisher.reserve().await?;
        self.state.apply(&events).await?;
        *sequence += 1;
        permit.send(ProjectionBatch {
            sequence: *sequence,
            events,
        });
        Ok(*sequence)
    }
}

impl std::fmt::Debug for MemoryCommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCommandHandler")
            .field("applied_sequence", &self.projector.applied_sequence())
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

/// Enforces hierarchy rules and sibling-name uniqueness for a new node.
async fn check_node(tx: &mut dyn ReadTx, node: &Node) -> SecretsResult<()> {
    validate_name(&node.name)?;

    if tx.node(&node.id).await?.is_some() {
        return Err(SecretsError::AlreadyExists {
            what: Entity::Node(node.node_type),
            name: node.id.to_string(),
        });
    }

    match (&node.parent, node.node_type.is_root()) {
        (None, true) => {}
        (Some(_), true) => {
            return Err(SecretsError::validation(format!(
                "{} cannot have a parent",
                node.node_type
            )));
        }
        (None, false) => {
            return Err(SecretsError::validation(format!(
                "{} requires a parent",
                node.node_type
            )));
        }
        (Some(parent_id), false) => {
            let parent = tx
                .node(parent_id)
                .await?
                .ok_or_else(|| SecretsError::not_found(Entity::Ancestor, parent_id.as_str()))?;
            if !parent.node_type.can_parent() {
                return Err(SecretsError::validation(format!(
                    "{} {} cannot have children",
                    parent.node_type, parent.id
                )));
            }
        }
    }

    if tx
        .child_by_name(node.parent.as_ref(), node.node_type, &node.name)
        .await?
        .is_some()
    {
        return Err(SecretsError::AlreadyExists {
            what: Entity::Node(node.node_type),
            name: node.name.clone(),
        });
    }
    Ok(())
}

#[async_trait]
impl CommandHandler for MemoryCommandHandler {
    async fn create_secret(
        &self,
        owner_type: NodeType,
        owner_ref: &str,
        secret: NewSecret,
    ) -> SecretsResult<Secret> {
        validate_new_secret(&secret)?;

        let mut sequence = self.commit.lock().await;

        let mut tx = self.state.begin().await?;
        let checked = async {
            let owner =
                resolver::resolve(tx.as_mut(), owner_type, owner_ref, self.max_depth).await?;
            if tx.secret_by_name(&owner.id, &secret.name).await?.is_some() {
                return Err(SecretsError::AlreadyExists {
                    what: Entity::Secret,
                    name: secret.name.clone(),
                });
            }
            Ok::<_, SecretsError>(owner)
        }
        .await;
        tx.release().await?;
        let owner = checked?;

        let created = Secret::new(secret.name, owner.node_type, owner.id, secret.data);
        self.commit(&mut sequence, vec![ProjectionEvent::SecretPut(created.clone())])
            .await?;

        tracing::info!(
            secret.name = %created.name,
            secret.owner = %created.owner(),
            secret.operation = "create",
            "Secret created"
        );
        Ok(created)
    }

    async fn delete_secret(
        &self,
        owner_type: NodeType,
        owner_ref: &str,
        name: &str,
    ) -> SecretsResult<()> {
        let mut sequence = self.commit.lock().await;

        let mut tx = self.state.begin().await?;
        let checked = async {
            let owner =
                resolver::resolve(tx.as_mut(), owner_type, owner_ref, self.max_depth).await?;
            let existing = tx
                .secret_by_name(&owner.id, name)
                .await?
                .ok_or_else(|| SecretsError::not_found(Entity::Secret, name))?;
            Ok::<_, SecretsError>(existing)
        }
        .await;
        tx.release().await?;
        let existing = checked?;

        self.commit(&mut sequence, vec![ProjectionEvent::SecretRemoved(existing.id.clone())])
            .await?;

        tracing::info!(
            secret.name = %name,
            secret.owner = %existing.owner(),
            secret.operation = "delete",
            "Secret deleted"
        );
        Ok(())
    }
}
