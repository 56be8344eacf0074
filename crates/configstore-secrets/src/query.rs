//! Read-side queries over one snapshot per call.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use configstore_readdb::{
    Node, NodeId, NodeRef, NodeType, ParentPath, ReadModel, ReadTx, Secret, SecretId,
};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{at, QueryError, QueryStage, SecretsError};
use crate::path::{self, PathCache};
use crate::{resolver, walk};

/// Result type alias for read queries.
pub type QueryResult<T> = Result<T, QueryError>;

/// How same-named secrets along an ancestor chain are reported in tree mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowPolicy {
    /// Every owner's secret is returned, each with its own path.
    #[default]
    Union,
    /// Only the secret of the nearest owner is returned.
    Nearest,
}

/// Tunables for [`SecretQueryService`].
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Upper bound on acquiring a read snapshot.
    pub snapshot_timeout: Duration,
    /// Maximum number of nodes on any root-to-node chain.
    pub max_depth: usize,
    pub shadowing: ShadowPolicy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            snapshot_timeout: Duration::from_millis(5000),
            max_depth: 64,
            shadowing: ShadowPolicy::Union,
        }
    }
}

/// Answers resolution, path and secret listing queries.
///
/// Each public method reads through exactly one read transaction, acquired
/// before its first read and released on every exit path, so all of its
/// answers describe the same instant of the read model.
#[derive(Clone)]
pub struct SecretQueryService {
    model: Arc<dyn ReadModel>,
    options: QueryOptions,
}

impl SecretQueryService {
    pub fn new(model: Arc<dyn ReadModel>) -> Self {
        Self::with_options(model, QueryOptions::default())
    }

    pub fn with_options(model: Arc<dyn ReadModel>, options: QueryOptions) -> Self {
        Self { model, options }
    }

    pub const fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Resolves a reference to a canonical node id.
    #[instrument(skip(self))]
    pub async fn resolve(&self, node_type: NodeType, reference: &str) -> QueryResult<NodeId> {
        let mut tx = self.acquire().await?;
        let result = self
            .resolve_in(tx.as_mut(), node_type, reference)
            .await
            .map(|node| node.id);
        Self::finish(tx, result).await
    }

    /// Returns the root-first path of a node, inclusive of the node.
    #[instrument(skip(self, id), fields(node.id = %id))]
    pub async fn build_path(&self, node_type: NodeType, id: &NodeId) -> QueryResult<ParentPath> {
        let mut tx = self.acquire().await?;
        let result = path::build_path(tx.as_mut(), node_type, id, self.options.max_depth)
            .await
            .map_err(at(QueryStage::PathBuild));
        Self::finish(tx, result).await
    }

    /// Returns the node and all of its ancestors, root first.
    #[instrument(skip(self, id), fields(node.id = %id))]
    pub async fn ancestor_chain(
        &self,
        node_type: NodeType,
        id: &NodeId,
    ) -> QueryResult<Vec<NodeRef>> {
        let mut tx = self.acquire().await?;
        let result = self.chain_in(tx.as_mut(), node_type, id).await;
        Self::finish(tx, result.map(|chain| walk::chain_refs(&chain))).await
    }

    /// Secrets owned exactly by the referenced node, ordered by name.
    #[instrument(skip(self))]
    pub async fn list_owned(&self, node_type: NodeType, reference: &str) -> QueryResult<Vec<Secret>> {
        let mut tx = self.acquire().await?;
        let result = self.list_owned_in(tx.as_mut(), node_type, reference).await;
        Self::finish(tx, result).await
    }

    /// Secrets owned by the referenced node or any of its ancestors.
    ///
    /// Results are grouped by level, root first, and ordered by name within a
    /// level. Same-named secrets are reported according to the configured
    /// [`ShadowPolicy`].
    #[instrument(skip(self))]
    pub async fn list_visible(
        &self,
        node_type: NodeType,
        reference: &str,
    ) -> QueryResult<Vec<Secret>> {
        let mut tx = self.acquire().await?;
        let result = self.list_visible_in(tx.as_mut(), node_type, reference).await;
        Self::finish(tx, result).await
    }

    /// Direct or tree listing depending on `tree`.
    pub async fn list(
        &self,
        node_type: NodeType,
        reference: &str,
        tree: bool,
    ) -> QueryResult<Vec<Secret>> {
        if tree {
            self.list_visible(node_type, reference).await
        } else {
            self.list_owned(node_type, reference).await
        }
    }

    /// Point lookup by secret id. Absence is `Ok(None)`.
    #[instrument(skip(self, id), fields(secret.id = %id))]
    pub async fn get_secret(&self, id: &SecretId) -> QueryResult<Option<Secret>> {
        let mut tx = self.acquire().await?;
        let result = self.get_secret_in(tx.as_mut(), id).await;
        Self::finish(tx, result).await
    }

    async fn acquire(&self) -> QueryResult<Box<dyn ReadTx>> {
        let timeout = self.options.snapshot_timeout;
        match tokio::time::timeout(timeout, self.model.begin()).await {
            Ok(Ok(tx)) => Ok(tx),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to acquire read snapshot");
                Err(QueryError::new(
                    QueryStage::Snapshot,
                    SecretsError::SnapshotAcquisition(e.to_string()),
                ))
            }
            Err(_) => {
                tracing::warn!(?timeout, "Read snapshot timed out");
                Err(QueryError::new(
                    QueryStage::Snapshot,
                    SecretsError::SnapshotAcquisition(format!("timed out after {timeout:?}")),
                ))
            }
        }
    }

    /// Releases the snapshot and merges the outcome with the query result.
    async fn finish<T>(mut tx: Box<dyn ReadTx>, result: QueryResult<T>) -> QueryResult<T> {
        let released = tx.release().await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(QueryError::new(QueryStage::Snapshot, e.into())),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(e)) => {
                tracing::warn!(error = %e, "Failed to release read snapshot");
                Err(err)
            }
        }
    }

    async fn resolve_in(
        &self,
        tx: &mut dyn ReadTx,
        node_type: NodeType,
        reference: &str,
    ) -> QueryResult<Node> {
        resolver::resolve(tx, node_type, reference, self.options.max_depth)
            .await
            .map_err(at(QueryStage::Resolution))
    }

    async fn chain_in(
        &self,
        tx: &mut dyn ReadTx,
        node_type: NodeType,
        id: &NodeId,
    ) -> QueryResult<Vec<Node>> {
        let start = walk::load_node(tx, node_type, id)
            .await
            .map_err(at(QueryStage::Traversal))?;
        walk::ancestors(tx, start, self.options.max_depth)
            .await
            .map_err(at(QueryStage::Traversal))
    }

    async fn list_owned_in(
        &self,
        tx: &mut dyn ReadTx,
        node_type: NodeType,
        reference: &str,
    ) -> QueryResult<Vec<Secret>> {
        let node = self.resolve_in(tx, node_type, reference).await?;

        let mut secrets = tx
            .secrets_owned_by(&node.id)
            .await
            .map_err(|e| QueryError::new(QueryStage::Fetch, e.into()))?;
        if secrets.is_empty() {
            return Ok(secrets);
        }

        let mut paths = PathCache::default();
        for secret in &mut secrets {
            paths
                .annotate(tx, secret, self.options.max_depth)
                .await
                .map_err(at(QueryStage::PathBuild))?;
        }
        Ok(secrets)
    }

    async fn list_visible_in(
        &self,
        tx: &mut dyn ReadTx,
        node_type: NodeType,
        reference: &str,
    ) -> QueryResult<Vec<Secret>> {
        let node = self.resolve_in(tx, node_type, reference).await?;
        let chain = self.chain_in(tx, node.node_type, &node.id).await?;

        let mut levels = Vec::with_capacity(chain.len());
        for ancestor in &chain {
            let owned = tx
                .secrets_owned_by(&ancestor.id)
                .await
                .map_err(|e| QueryError::new(QueryStage::Fetch, e.into()))?;
            levels.push(owned);
        }

        let mut secrets = apply_shadowing(levels, self.options.shadowing);

        let mut paths = PathCache::from_chain(&chain);
        for secret in &mut secrets {
            paths
                .annotate(tx, secret, self.options.max_depth)
                .await
                .map_err(at(QueryStage::PathBuild))?;
        }
        Ok(secrets)
    }

    async fn get_secret_in(
        &self,
        tx: &mut dyn ReadTx,
        id: &SecretId,
    ) -> QueryResult<Option<Secret>> {
        let Some(mut secret) = tx
            .secret(id)
            .await
            .map_err(|e| QueryError::new(QueryStage::Fetch, e.into()))?
        else {
            return Ok(None);
        };

        PathCache::default()
            .annotate(tx, &mut secret, self.options.max_depth)
            .await
            .map_err(at(QueryStage::PathBuild))?;
        Ok(Some(secret))
    }
}

impl std::fmt::Debug for SecretQueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretQueryService")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Flattens per-level secret lists, root level first.
fn apply_shadowing(levels: Vec<Vec<Secret>>, policy: ShadowPolicy) -> Vec<Secret> {
    match policy {
        ShadowPolicy::Union => levels.into_iter().flatten().collect(),
        ShadowPolicy::Nearest => {
            let mut seen: HashSet<String> = HashSet::new();
            let mut kept: Vec<Vec<Secret>> = Vec::with_capacity(levels.len());
            for level in levels.into_iter().rev() {
                let level: Vec<Secret> = level
                    .into_iter()
                    .filter(|s| !seen.contains(&s.name))
                    .collect();
                seen.extend(level.iter().map(|s| s.name.clone()));
                kept.push(level);
            }
            kept.into_iter().rev().flatten().collect()
        }
    }
}
