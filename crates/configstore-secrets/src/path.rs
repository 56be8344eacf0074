//! Owner path computation and annotation.

use std::collections::HashMap;

use configstore_readdb::{Node, NodeId, NodeRef, NodeType, ParentPath, PathSegment, ReadTx, Secret};

use crate::error::SecretsResult;
use crate::walk;

/// Computes the root-first path of a node, inclusive of the node.
pub(crate) async fn build_path(
    tx: &mut dyn ReadTx,
    node_type: NodeType,
    id: &NodeId,
    max_depth: usize,
) -> SecretsResult<ParentPath> {
    let start = walk::load_node(tx, node_type, id).await?;
    let chain = walk::ancestors(tx, start, max_depth).await?;
    Ok(ParentPath::new(chain.iter().map(PathSegment::from).collect()))
}

/// Paths computed within one query, reused across secrets with the same
/// owner.
#[derive(Debug, Default)]
pub(crate) struct PathCache {
    paths: HashMap<NodeRef, ParentPath>,
}

impl PathCache {
    /// Seeds the cache with every prefix of a root-first chain.
    pub(crate) fn from_chain(chain: &[Node]) -> Self {
        let mut paths = HashMap::with_capacity(chain.len());
        for (i, node) in chain.iter().enumerate() {
            let segments = chain[..=i].iter().map(PathSegment::from).collect();
            paths.insert(node.to_ref(), ParentPath::new(segments));
        }
        Self { paths }
    }

    pub(crate) async fn path_for(
        &mut self,
        tx: &mut dyn ReadTx,
        owner: &NodeRef,
        max_depth: usize,
    ) -> SecretsResult<ParentPath> {
        if let Some(path) = self.paths.get(owner) {
            return Ok(path.clone());
        }
        let path = build_path(tx, owner.node_type, &owner.id, max_depth).await?;
        self.paths.insert(owner.clone(), path.clone());
        Ok(path)
    }

    /// Sets `parent.path` on a secret read from the snapshot.
    pub(crate) async fn annotate(
        &mut self,
        tx: &mut dyn ReadTx,
        secret: &mut Secret,
        max_depth: usize,
    ) -> SecretsResult<()> {
        let owner = NodeRef {
            node_type: secret.parent.node_type,
            id: secret.parent.id.clone(),
        };
        secret.parent.path = Some(self.path_for(tx, &owner, max_depth).await?);
        Ok(())
    }
}
