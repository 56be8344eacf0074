//! Bounded parent-reference traversal shared by the path builder and the
//! tree walker.

use std::collections::HashSet;

use configstore_readdb::{Node, NodeId, NodeRef, NodeType, ReadTx};

use crate::error::{Entity, SecretsError, SecretsResult};

/// Loads a node by canonical id, requiring it to be of `node_type`.
pub(crate) async fn load_node(
    tx: &mut dyn ReadTx,
    node_type: NodeType,
    id: &NodeId,
) -> SecretsResult<Node> {
    match tx.node(id).await? {
        Some(node) if node.node_type == node_type => Ok(node),
        _ => Err(SecretsError::not_found(Entity::Node(node_type), id.as_str())),
    }
}

/// Returns `start` and all of its ancestors, root first.
///
/// The walk fails instead of looping: revisiting a node, exceeding
/// `max_depth` nodes, or reaching a project used as a parent is an
/// invariant violation. A parent id with no node behind it is reported as a
/// missing ancestor.
pub(crate) async fn ancestors(
    tx: &mut dyn ReadTx,
    start: Node,
    max_depth: usize,
) -> SecretsResult<Vec<Node>> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(start.id.clone());

    let mut next = start.parent.clone();
    let mut chain = vec![start];

    while let Some(parent_id) = next {
        if chain.len() >= max_depth {
            tracing::error!(
                node.id = %chain[0].id,
                max_depth,
                "Hierarchy deeper than traversal bound"
            );
            return Err(SecretsError::invariant(format!(
                "hierarchy above {} exceeds {max_depth} levels",
                chain[0].id
            )));
        }

        if !visited.insert(parent_id.clone()) {
            tracing::error!(node.id = %parent_id, "Cycle in parent references");
            return Err(SecretsError::invariant(format!(
                "cycle in parent references at {parent_id}"
            )));
        }

        let Some(parent) = tx.node(&parent_id).await? else {
            let child = chain.last().map(|n| n.id.to_string()).unwrap_or_default();
            tracing::error!(
                node.id = %child,
                parent.id = %parent_id,
                "Dangling parent reference in read model"
            );
            return Err(SecretsError::not_found(Entity::Ancestor, parent_id.as_str()));
        };

        if !parent.node_type.can_parent() {
            tracing::error!(
                node.id = %parent.id,
                node_type = %parent.node_type,
                "Node type cannot be a parent"
            );
            return Err(SecretsError::invariant(format!(
                "{} {} is used as a parent",
                parent.node_type, parent.id
            )));
        }

        next = parent.parent.clone();
        chain.push(parent);
    }

    chain.reverse();
    Ok(chain)
}

/// Typed references for [`ancestors`], root first.
pub(crate) fn chain_refs(chain: &[Node]) -> Vec<NodeRef> {
    chain.iter().map(Node::to_ref).collect()
}
