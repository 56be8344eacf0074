//! Maps `(node type, reference)` pairs to canonical node identities.

use configstore_readdb::{Node, NodeId, NodeType, ReadTx};

use crate::error::{Entity, SecretsError, SecretsResult};

/// Longest accepted name or id segment, in bytes.
pub const MAX_SEGMENT_LEN: usize = 255;

const PATH_SEPARATOR: char = '/';

/// A syntactically validated node reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigRef<'a> {
    /// A canonical id, or a root name for root node types.
    Bare(&'a str),
    /// Names from the root down to the target, e.g. `acme/backend/api`.
    Path(Vec<&'a str>),
}

impl<'a> ConfigRef<'a> {
    /// Parses and validates a reference.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` for empty references, empty or malformed
    /// segments, and paths deeper than `max_depth`.
    pub fn parse(reference: &'a str, max_depth: usize) -> SecretsResult<Self> {
        if reference.is_empty() {
            return Err(SecretsError::invalid_reference(reference, "reference is empty"));
        }

        if !reference.contains(PATH_SEPARATOR) {
            check_segment(reference, reference)?;
            return Ok(Self::Bare(reference));
        }

        let segments: Vec<&str> = reference.split(PATH_SEPARATOR).collect();
        if segments.len() > max_depth {
            return Err(SecretsError::invalid_reference(
                reference,
                format!("path has more than {max_depth} segments"),
            ));
        }
        for segment in &segments {
            check_segment(reference, segment)?;
        }
        Ok(Self::Path(segments))
    }
}

fn check_segment(reference: &str, segment: &str) -> SecretsResult<()> {
    if segment.is_empty() {
        return Err(SecretsError::invalid_reference(reference, "empty path segment"));
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(SecretsError::invalid_reference(
            reference,
            format!("segment exceeds {MAX_SEGMENT_LEN} bytes"),
        ));
    }
    if segment
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(SecretsError::invalid_reference(
            reference,
            "segment contains whitespace or control characters",
        ));
    }
    Ok(())
}

/// Resolves a reference to the node it names.
///
/// Every read goes through `tx`, so repeated calls against one snapshot
/// return the same node.
///
/// # Errors
///
/// `InvalidReference` for malformed input, `NotFound` when no node of
/// `node_type` matches.
pub async fn resolve(
    tx: &mut dyn ReadTx,
    node_type: NodeType,
    reference: &str,
    max_depth: usize,
) -> SecretsResult<Node> {
    let not_found = || SecretsError::not_found(Entity::Node(node_type), reference);

    match ConfigRef::parse(reference, max_depth)? {
        ConfigRef::Bare(bare) => {
            if let Some(node) = tx.node(&NodeId::new(bare)).await? {
                if node.node_type == node_type {
                    return Ok(node);
                }
            }
            if node_type.is_root() {
                if let Some(node) = tx.child_by_name(None, node_type, bare).await? {
                    return Ok(node);
                }
            }
            Err(not_found())
        }
        ConfigRef::Path(segments) => {
            let Some((last, ancestors)) = segments.split_last() else {
                return Err(not_found());
            };

            let mut parent: Option<NodeId> = None;
            for (depth, name) in ancestors.iter().enumerate() {
                let level = if depth == 0 {
                    NodeType::Organization
                } else {
                    NodeType::ProjectGroup
                };
                let node = tx
                    .child_by_name(parent.as_ref(), level, name)
                    .await?
                    .ok_or_else(not_found)?;
                parent = Some(node.id);
            }

            tx.child_by_name(parent.as_ref(), node_type, last)
                .await?
                .ok_or_else(not_found)
        }
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use configstore_readdb::{MemoryReadDb, ProjectionEvent, ReadModel};

    use super::*;

    async fn db() -> MemoryReadDb {
        MemoryReadDb::seeded(&[
            ProjectionEvent::NodePut(Node::organization("o-1", "acme")),
            ProjectionEvent::NodePut(Node::project_group("g-1", "backend", "o-1")),
            ProjectionEvent::NodePut(Node::project("p-1", "api", "g-1")),
            ProjectionEvent::NodePut(Node::project("p-2", "web", "o-1")),
        ])
        .await
    }

    #[test]
    fn parse_rejects_malformed_references() {
        for bad in ["", "/acme", "acme/", "acme//api", "has space", "tab\there"] {
            let err = ConfigRef::parse(bad, 64).unwrap_err();
            assert!(
                matches!(err, SecretsError::InvalidReference { .. }),
                "{bad:?} should be rejected"
            );
        }

        let long = "x".repeat(MAX_SEGMENT_LEN + 1);
        assert!(ConfigRef::parse(&long, 64).is_err());
        assert!(ConfigRef::parse("a/b/c", 2).is_err());
    }

    #[test]
    fn parse_splits_paths() {
        assert_eq!(ConfigRef::parse("p-1", 64).unwrap(), ConfigRef::Bare("p-1"));
        assert_eq!(
            ConfigRef::parse("acme/backend/api", 64).unwrap(),
            ConfigRef::Path(vec!["acme", "backend", "api"])
        );
    }

    #[tokio::test]
    async fn resolves_ids_names_and_paths() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();

        let by_id = resolve(tx.as_mut(), NodeType::Project, "p-1", 64).await.unwrap();
        assert_eq!(by_id.id.as_str(), "p-1");

        let by_root_name = resolve(tx.as_mut(), NodeType::Organization, "acme", 64)
            .await
            .unwrap();
        assert_eq!(by_root_name.id.as_str(), "o-1");

        let by_path = resolve(tx.as_mut(), NodeType::Project, "acme/backend/api", 64)
            .await
            .unwrap();
        assert_eq!(by_path.id.as_str(), "p-1");

        let under_org = resolve(tx.as_mut(), NodeType::Project, "acme/web", 64)
            .await
            .unwrap();
        assert_eq!(under_org.id.as_str(), "p-2");

        let group = resolve(tx.as_mut(), NodeType::ProjectGroup, "acme/backend", 64)
            .await
            .unwrap();
        assert_eq!(group.id.as_str(), "g-1");
    }

    #[tokio::test]
    async fn type_scopes_the_lookup() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();

        let err = resolve(tx.as_mut(), NodeType::ProjectGroup, "p-1", 64)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // bare names are only unique among roots
        let err = resolve(tx.as_mut(), NodeType::Project, "api", 64)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = resolve(tx.as_mut(), NodeType::Project, "acme/api", 64)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
