//! Domain types shared by the read and write paths.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::UnknownNodeType;

/// Level of a node in the configuration hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    /// Root of a tree. Organizations never have a parent.
    #[serde(rename = "org", alias = "organization")]
    Organization,

    /// Grouping level below an organization or another group.
    #[serde(rename = "projectgroup")]
    ProjectGroup,

    /// Leaf level. Projects never parent other nodes.
    #[serde(rename = "project")]
    Project,
}

impl NodeType {
    /// Returns the wire name of this node type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "org",
            Self::ProjectGroup => "projectgroup",
            Self::Project => "project",
        }
    }

    /// Returns true for types that sit at the root of the forest.
    #[must_use]
    pub const fn is_root(self) -> bool {
        matches!(self, Self::Organization)
    }

    /// Returns true for types that may appear as a parent.
    #[must_use]
    pub const fn can_parent(self) -> bool {
        matches!(self, Self::Organization | Self::ProjectGroup)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = UnknownNodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "org" | "organization" => Ok(Self::Organization),
            "projectgroup" => Ok(Self::ProjectGroup),
            "project" => Ok(Self::Project),
            other => Err(UnknownNodeType(other.to_owned())),
        }
    }
}

/// Canonical identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique node identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An entity of the configuration hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Unique among siblings of the same type under the same parent.
    pub name: String,
    /// `None` only for root nodes.
    pub parent: Option<NodeId>,
}

impl Node {
    pub fn organization(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Organization,
            name: name.into(),
            parent: None,
        }
    }

    pub fn project_group(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        parent: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::ProjectGroup,
            name: name.into(),
            parent: Some(parent.into()),
        }
    }

    pub fn project(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        parent: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Project,
            name: name.into(),
            parent: Some(parent.into()),
        }
    }

    #[must_use]
    pub fn to_ref(&self) -> NodeRef {
        NodeRef {
            node_type: self.node_type,
            id: self.id.clone(),
        }
    }
}

/// A typed pointer to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub node_type: NodeType,
    pub id: NodeId,
}

/// One entry of a [`ParentPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub node_type: NodeType,
    pub id: NodeId,
    pub name: String,
}

impl From<&Node> for PathSegment {
    fn from(node: &Node) -> Self {
        Self {
            node_type: node.node_type,
            id: node.id.clone(),
            name: node.name.clone(),
        }
    }
}

/// Root-first chain of ancestors ending at the node itself.
///
/// Renders as `<root type>/<name>/<name>/...`, e.g. `org/acme/backend/api`,
/// which is also its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParentPath(Vec<PathSegment>);

impl ParentPath {
    #[must_use]
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Canonical identities along the path, root first.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.id.as_str()).collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.name.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }
}

impl fmt::Display for ParentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(root) = self.0.first() else {
            return Ok(());
        };
        f.write_str(root.node_type.as_str())?;
        for segment in &self.0 {
            write!(f, "/{}", segment.name)?;
        }
        Ok(())
    }
}

impl Serialize for ParentPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Canonical identity of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique secret identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SecretId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A secret value with automatic memory zeroisation.
///
/// The value is stored as a `SecretString` which prevents accidental logging
/// and ensures memory is zeroed when dropped. It serialises as a plain string
/// so it can travel inside a secret payload.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretValue {
    #[zeroize(skip)]
    inner: SecretString,
}

impl SecretValue {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: SecretString::from(value.into()),
        }
    }

    /// Exposes the secret value for use.
    ///
    /// The returned reference should not be logged or stored.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.expose_secret().is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecretValue {
    /// Constant-time comparison to prevent timing attacks.
    fn eq(&self, other: &Self) -> bool {
        let self_bytes = self.inner.expose_secret().as_bytes();
        let other_bytes = other.inner.expose_secret().as_bytes();

        if self_bytes.len() != other_bytes.len() {
            return false;
        }

        self_bytes.ct_eq(other_bytes).into()
    }
}

impl Eq for SecretValue {}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Secret payload, discriminated by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SecretData {
    /// Values held by the config store itself.
    Internal {
        #[serde(default)]
        data: BTreeMap<String, SecretValue>,
    },

    /// A pointer into an external secret provider.
    External {
        secret_provider_id: String,
        path: String,
    },
}

impl SecretData {
    /// Builds an internal payload from key/value pairs.
    pub fn internal<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Internal {
            data: entries
                .into_iter()
                .map(|(k, v)| (k.into(), SecretValue::new(v)))
                .collect(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Internal { .. } => "internal",
            Self::External { .. } => "external",
        }
    }
}

/// The owner of a secret as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub id: NodeId,
    /// Populated on read only; never stored and never read from input.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub path: Option<ParentPath>,
}

impl ParentRef {
    #[must_use]
    pub fn new(node_type: NodeType, id: NodeId) -> Self {
        Self {
            node_type,
            id,
            path: None,
        }
    }
}

/// A named credential scoped to exactly one owning node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub id: SecretId,
    pub name: String,
    pub parent: ParentRef,
    #[serde(flatten)]
    pub data: SecretData,
}

impl Secret {
    pub fn new(
        name: impl Into<String>,
        owner_type: NodeType,
        owner: NodeId,
        data: SecretData,
    ) -> Self {
        Self {
            id: SecretId::generate(),
            name: name.into(),
            parent: ParentRef::new(owner_type, owner),
            data,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<SecretId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn owner(&self) -> &NodeId {
        &self.parent.id
    }

    #[must_use]
    pub fn owner_path(&self) -> Option<&ParentPath> {
        self.parent.path.as_ref()
    }
}

/// A committed change flowing from the write path into a read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionEvent {
    NodePut(Node),
    NodeRemoved(NodeId),
    SecretPut(Secret),
    SecretRemoved(SecretId),
}
