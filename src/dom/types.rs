use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a document in the corpus
pub type DocId = u32;

/// Unique identifier for a collection
pub type CollectionId = u32;

/// Kind of node a qualified name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameKind {
    Element,
    Attribute,
}

/// Qualified name of an element or attribute, as used by index lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    pub local: String,
    pub kind: NameKind,
}

impl QName {
    pub fn element(local: &str) -> Self {
        Self {
            local: local.to_string(),
            kind: NameKind::Element,
        }
    }

    pub fn attribute(local: &str) -> Self {
        Self {
            local: local.to_string(),
            kind: NameKind::Attribute,
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NameKind::Element => write!(f, "{}", self.local),
            NameKind::Attribute => write!(f, "@{}", self.local),
        }
    }
}

/// Structural node identifier: the ordinal path from the document root.
///
/// Level-path ids make ancestor/descendant tests a prefix comparison and
/// order nodes in document order, which is all the set operations need.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Vec<u32>);

impl NodeId {
    pub fn root() -> Self {
        Self(vec![1])
    }

    pub fn new(path: Vec<u32>) -> Self {
        debug_assert!(!path.is_empty());
        Self(path)
    }

    /// Id of the n-th child (1-based ordinal)
    pub fn child(&self, ordinal: u32) -> Self {
        let mut path = self.0.clone();
        path.push(ordinal);
        Self(path)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.len() > 1 {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        } else {
            None
        }
    }

    pub fn level(&self) -> usize {
        self.0.len()
    }

    /// True if `self` is a proper ancestor of `other`
    pub fn is_ancestor_of(&self, other: &NodeId) -> bool {
        other.0.len() > self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    pub fn is_ancestor_or_self(&self, other: &NodeId) -> bool {
        self == other || self.is_ancestor_of(other)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// A candidate: a lightweight reference to one node in one document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeProxy {
    pub doc: DocId,
    pub node: NodeId,
}

impl NodeProxy {
    pub fn new(doc: DocId, node: NodeId) -> Self {
        Self { doc, node }
    }

    /// True if `self` contains `other` (same document, ancestor-or-self)
    pub fn contains(&self, other: &NodeProxy) -> bool {
        self.doc == other.doc && self.node.is_ancestor_or_self(&other.node)
    }
}

impl fmt::Display for NodeProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doc, self.node)
    }
}
