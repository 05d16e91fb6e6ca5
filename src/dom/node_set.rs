use crate::dom::types::NodeProxy;
use roaring::RoaringBitmap;
use rustc_hash::FxHashSet;

/// A duplicate-free set of candidate nodes.
///
/// Identity is (document id, structural node id). The set is unordered;
/// callers that need document order sort the drained proxies themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: FxHashSet<NodeProxy>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: FxHashSet::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn insert(&mut self, node: NodeProxy) -> bool {
        self.nodes.insert(node)
    }

    pub fn contains(&self, node: &NodeProxy) -> bool {
        self.nodes.contains(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeProxy> {
        self.nodes.iter()
    }

    /// Set of documents the members belong to
    pub fn document_set(&self) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for node in &self.nodes {
            docs.insert(node.doc);
        }
        docs
    }

    pub fn union(&self, other: &NodeSet) -> NodeSet {
        let mut result = self.clone();
        for node in &other.nodes {
            result.nodes.insert(node.clone());
        }
        result
    }

    /// Identity intersection: members present in both sets
    pub fn intersect(&self, other: &NodeSet) -> NodeSet {
        // Iterate the smaller set, as in any posting intersection
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut result = NodeSet::with_capacity(small.len());
        for node in &small.nodes {
            if large.nodes.contains(node) {
                result.nodes.insert(node.clone());
            }
        }
        result
    }

    /// Structural intersection: keep a member if `other` holds the same
    /// node or a descendant of it.
    ///
    /// Used to AND per-term hit sets, where one term's hit may sit at a
    /// descendant of the node another term was reported on.
    pub fn deep_intersect(&self, other: &NodeSet) -> NodeSet {
        let mut result = NodeSet::new();
        for node in &self.nodes {
            if other.nodes.contains(node) || other.nodes.iter().any(|o| node.contains(o)) {
                result.nodes.insert(node.clone());
            }
        }
        result
    }

    /// Map hit nodes up to the context members that contain them.
    ///
    /// Ancestor-axis lookups post-select a previously computed context set:
    /// the result holds context nodes, not the raw hits.
    pub fn select_ancestors(&self, context: &NodeSet) -> NodeSet {
        let mut result = NodeSet::new();
        for ctx in &context.nodes {
            if self.nodes.iter().any(|hit| ctx.contains(hit)) {
                result.nodes.insert(ctx.clone());
            }
        }
        result
    }

    /// Keep hits that lie at or below some context node
    pub fn select_descendants(&self, context: &NodeSet) -> NodeSet {
        let mut result = NodeSet::new();
        for hit in &self.nodes {
            if context.nodes.iter().any(|ctx| ctx.contains(hit)) {
                result.nodes.insert(hit.clone());
            }
        }
        result
    }

    /// Keep hits belonging to the given documents
    pub fn retain_documents(&mut self, docs: &RoaringBitmap) {
        self.nodes.retain(|n| docs.contains(n.doc));
    }

    /// Drain into document order (doc id, then structural id)
    pub fn into_sorted(self) -> Vec<NodeProxy> {
        let mut nodes: Vec<_> = self.nodes.into_iter().collect();
        nodes.sort();
        nodes
    }
}

impl FromIterator<NodeProxy> for NodeSet {
    fn from_iter<I: IntoIterator<Item = NodeProxy>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a NodeSet {
    type Item = &'a NodeProxy;
    type IntoIter = std::collections::hash_set::Iter<'a, NodeProxy>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
