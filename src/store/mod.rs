//! In-memory corpus: collections, documents and their node trees.
//!
//! This stands in for the storage collaborator of the evaluation layer:
//! it hands out "separated" text values and per-collection index
//! configuration, and nothing more. Persistence, locking and the
//! transaction log live below this interface and are out of scope.

use crate::dom::{CollectionId, DocId, NameKind, NodeId, NodeProxy, QName};
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Per-collection full-text index configuration.
///
/// The shape mirrors a collection's index configuration document: which
/// element and attribute names are covered, plus tokenizer limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index every element and attribute
    #[serde(default)]
    pub default_all: bool,
    /// Element local names covered by the index
    #[serde(default)]
    pub elements: Vec<String>,
    /// Attribute local names covered by the index
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Tokens on the stop list are not indexed
    #[serde(default)]
    pub stop_words: Vec<String>,
    /// Tokens longer than this are skipped at index time
    #[serde(default = "default_max_token_length")]
    pub max_token_length: usize,
}

fn default_max_token_length() -> usize {
    2048
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self::none()
    }
}

impl IndexSpec {
    /// No index coverage at all
    pub fn none() -> Self {
        Self {
            default_all: false,
            elements: Vec::new(),
            attributes: Vec::new(),
            stop_words: Vec::new(),
            max_token_length: default_max_token_length(),
        }
    }

    /// Full coverage of every element and attribute
    pub fn all() -> Self {
        Self {
            default_all: true,
            ..Self::none()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Does this collection's index qualify for lookups on `qname`?
    pub fn has_index_for(&self, qname: &QName) -> bool {
        if self.default_all {
            return true;
        }
        match qname.kind {
            NameKind::Element => self.elements.iter().any(|n| n == &qname.local),
            NameKind::Attribute => self.attributes.iter().any(|n| n == &qname.local),
        }
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.iter().any(|w| w == token)
    }

    /// Would this (lowercased) token reach the dictionary at build time?
    /// Stop-listed and over-long tokens are skipped, so a lookup for
    /// them finds nothing.
    pub fn indexes_token(&self, token: &str) -> bool {
        token.chars().count() <= self.max_token_length && !self.is_stop_word(token)
    }
}

/// A collection of documents sharing one index configuration
#[derive(Debug, Clone)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    /// System/administrative collections are never index-optimized
    pub system: bool,
    pub index: IndexSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Attribute,
    Text,
}

/// One node of a document tree
#[derive(Debug, Clone)]
pub struct NodeData {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Local name; `None` for text nodes
    pub name: Option<String>,
    /// Attribute value or text content
    pub text: Option<String>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl NodeData {
    /// Does the node answer to the given qualified name?
    pub fn matches_qname(&self, qname: &QName) -> bool {
        let kind_ok = match qname.kind {
            NameKind::Element => self.kind == NodeKind::Element,
            NameKind::Attribute => self.kind == NodeKind::Attribute,
        };
        kind_ok && self.name.as_deref() == Some(qname.local.as_str())
    }
}

/// A stored document: an arena of nodes in document order
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocId,
    pub collection: CollectionId,
    nodes: Vec<NodeData>,
    by_id: FxHashMap<NodeId, usize>,
}

impl Document {
    pub fn root(&self) -> &NodeData {
        &self.nodes[0]
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeData> {
        self.by_id.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeData> {
        self.nodes.iter()
    }

    fn node_at(&self, idx: usize) -> &NodeData {
        &self.nodes[idx]
    }

    /// Separated text value: descendant text (and attribute values mapped
    /// onto attribute nodes) in document order, joined with single spaces.
    pub fn text_value(&self, id: &NodeId) -> Option<String> {
        let &idx = self.by_id.get(id)?;
        let node = &self.nodes[idx];
        match node.kind {
            NodeKind::Text | NodeKind::Attribute => node.text.clone(),
            NodeKind::Element => {
                let mut parts: Vec<&str> = Vec::new();
                self.collect_text(idx, &mut parts);
                Some(parts.join(" "))
            }
        }
    }

    fn collect_text<'a>(&'a self, idx: usize, parts: &mut Vec<&'a str>) {
        let node = &self.nodes[idx];
        if node.kind == NodeKind::Text {
            if let Some(text) = node.text.as_deref() {
                if !text.is_empty() {
                    parts.push(text);
                }
            }
        }
        for &child in &node.children {
            // attribute values are not part of an element's text value
            if self.nodes[child].kind != NodeKind::Attribute {
                self.collect_text(child, parts);
            }
        }
    }
}

/// Builder for a document tree.
///
/// Node ids are assigned as ordinal paths in insertion order, so the
/// arena is in document order by construction.
pub struct DocBuilder {
    nodes: Vec<NodeData>,
    stack: Vec<usize>,
}

impl DocBuilder {
    pub fn new(root_name: &str) -> Self {
        let root = NodeData {
            id: NodeId::root(),
            kind: NodeKind::Element,
            name: Some(root_name.to_string()),
            text: None,
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            stack: vec![0],
        }
    }

    fn push_child(&mut self, kind: NodeKind, name: Option<&str>, text: Option<&str>) -> usize {
        let parent = *self.stack.last().expect("builder stack underflow");
        let ordinal = self.nodes[parent].children.len() as u32 + 1;
        let id = self.nodes[parent].id.child(ordinal);
        let idx = self.nodes.len();
        self.nodes.push(NodeData {
            id,
            kind,
            name: name.map(str::to_string),
            text: text.map(str::to_string),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(idx);
        idx
    }

    /// Open a child element; close it with [`DocBuilder::end`]
    pub fn start(&mut self, name: &str) -> &mut Self {
        let idx = self.push_child(NodeKind::Element, Some(name), None);
        self.stack.push(idx);
        self
    }

    pub fn end(&mut self) -> &mut Self {
        assert!(self.stack.len() > 1, "unbalanced end()");
        self.stack.pop();
        self
    }

    pub fn attr(&mut self, name: &str, value: &str) -> &mut Self {
        self.push_child(NodeKind::Attribute, Some(name), Some(value));
        self
    }

    pub fn text(&mut self, content: &str) -> &mut Self {
        self.push_child(NodeKind::Text, None, Some(content));
        self
    }

    /// Shorthand for `start(name).text(content).end()`
    pub fn elem(&mut self, name: &str, content: &str) -> &mut Self {
        self.start(name).text(content).end()
    }
}

/// The document corpus: collections plus their documents
#[derive(Debug, Default)]
pub struct Corpus {
    collections: FxHashMap<CollectionId, Collection>,
    documents: FxHashMap<DocId, Document>,
    next_collection: CollectionId,
    next_doc: DocId,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collection(&mut self, name: &str, index: IndexSpec) -> CollectionId {
        self.add_collection_full(name, false, index)
    }

    pub fn add_system_collection(&mut self, name: &str, index: IndexSpec) -> CollectionId {
        self.add_collection_full(name, true, index)
    }

    fn add_collection_full(&mut self, name: &str, system: bool, index: IndexSpec) -> CollectionId {
        let id = self.next_collection;
        self.next_collection += 1;
        self.collections.insert(
            id,
            Collection {
                id,
                name: name.to_string(),
                system,
                index,
            },
        );
        id
    }

    pub fn add_document(&mut self, collection: CollectionId, builder: DocBuilder) -> DocId {
        assert!(
            self.collections.contains_key(&collection),
            "unknown collection {collection}"
        );
        let id = self.next_doc;
        self.next_doc += 1;
        let by_id = builder
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        self.documents.insert(
            id,
            Document {
                id,
                collection,
                nodes: builder.nodes,
                by_id,
            },
        );
        id
    }

    pub fn collection(&self, id: CollectionId) -> Option<&Collection> {
        self.collections.get(&id)
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn collection_of(&self, doc: DocId) -> Option<&Collection> {
        self.documents
            .get(&doc)
            .and_then(|d| self.collections.get(&d.collection))
    }

    /// All document ids as a bitmap
    pub fn all_documents(&self) -> RoaringBitmap {
        self.documents.keys().copied().collect()
    }

    /// Document ids of one collection
    pub fn collection_documents(&self, collection: CollectionId) -> RoaringBitmap {
        self.documents
            .values()
            .filter(|d| d.collection == collection)
            .map(|d| d.id)
            .collect()
    }

    pub fn node(&self, proxy: &NodeProxy) -> Option<&NodeData> {
        self.documents.get(&proxy.doc)?.node(&proxy.node)
    }

    /// Separated text value of a node (the `getTextValue` collaborator)
    pub fn text_value(&self, proxy: &NodeProxy) -> Option<String> {
        self.documents.get(&proxy.doc)?.text_value(&proxy.node)
    }

    pub fn children<'a>(&'a self, proxy: &NodeProxy) -> Vec<&'a NodeData> {
        let Some(doc) = self.documents.get(&proxy.doc) else {
            return Vec::new();
        };
        let Some(&idx) = doc.by_id.get(&proxy.node) else {
            return Vec::new();
        };
        doc.node_at(idx)
            .children
            .iter()
            .map(|&c| doc.node_at(c))
            .collect()
    }
}

/// Index Capability Probe: true only if every non-system collection
/// touched by `docs` has a qualifying index entry for `qname`.
///
/// Partial coverage disables optimization for the whole set; a mixed
/// index-based/unindexed evaluation would silently drop results from the
/// unindexed collections.
pub fn fully_indexed(corpus: &Corpus, docs: &RoaringBitmap, qname: &QName) -> bool {
    let mut seen = false;
    let mut collections = RoaringBitmap::new();
    for doc in docs {
        let Some(collection) = corpus.collection_of(doc) else {
            return false;
        };
        if !collections.insert(collection.id) {
            continue;
        }
        if collection.system {
            continue;
        }
        seen = true;
        if !collection.index.has_index_for(qname) {
            return false;
        }
    }
    seen
}
