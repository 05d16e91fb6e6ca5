//! Structural text-index collaborator.
//!
//! The evaluation layer only depends on the [`TextIndex`] trait; the
//! on-disk B-tree/inverted index of the real engine sits behind the same
//! interface. [`MemoryIndex`] is the in-memory reference implementation
//! used by the tests and by embedded callers: a token dictionary with
//! per-node occurrence postings, plus a value dictionary for pattern
//! lookups over whole text values.

use crate::dom::{MatchMap, NameKind, NodeId, NodeProxy, NodeSet, QName};
use crate::store::{Corpus, NodeKind};
use crate::text::Tokenizer;
use anyhow::Result;
use regex::Regex;
use roaring::RoaringBitmap;
use std::collections::BTreeMap;
use tracing::trace;

/// How index hits relate to the supplied context set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAxis {
    /// Return the context nodes that contain a hit
    Ancestor,
    /// Return the hits themselves, restricted to the context when given
    Descendant,
}

/// One term lookup against the index
#[derive(Debug, Clone)]
pub enum TermQuery {
    /// Exact (case-insensitive) token lookup
    Exact(String),
    /// Token-dictionary scan with a compiled whole-token matcher. A
    /// non-empty literal prefix bounds the scan to the dictionary range
    /// sharing it; a term opening with a metacharacter has none and
    /// degrades to a full scan.
    Pattern { matcher: Regex, prefix: String },
    /// Value-dictionary scan with a compiled whole-value matcher
    ValuePattern(Regex),
}

/// Result of one index lookup: the hit nodes plus their occurrence
/// records (offsets into each node's separated text value).
#[derive(Debug, Default)]
pub struct IndexHits {
    pub nodes: NodeSet,
    pub matches: MatchMap,
}

impl IndexHits {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Structural text-index lookup interface.
///
/// Zero matches yield an empty hit set, never an error; I/O failures
/// from the storage layer are propagated unchanged.
pub trait TextIndex {
    fn query(
        &self,
        docs: &RoaringBitmap,
        context: Option<&NodeSet>,
        axis: SearchAxis,
        qname: Option<&QName>,
        term: &TermQuery,
    ) -> Result<IndexHits>;
}

/// One posting: a node occurrence of a dictionary entry
#[derive(Debug, Clone)]
struct Posting {
    doc: u32,
    node: NodeId,
    name: String,
    kind: NameKind,
    /// `(start, len)` char offsets into the node's separated text value
    offsets: Vec<(usize, usize)>,
}

impl Posting {
    fn matches_qname(&self, qname: Option<&QName>) -> bool {
        match qname {
            None => true,
            Some(q) => self.kind == q.kind && self.name == q.local,
        }
    }
}

/// In-memory inverted index over a corpus.
///
/// Every element is indexed by its complete separated text value and
/// every attribute by its value, honoring the owning collection's index
/// configuration (coverage, stop words, token length cap). Lookups
/// filter postings by document set, qualified name and context.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    /// token -> postings, sorted for prefix scans
    tokens: BTreeMap<String, Vec<Posting>>,
    /// lowercased text value -> owning nodes
    values: BTreeMap<String, Vec<Posting>>,
}

impl MemoryIndex {
    /// Build the index for every indexable node of the corpus
    pub fn build(corpus: &Corpus) -> Self {
        let mut index = MemoryIndex::default();
        for doc in corpus.documents() {
            let Some(collection) = corpus.collection_of(doc.id) else {
                continue;
            };
            let spec = &collection.index;
            for node in doc.nodes() {
                let (kind, name) = match (node.kind, node.name.as_deref()) {
                    (NodeKind::Element, Some(name)) => (NameKind::Element, name),
                    (NodeKind::Attribute, Some(name)) => (NameKind::Attribute, name),
                    _ => continue,
                };
                let qname = QName {
                    local: name.to_string(),
                    kind,
                };
                if !spec.has_index_for(&qname) {
                    continue;
                }
                let Some(value) = doc.text_value(&node.id) else {
                    continue;
                };
                index.add_node(doc.id, node.id.clone(), &qname, &value, spec);
            }
        }
        index
    }

    fn add_node(
        &mut self,
        doc: u32,
        node: NodeId,
        qname: &QName,
        value: &str,
        spec: &crate::store::IndexSpec,
    ) {
        for token in Tokenizer::new(value) {
            let lower = token.text.to_lowercase();
            if !spec.indexes_token(&lower) {
                continue;
            }
            let postings = self.tokens.entry(lower).or_default();
            Self::push_occurrence(postings, doc, &node, qname, token.start, token.len());
        }

        if !value.is_empty() {
            let postings = self.values.entry(value.to_lowercase()).or_default();
            Self::push_occurrence(postings, doc, &node, qname, 0, value.chars().count());
        }
    }

    fn push_occurrence(
        postings: &mut Vec<Posting>,
        doc: u32,
        node: &NodeId,
        qname: &QName,
        start: usize,
        len: usize,
    ) {
        if let Some(existing) = postings
            .iter_mut()
            .find(|p| p.doc == doc && &p.node == node)
        {
            existing.offsets.push((start, len));
        } else {
            postings.push(Posting {
                doc,
                node: node.clone(),
                name: qname.local.clone(),
                kind: qname.kind,
                offsets: vec![(start, len)],
            });
        }
    }

    /// Term statistics: distinct dictionary entries with the given prefix
    /// and their total occurrence counts within `docs`.
    pub fn scan_terms(&self, docs: &RoaringBitmap, prefix: &str) -> Vec<(String, u32)> {
        let prefix = prefix.to_lowercase();
        self.tokens
            .range(prefix.clone()..)
            .take_while(|(token, _)| token.starts_with(&prefix))
            .filter_map(|(token, postings)| {
                let count: u32 = postings
                    .iter()
                    .filter(|p| docs.contains(p.doc))
                    .map(|p| p.offsets.len() as u32)
                    .sum();
                (count > 0).then(|| (token.clone(), count))
            })
            .collect()
    }

    fn collect_hits(
        &self,
        postings: &[Posting],
        term_text: &str,
        docs: &RoaringBitmap,
        qname: Option<&QName>,
        hits: &mut IndexHits,
    ) {
        for posting in postings {
            if !docs.contains(posting.doc) || !posting.matches_qname(qname) {
                continue;
            }
            let proxy = NodeProxy::new(posting.doc, posting.node.clone());
            hits.nodes.insert(proxy.clone());
            for &(start, len) in &posting.offsets {
                hits.matches
                    .add(proxy.clone(), term_text.to_string(), start, len);
            }
        }
    }
}

impl TextIndex for MemoryIndex {
    fn query(
        &self,
        docs: &RoaringBitmap,
        context: Option<&NodeSet>,
        axis: SearchAxis,
        qname: Option<&QName>,
        term: &TermQuery,
    ) -> Result<IndexHits> {
        let mut hits = IndexHits::empty();

        match term {
            TermQuery::Exact(token) => {
                let token = token.to_lowercase();
                if let Some(postings) = self.tokens.get(&token) {
                    self.collect_hits(postings, &token, docs, qname, &mut hits);
                }
            }
            TermQuery::Pattern { matcher, prefix } => {
                let entries: Box<dyn Iterator<Item = (&String, &Vec<Posting>)>> =
                    if prefix.is_empty() {
                        Box::new(self.tokens.iter())
                    } else {
                        Box::new(
                            self.tokens
                                .range(prefix.clone()..)
                                .take_while(|(token, _)| token.starts_with(prefix.as_str())),
                        )
                    };
                for (token, postings) in entries {
                    if matcher.is_match(token) {
                        self.collect_hits(postings, token, docs, qname, &mut hits);
                    }
                }
            }
            TermQuery::ValuePattern(matcher) => {
                for (value, postings) in &self.values {
                    if matcher.is_match(value) {
                        self.collect_hits(postings, value, docs, qname, &mut hits);
                    }
                }
            }
        }

        if let Some(context) = context {
            match axis {
                SearchAxis::Ancestor => {
                    hits.nodes = hits.nodes.select_ancestors(context);
                    // occurrence records stay on the nodes that carry the text
                }
                SearchAxis::Descendant => {
                    hits.nodes = hits.nodes.select_descendants(context);
                }
            }
            let nodes = hits.nodes.clone();
            hits.matches.retain_nodes(|node| {
                nodes.iter().any(|kept| kept.contains(node) || node.contains(kept))
            });
        }

        trace!(hits = hits.nodes.len(), "index lookup");
        Ok(hits)
    }
}
