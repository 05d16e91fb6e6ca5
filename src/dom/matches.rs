use crate::dom::types::NodeProxy;
use rustc_hash::FxHashMap;

/// A recorded occurrence of a search term or phrase in a node's text.
///
/// Offsets are `(start, len)` in characters of the node's separated text
/// value, recorded for highlighting. One record holds every occurrence of
/// the same literal text within one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub node: NodeProxy,
    pub matched: String,
    pub offsets: Vec<(usize, usize)>,
}

impl TextMatch {
    pub fn new(node: NodeProxy, matched: String, start: usize, len: usize) -> Self {
        Self {
            node,
            matched,
            offsets: vec![(start, len)],
        }
    }

    pub fn frequency(&self) -> usize {
        self.offsets.len()
    }
}

/// Match records for one evaluation pass, keyed by candidate.
///
/// The records live on the evaluation result, never on the nodes
/// themselves, and a fresh map is built on every pass, so re-evaluating
/// an expression can neither duplicate nor leak earlier matches.
#[derive(Debug, Clone, Default)]
pub struct MatchMap {
    entries: FxHashMap<NodeProxy, Vec<TextMatch>>,
}

impl MatchMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an occurrence, merging offset lists when the same literal
    /// text recurs on the same node.
    pub fn add(&mut self, node: NodeProxy, matched: String, start: usize, len: usize) {
        let records = self.entries.entry(node.clone()).or_default();
        if let Some(existing) = records.iter_mut().find(|m| m.matched == matched) {
            if !existing.offsets.contains(&(start, len)) {
                existing.offsets.push((start, len));
            }
        } else {
            records.push(TextMatch::new(node, matched, start, len));
        }
    }

    pub fn insert_record(&mut self, m: TextMatch) {
        for (start, len) in m.offsets {
            self.add(m.node.clone(), m.matched.clone(), start, len);
        }
    }

    pub fn get(&self, node: &NodeProxy) -> Option<&[TextMatch]> {
        self.entries.get(node).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeProxy, &Vec<TextMatch>)> {
        self.entries.iter()
    }

    /// Merge another pass-local map into this one
    pub fn extend(&mut self, other: MatchMap) {
        for (_, records) in other.entries {
            for record in records {
                self.insert_record(record);
            }
        }
    }

    /// Drop records for nodes outside the surviving candidate set
    pub fn retain_nodes(&mut self, keep: impl Fn(&NodeProxy) -> bool) {
        self.entries.retain(|node, _| keep(node));
    }
}

/// Wrap the matched ranges of `text` in `open`/`close` markers.
///
/// Offsets are char offsets as produced by the matchers; overlapping or
/// unsorted inputs are handled by sorting and skipping overlaps.
pub fn highlight(text: &str, offsets: &[(usize, usize)], open: &str, close: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut ranges: Vec<(usize, usize)> = offsets
        .iter()
        .filter(|(start, len)| *len > 0 && start + len <= chars.len())
        .copied()
        .collect();
    ranges.sort();

    let mut out = String::with_capacity(text.len() + (open.len() + close.len()) * ranges.len());
    let mut pos = 0;
    for (start, len) in ranges {
        if start < pos {
            continue;
        }
        out.extend(&chars[pos..start]);
        out.push_str(open);
        out.extend(&chars[start..start + len]);
        out.push_str(close);
        pos = start + len;
    }
    out.extend(&chars[pos..]);
    out
}
