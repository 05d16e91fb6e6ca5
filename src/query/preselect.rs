//! Candidate preselection through the structural index.
//!
//! Each term becomes one index lookup; the per-term hit sets are combined
//! according to the combinator. ANDed terms use the structural deep
//! intersection so a hit reported on a descendant still satisfies the
//! candidate, and an empty running set short-circuits the remaining
//! lookups.

use crate::dom::{MatchMap, NodeSet, QName};
use crate::index::{IndexHits, SearchAxis, TermQuery, TextIndex};
use crate::query::spec::{Combinator, SearchSpec};
use crate::text::{compile_term, literal_prefix};
use anyhow::Result;
use roaring::RoaringBitmap;
use tracing::debug;

/// Run one lookup per term and combine the hit sets.
///
/// `qname` scopes lookups to the analyzed target name; `context` plus
/// `axis` control how hits relate to an already-computed context set.
pub fn preselect(
    index: &dyn TextIndex,
    docs: &RoaringBitmap,
    context: Option<&NodeSet>,
    axis: SearchAxis,
    qname: Option<&QName>,
    spec: &SearchSpec,
) -> Result<IndexHits> {
    let mut combined: Option<NodeSet> = None;
    let mut matches = MatchMap::new();

    for term in &spec.terms {
        let query = if term.has_wildcard {
            TermQuery::Pattern {
                matcher: compile_term(&term.text)?,
                prefix: literal_prefix(&term.text),
            }
        } else {
            TermQuery::Exact(term.text.clone())
        };
        let hits = index.query(docs, context, axis, qname, &query)?;
        matches.extend(hits.matches);

        combined = Some(match (combined, spec.combinator) {
            (None, _) => hits.nodes,
            (Some(acc), Combinator::All) => acc.deep_intersect(&hits.nodes),
            (Some(acc), Combinator::Any) => acc.union(&hits.nodes),
        });

        if spec.combinator == Combinator::All && combined.as_ref().is_some_and(NodeSet::is_empty) {
            debug!(term = %term.text, "preselection emptied, skipping remaining terms");
            break;
        }
    }

    let nodes = combined.unwrap_or_default();
    matches.retain_nodes(|node| {
        nodes
            .iter()
            .any(|kept| kept == node || kept.contains(node) || node.contains(kept))
    });
    Ok(IndexHits { nodes, matches })
}
