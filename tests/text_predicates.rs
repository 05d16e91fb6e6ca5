//! End-to-end predicate evaluation tests.
//!
//! The central property: every evaluation strategy (preselected, indexed
//! without preselection, linear scan) accepts exactly the same candidates
//! for the same corpus content. The suites build content-identical
//! corpora with different index configurations and compare results.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use roaring::RoaringBitmap;
use xtq::dom::{NodeProxy, NodeSet, QName};
use xtq::index::{IndexHits, MemoryIndex, SearchAxis, TermQuery, TextIndex};
use xtq::path::PathExpr;
use xtq::query::{
    preselect, Combinator, ContextSequence, Engine, SearchArg, SearchSpec, TextOp, TextPredicate,
};
use xtq::store::{Corpus, DocBuilder, IndexSpec};

const PARAS: &[&str] = &[
    "the quick brown fox jumps over the lazy dog",
    "a quick fox and a slow dog",
    "dogs chase cats and cats chase mice",
    "the cat sat on the mat beside another cat",
    "quick thinking saved the day",
    "no animals in this paragraph at all",
];

/// Honor RUST_LOG when debugging a failing case
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn build_corpus(spec: IndexSpec) -> Corpus {
    init_logging();
    let mut corpus = Corpus::new();
    let col = corpus.add_collection("library", spec);
    let mut doc = DocBuilder::new("book");
    doc.start("chapter");
    for text in &PARAS[..3] {
        doc.elem("para", text);
    }
    doc.end().start("chapter");
    for text in &PARAS[3..] {
        doc.elem("para", text);
    }
    doc.end();
    corpus.add_document(col, doc);
    corpus
}

fn sorted_ids(nodes: &NodeSet) -> Vec<NodeProxy> {
    nodes.clone().into_sorted()
}

/// Evaluate one operator three ways and insist on identical candidates.
fn assert_strategies_agree(op: TextOp, search: &str) {
    let indexed_corpus = build_corpus(IndexSpec::all());
    let plain_corpus = build_corpus(IndexSpec::none());

    let index = MemoryIndex::build(&indexed_corpus);
    let empty_index = MemoryIndex::build(&plain_corpus);

    let path = PathExpr::descendant("para");
    let arg = SearchArg::Literal(search.to_string());

    // indexed, with explicit preselection threaded through
    let engine = Engine {
        corpus: &indexed_corpus,
        index: &index,
    };
    let ctx = ContextSequence::new(indexed_corpus.all_documents());
    let mut pred = TextPredicate::new(op, path.clone(), arg.clone());
    assert!(pred.can_optimize(&engine, &ctx), "op {op:?} should optimize");
    let pre = pred.pre_select(&engine, &ctx, false).unwrap();
    let preselected = pred.eval(&engine, &ctx, None, Some(&pre)).unwrap();

    // indexed, optimizer skipped the preselection step
    let mut pred = TextPredicate::new(op, path.clone(), arg.clone());
    let direct = pred.eval(&engine, &ctx, None, None).unwrap();

    // no index coverage at all: linear scan
    let engine = Engine {
        corpus: &plain_corpus,
        index: &empty_index,
    };
    let ctx = ContextSequence::new(plain_corpus.all_documents());
    let mut pred = TextPredicate::new(op, path, arg);
    assert!(!pred.can_optimize(&engine, &ctx));
    let scanned = pred.eval(&engine, &ctx, None, None).unwrap();

    let a = sorted_ids(&preselected.nodes);
    let b = sorted_ids(&direct.nodes);
    let c = sorted_ids(&scanned.nodes);
    assert_eq!(a, b, "preselected vs direct for {op:?} {search:?}");
    assert_eq!(b, c, "indexed vs scanned for {op:?} {search:?}");
}

#[test]
fn test_contains_all_strategies_agree() {
    assert_strategies_agree(TextOp::ContainsAll, "fox");
    assert_strategies_agree(TextOp::ContainsAll, "quick fox");
    assert_strategies_agree(TextOp::ContainsAll, "quick brown fox");
    assert_strategies_agree(TextOp::ContainsAll, "zebra");
}

#[test]
fn test_contains_any_strategies_agree() {
    assert_strategies_agree(TextOp::ContainsAny, "fox zebra");
    assert_strategies_agree(TextOp::ContainsAny, "cat dog mouse");
}

#[test]
fn test_near_strategies_agree() {
    assert_strategies_agree(TextOp::Near { min: 0, max: 2 }, "quick fox");
    assert_strategies_agree(TextOp::Near { min: 0, max: 0 }, "quick fox");
    assert_strategies_agree(TextOp::Near { min: 2, max: 10 }, "cat cat");
}

#[test]
fn test_phrase_strategies_agree() {
    assert_strategies_agree(TextOp::Phrase, "quick fox");
    assert_strategies_agree(TextOp::Phrase, "lazy dog");
    assert_strategies_agree(TextOp::Phrase, "cats chase mice");
}

#[test]
fn test_wildcard_strategies_agree() {
    assert_strategies_agree(TextOp::ContainsAll, "c?t*");
    assert_strategies_agree(TextOp::ContainsAny, "qu* zebra");
}

#[test]
fn test_matches_strategies_agree() {
    assert_strategies_agree(TextOp::Matches, "*quick*fox*");
    assert_strategies_agree(TextOp::Matches, "quick thinking saved the day");
}

#[test]
fn test_phrase_counts() {
    let corpus = build_corpus(IndexSpec::all());
    let index = MemoryIndex::build(&corpus);
    let engine = Engine {
        corpus: &corpus,
        index: &index,
    };
    let ctx = ContextSequence::new(corpus.all_documents());
    let mut pred = TextPredicate::new(
        TextOp::Phrase,
        PathExpr::descendant("para"),
        SearchArg::Literal("quick fox".to_string()),
    );
    let result = pred.eval(&engine, &ctx, None, None).unwrap();
    // only "a quick fox and a slow dog" has the adjacent pair
    assert_eq!(result.nodes.len(), 1);
    let node = result.nodes.iter().next().unwrap();
    let records = result.matches.get(node).unwrap();
    assert_eq!(records[0].matched, "quick fox");
    assert_eq!(records[0].offsets, vec![(2, 9)]);
}

#[test]
fn test_partial_coverage_falls_back_to_scan() {
    // one covered and one uncovered collection in the same context
    let mut corpus = Corpus::new();
    let covered = corpus.add_collection("covered", IndexSpec::all());
    let uncovered = corpus.add_collection("uncovered", IndexSpec::none());

    let mut a = DocBuilder::new("book");
    a.elem("para", "the quick brown fox");
    corpus.add_document(covered, a);
    let mut b = DocBuilder::new("book");
    b.elem("para", "another quick fox entirely");
    corpus.add_document(uncovered, b);

    let index = MemoryIndex::build(&corpus);
    let engine = Engine {
        corpus: &corpus,
        index: &index,
    };
    let ctx = ContextSequence::new(corpus.all_documents());
    let mut pred = TextPredicate::new(
        TextOp::ContainsAll,
        PathExpr::descendant("para"),
        SearchArg::Literal("quick fox".to_string()),
    );

    // the optimizer must refuse the index, then the scan still finds
    // matches in BOTH collections
    assert!(!pred.can_optimize(&engine, &ctx));
    let result = pred.eval(&engine, &ctx, None, None).unwrap();
    assert_eq!(result.nodes.len(), 2);
}

#[test]
fn test_stop_words_force_scan_fallback() {
    init_logging();
    let spec =
        IndexSpec::from_json(r#"{"default_all": true, "stop_words": ["the"]}"#).unwrap();
    let mut corpus = Corpus::new();
    let col = corpus.add_collection("library", spec);
    let mut doc = DocBuilder::new("book");
    doc.elem("para", "the quick fox").elem("para", "a quick fox");
    corpus.add_document(col, doc);

    let index = MemoryIndex::build(&corpus);
    let engine = Engine {
        corpus: &corpus,
        index: &index,
    };
    let ctx = ContextSequence::new(corpus.all_documents());

    // "the" was filtered at build time, so a dictionary lookup would
    // miss the first para; the optimizer must refuse and the scan
    // verdict stands
    let mut pred = TextPredicate::new(
        TextOp::ContainsAll,
        PathExpr::descendant("para"),
        SearchArg::Literal("the fox".to_string()),
    );
    assert!(!pred.can_optimize(&engine, &ctx));
    let result = pred.eval(&engine, &ctx, None, None).unwrap();
    assert_eq!(result.nodes.len(), 1);

    // the same corpus still optimizes for terms off the stop list
    let mut pred = TextPredicate::new(
        TextOp::ContainsAll,
        PathExpr::descendant("para"),
        SearchArg::Literal("quick fox".to_string()),
    );
    assert!(pred.can_optimize(&engine, &ctx));
    let result = pred.eval(&engine, &ctx, None, None).unwrap();
    assert_eq!(result.nodes.len(), 2);
}

#[test]
fn test_system_collections_ignored_by_coverage_probe() {
    let mut corpus = Corpus::new();
    let col = corpus.add_collection("library", IndexSpec::all());
    corpus.add_system_collection("system", IndexSpec::none());
    let mut doc = DocBuilder::new("book");
    doc.elem("para", "the quick brown fox");
    corpus.add_document(col, doc);

    let index = MemoryIndex::build(&corpus);
    let engine = Engine {
        corpus: &corpus,
        index: &index,
    };
    let ctx = ContextSequence::new(corpus.all_documents());
    let pred = TextPredicate::new(
        TextOp::ContainsAll,
        PathExpr::descendant("para"),
        SearchArg::Literal("fox".to_string()),
    );
    assert!(pred.can_optimize(&engine, &ctx));
}

#[test]
fn test_cached_result_is_shared_across_calls() {
    let corpus = build_corpus(IndexSpec::all());
    let index = MemoryIndex::build(&corpus);
    let engine = Engine {
        corpus: &corpus,
        index: &index,
    };
    let ctx = ContextSequence::new(corpus.all_documents());
    let mut pred = TextPredicate::new(
        TextOp::ContainsAll,
        PathExpr::descendant("para"),
        SearchArg::Literal("fox".to_string()),
    );
    let first = pred.eval(&engine, &ctx, None, None).unwrap();
    let second = pred.eval(&engine, &ctx, None, None).unwrap();
    assert!(Rc::ptr_eq(&first.nodes, &second.nodes));

    let fresh = ContextSequence::new(corpus.all_documents());
    let third = pred.eval(&engine, &fresh, None, None).unwrap();
    assert!(!Rc::ptr_eq(&first.nodes, &third.nodes));
    assert_eq!(sorted_ids(&first.nodes), sorted_ids(&third.nodes));
}

/// Index wrapper that counts lookups, for observing short-circuits
struct CountingIndex<'a> {
    inner: &'a MemoryIndex,
    lookups: Cell<usize>,
}

impl TextIndex for CountingIndex<'_> {
    fn query(
        &self,
        docs: &RoaringBitmap,
        context: Option<&NodeSet>,
        axis: SearchAxis,
        qname: Option<&QName>,
        term: &TermQuery,
    ) -> Result<IndexHits> {
        self.lookups.set(self.lookups.get() + 1);
        self.inner.query(docs, context, axis, qname, term)
    }
}

#[test]
fn test_and_preselection_short_circuits_after_empty_term() {
    let corpus = build_corpus(IndexSpec::all());
    let inner = MemoryIndex::build(&corpus);
    let counting = CountingIndex {
        inner: &inner,
        lookups: Cell::new(0),
    };
    let docs = corpus.all_documents();
    let para = QName::element("para");

    // first term has no hits at all, so the remaining lookups are skipped
    let spec = SearchSpec::parse("zebra quick fox", Combinator::All);
    let hits = preselect(
        &counting,
        &docs,
        None,
        SearchAxis::Descendant,
        Some(&para),
        &spec,
    )
    .unwrap();
    assert!(hits.nodes.is_empty());
    assert_eq!(counting.lookups.get(), 1);

    // OR never short-circuits
    counting.lookups.set(0);
    let spec = SearchSpec::parse("zebra quick fox", Combinator::Any);
    let hits = preselect(
        &counting,
        &docs,
        None,
        SearchAxis::Descendant,
        Some(&para),
        &spec,
    )
    .unwrap();
    assert!(!hits.nodes.is_empty());
    assert_eq!(counting.lookups.get(), 3);
}

#[test]
fn test_context_restricted_preselection() {
    let corpus = build_corpus(IndexSpec::all());
    let index = MemoryIndex::build(&corpus);
    let engine = Engine {
        corpus: &corpus,
        index: &index,
    };
    let docs = corpus.all_documents();

    // restrict the context to the first chapter only
    let chapters = PathExpr::descendant("chapter").eval(&corpus, &docs, None);
    let first_chapter: NodeSet = chapters
        .clone()
        .into_sorted()
        .into_iter()
        .take(1)
        .collect();
    let ctx = ContextSequence::with_nodes(docs, first_chapter);

    let pred = TextPredicate::new(
        TextOp::ContainsAll,
        PathExpr::descendant("para"),
        SearchArg::Literal("quick".to_string()),
    );
    let scoped = pred.pre_select(&engine, &ctx, true).unwrap();
    let unscoped = pred.pre_select(&engine, &ctx, false).unwrap();
    // "quick" occurs in paras of both chapters; the context keeps chapter one
    assert_eq!(scoped.nodes.len(), 2);
    assert_eq!(unscoped.nodes.len(), 3);
}

#[test]
fn test_near_distance_window_end_to_end() {
    let mut corpus = Corpus::new();
    let col = corpus.add_collection("library", IndexSpec::all());
    let mut doc = DocBuilder::new("book");
    doc.elem("para", "cat dog cat mouse")
        .elem("para", "cat dog dog mouse")
        .elem("para", "cat mouse");
    corpus.add_document(col, doc);

    let index = MemoryIndex::build(&corpus);
    let engine = Engine {
        corpus: &corpus,
        index: &index,
    };
    let ctx = ContextSequence::new(corpus.all_documents());

    let mut loose = TextPredicate::new(
        TextOp::Near { min: 0, max: 2 },
        PathExpr::descendant("para"),
        SearchArg::Literal("cat mouse".to_string()),
    );
    let result = loose.eval(&engine, &ctx, None, None).unwrap();
    // the repeated "cat" restarts the window in the first para
    assert_eq!(result.nodes.len(), 3);

    let mut tight = TextPredicate::new(
        TextOp::Near { min: 0, max: 1 },
        PathExpr::descendant("para"),
        SearchArg::Literal("cat mouse".to_string()),
    );
    let result = tight.eval(&engine, &ctx, None, None).unwrap();
    assert_eq!(result.nodes.len(), 2);
}

#[test]
fn test_context_item_search_argument() {
    // search terms drawn from a sibling element of each candidate
    let mut corpus = Corpus::new();
    let col = corpus.add_collection("library", IndexSpec::all());
    let mut doc = DocBuilder::new("book");
    doc.start("entry")
        .elem("keyword", "fox")
        .elem("para", "the quick brown fox")
        .end()
        .start("entry")
        .elem("keyword", "zebra")
        .elem("para", "no stripes here")
        .end();
    corpus.add_document(col, doc);

    let index = MemoryIndex::build(&corpus);
    let engine = Engine {
        corpus: &corpus,
        index: &index,
    };
    let docs = corpus.all_documents();
    let entries = PathExpr::descendant("entry").eval(&corpus, &docs, None);
    let ctx = ContextSequence::with_nodes(docs, entries);

    fn keyword_of(engine: &Engine<'_>, entry: &NodeProxy) -> String {
        engine
            .corpus
            .children(entry)
            .into_iter()
            .find(|child| child.name.as_deref() == Some("keyword"))
            .and_then(|child| {
                engine
                    .corpus
                    .document(entry.doc)
                    .and_then(|d| d.text_value(&child.id))
            })
            .unwrap_or_default()
    }

    let mut pred = TextPredicate::new(
        TextOp::ContainsAll,
        PathExpr::descendant("para"),
        SearchArg::ContextItem(keyword_of),
    );
    assert!(!pred.can_optimize(&engine, &ctx));
    let result = pred.eval(&engine, &ctx, None, None).unwrap();
    // only the first entry's para contains its own keyword
    assert_eq!(result.nodes.len(), 1);
}
