//! The text predicate and its optimizer contract.
//!
//! A [`TextPredicate`] bundles a location path, a text operator and a
//! search argument. The query optimizer drives it through a fixed
//! protocol: probe with [`TextPredicate::can_optimize`], optionally run
//! [`TextPredicate::pre_select`] against the whole input, then call
//! [`TextPredicate::eval`] with the preselection threaded back in. Every
//! branch of `eval` agrees on the verdict; the branches differ only in
//! how much work the structural index saves.

use crate::dom::{MatchMap, NodeProxy, NodeSet, QName};
use crate::index::{IndexHits, SearchAxis, TermQuery, TextIndex};
use crate::path::{analyze, Axis, PathExpr, TargetInfo};
use crate::query::preselect::preselect;
use crate::query::scan::{scan_contains, scan_near, scan_phrase};
use crate::query::spec::{Combinator, SearchSpec};
use crate::store::{fully_indexed, Corpus};
use crate::text::{compile_term, Tokenizer};
use anyhow::Result;
use regex::Regex;
use roaring::RoaringBitmap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Shared evaluation environment: the corpus and its structural index
pub struct Engine<'a> {
    pub corpus: &'a Corpus,
    pub index: &'a dyn TextIndex,
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The input sequence one predicate evaluation runs against.
///
/// Each sequence carries a fresh identity; cached results are keyed on
/// it, so re-evaluating against the same sequence reuses the result
/// while a new sequence forces recomputation.
#[derive(Debug, Clone)]
pub struct ContextSequence {
    pub docs: RoaringBitmap,
    pub nodes: Option<NodeSet>,
    identity: u64,
}

impl ContextSequence {
    pub fn new(docs: RoaringBitmap) -> Self {
        Self {
            docs,
            nodes: None,
            identity: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn with_nodes(docs: RoaringBitmap, nodes: NodeSet) -> Self {
        Self {
            docs,
            nodes: Some(nodes),
            identity: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn identity(&self) -> u64 {
        self.identity
    }
}

/// The text operator a predicate applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    /// Every term occurs in the candidate's text value
    ContainsAll,
    /// At least one term occurs
    ContainsAny,
    /// Terms occur in order within the given word distances
    Near { min: usize, max: usize },
    /// Terms occur strictly adjacent, in order
    Phrase,
    /// A glob pattern matches the complete text value
    Matches,
}

impl TextOp {
    fn needs_scan(&self) -> bool {
        matches!(self, TextOp::Near { .. } | TextOp::Phrase)
    }
}

/// The search argument of a predicate.
///
/// A literal argument is known before evaluation starts, so index
/// preselection and result caching apply. An argument computed from the
/// context item forces per-item evaluation and disables both.
#[derive(Clone)]
pub enum SearchArg {
    Literal(String),
    ContextItem(fn(&Engine<'_>, &NodeProxy) -> String),
}

impl std::fmt::Debug for SearchArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchArg::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            SearchArg::ContextItem(_) => f.write_str("ContextItem(..)"),
        }
    }
}

/// One finished evaluation: the accepted candidates plus their match
/// records. The node set is shared so a cache hit hands out the same
/// allocation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub nodes: Rc<NodeSet>,
    pub matches: MatchMap,
}

impl Evaluation {
    fn empty() -> Self {
        Self {
            nodes: Rc::new(NodeSet::new()),
            matches: MatchMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedResult {
    ctx_id: u64,
    result: Rc<NodeSet>,
    matches: MatchMap,
}

/// An index-optimizable text predicate over a location path.
#[derive(Debug)]
pub struct TextPredicate {
    op: TextOp,
    path: PathExpr,
    search: SearchArg,
    target: Option<TargetInfo>,
    cached: Option<CachedResult>,
}

impl TextPredicate {
    /// Build a predicate; the path is analyzed once for an index target.
    pub fn new(op: TextOp, path: PathExpr, search: SearchArg) -> Self {
        let target = analyze(&path);
        Self {
            op,
            path,
            search,
            target,
            cached: None,
        }
    }

    /// Supply the target name externally when the path alone cannot name
    /// it (a bare self-axis step, where the enclosing expression knows
    /// which element is being filtered).
    pub fn with_enclosing_target(mut self, qname: QName) -> Self {
        if self.target.is_none() {
            self.target = Some(TargetInfo {
                qname,
                axis: Axis::SelfAxis,
            });
        }
        self
    }

    pub fn target(&self) -> Option<&TargetInfo> {
        self.target.as_ref()
    }

    /// Whether index preselection applies: the path names a single
    /// target, the search argument is known up front, every collection
    /// holding context documents indexes that target, and no search
    /// term falls to a collection's stop list or token length cap.
    pub fn can_optimize(&self, engine: &Engine, ctx: &ContextSequence) -> bool {
        let Some(target) = &self.target else {
            return false;
        };
        let SearchArg::Literal(input) = &self.search else {
            return false;
        };
        if !fully_indexed(engine.corpus, &ctx.docs, &target.qname) {
            debug!(qname = %target.qname, "index coverage incomplete, falling back");
            return false;
        }
        if !matches!(self.op, TextOp::Matches) {
            let spec = self.parse_search(input);
            if !terms_indexed(engine.corpus, &ctx.docs, &spec) {
                debug!("search terms filtered at index time, falling back");
                return false;
            }
        }
        true
    }

    /// Whether the optimizer should rewrite on the filtered step itself
    pub fn optimize_on_self(&self) -> bool {
        self.target
            .as_ref()
            .is_some_and(|t| t.axis.is_self())
    }

    /// Whether the rewrite targets a child or attribute of the filtered step
    pub fn optimize_on_child(&self) -> bool {
        self.target
            .as_ref()
            .is_some_and(|t| matches!(t.axis, Axis::Child | Axis::Attribute))
    }

    pub fn optimize_axis(&self) -> Option<Axis> {
        self.target.as_ref().map(|t| t.axis)
    }

    /// Index preselection over the whole input.
    ///
    /// Returns every target-name node in the context documents whose text
    /// satisfies the term lookups, before any path evaluation. Pure: the
    /// result is handed back into [`TextPredicate::eval`] by the caller.
    /// With `use_context` the lookup is additionally restricted to
    /// descendants of the context nodes.
    pub fn pre_select(
        &self,
        engine: &Engine,
        ctx: &ContextSequence,
        use_context: bool,
    ) -> Result<IndexHits> {
        let SearchArg::Literal(input) = &self.search else {
            anyhow::bail!("preselection requires a literal search argument");
        };
        let qname = self.target.as_ref().map(|t| &t.qname);
        let context = if use_context { ctx.nodes.as_ref() } else { None };

        match self.op {
            TextOp::Matches => {
                let matcher = compile_term(input)?;
                engine.index.query(
                    &ctx.docs,
                    context,
                    SearchAxis::Descendant,
                    qname,
                    &TermQuery::ValuePattern(matcher),
                )
            }
            _ => {
                let Some((spec, _)) = self.parse_validated(input)? else {
                    return Ok(IndexHits::empty());
                };
                preselect(
                    engine.index,
                    &ctx.docs,
                    context,
                    SearchAxis::Descendant,
                    qname,
                    &spec,
                )
            }
        }
    }

    /// Evaluate the predicate.
    ///
    /// `item` narrows evaluation to a single context item; `preselected`
    /// threads a prior [`TextPredicate::pre_select`] result back in.
    /// Branch order follows the optimizer: a threaded preselection is
    /// intersected with the path result and refined, an indexed context
    /// is post-selected through ancestor-axis lookups, and everything
    /// else scans the path result linearly. All branches return the same
    /// candidates for the same input.
    pub fn eval(
        &mut self,
        engine: &Engine,
        ctx: &ContextSequence,
        item: Option<&NodeProxy>,
        preselected: Option<&IndexHits>,
    ) -> Result<Evaluation> {
        if let Some(pre) = preselected {
            if pre.nodes.is_empty() {
                return Ok(Evaluation::empty());
            }
            return self.eval_preselected(engine, ctx, pre);
        }

        let cacheable = matches!(self.search, SearchArg::Literal(_)) && item.is_none();
        if cacheable {
            if let Some(cached) = &self.cached {
                if cached.ctx_id == ctx.identity {
                    debug!("reusing cached predicate result");
                    return Ok(Evaluation {
                        nodes: Rc::clone(&cached.result),
                        matches: cached.matches.clone(),
                    });
                }
            }
        }

        let result = match (&self.search, item) {
            (SearchArg::Literal(input), _) => {
                let input = input.clone();
                self.eval_resolved(engine, ctx, item, &input)?
            }
            (SearchArg::ContextItem(f), Some(node)) => {
                let input = f(engine, node);
                self.eval_resolved(engine, ctx, Some(node), &input)?
            }
            (SearchArg::ContextItem(f), None) => {
                // argument depends on the item, so evaluate one at a time
                let f = *f;
                let items: Vec<NodeProxy> = match &ctx.nodes {
                    Some(nodes) => nodes.iter().cloned().collect(),
                    None => return Ok(Evaluation::empty()),
                };
                let mut nodes = NodeSet::new();
                let mut matches = MatchMap::new();
                for node in &items {
                    let input = f(engine, node);
                    let partial = self.eval_resolved(engine, ctx, Some(node), &input)?;
                    for n in partial.nodes.iter() {
                        nodes.insert(n.clone());
                    }
                    matches.extend(partial.matches);
                }
                Evaluation {
                    nodes: Rc::new(nodes),
                    matches,
                }
            }
        };

        if cacheable {
            self.cached = Some(CachedResult {
                ctx_id: ctx.identity,
                result: Rc::clone(&result.nodes),
                matches: result.matches.clone(),
            });
        }
        Ok(result)
    }

    /// Drop evaluation state between runs. After an optimizer pass the
    /// cached result is kept, since the rewritten plan re-evaluates
    /// against the same input; any other reset clears it.
    pub fn reset_state(&mut self, post_optimization: bool) {
        if !post_optimization {
            self.cached = None;
        }
    }

    fn parse_search(&self, input: &str) -> SearchSpec {
        match self.op {
            TextOp::ContainsAll => SearchSpec::parse(input, Combinator::All),
            TextOp::ContainsAny => SearchSpec::parse(input, Combinator::Any),
            TextOp::Near { min, max } => SearchSpec::near(input, min, max),
            TextOp::Phrase => SearchSpec::phrase(input),
            TextOp::Matches => unreachable!("matches does not tokenize"),
        }
    }

    /// Parse the search input and compile its matchers, applying the
    /// per-operator error policy. `None` means the phrase-mode pattern
    /// was malformed and the evaluation matches nothing.
    fn parse_validated(&self, input: &str) -> Result<Option<(SearchSpec, Option<Vec<Regex>>)>> {
        let spec = self.parse_search(input);
        match self.compile_matchers(&spec)? {
            CompiledMatchers::Plain => Ok(Some((spec, None))),
            CompiledMatchers::Patterns(m) => Ok(Some((spec, Some(m)))),
            CompiledMatchers::Invalid => Ok(None),
        }
    }

    fn eval_preselected(
        &self,
        engine: &Engine,
        ctx: &ContextSequence,
        pre: &IndexHits,
    ) -> Result<Evaluation> {
        let selected = self
            .path
            .eval(engine.corpus, &ctx.docs, ctx.nodes.as_ref());
        let candidates = selected.intersect(&pre.nodes);
        let mut matches = pre.matches.clone();
        matches.retain_nodes(|node| {
            candidates
                .iter()
                .any(|kept| kept == node || kept.contains(node))
        });
        if !self.op.needs_scan() {
            return Ok(Evaluation {
                nodes: Rc::new(candidates),
                matches,
            });
        }
        let SearchArg::Literal(input) = &self.search else {
            anyhow::bail!("preselection requires a literal search argument");
        };
        self.refine_by_scan(engine, candidates, input)
    }

    /// Indexed evaluation without a prior preselection: look the terms up
    /// with the ancestor axis so hits map back onto the path result.
    fn eval_indexed(
        &self,
        engine: &Engine,
        selected: NodeSet,
        input: &str,
    ) -> Result<Evaluation> {
        let qname = self.target.as_ref().map(|t| &t.qname);
        let docs = selected.document_set();
        let hits = match self.op {
            TextOp::Matches => {
                let matcher = compile_term(input)?;
                engine.index.query(
                    &docs,
                    Some(&selected),
                    SearchAxis::Ancestor,
                    qname,
                    &TermQuery::ValuePattern(matcher),
                )?
            }
            _ => {
                let Some((spec, _)) = self.parse_validated(input)? else {
                    return Ok(Evaluation::empty());
                };
                preselect(
                    engine.index,
                    &docs,
                    Some(&selected),
                    SearchAxis::Ancestor,
                    qname,
                    &spec,
                )?
            }
        };
        if !self.op.needs_scan() {
            return Ok(Evaluation {
                nodes: Rc::new(hits.nodes),
                matches: hits.matches,
            });
        }
        self.refine_by_scan(engine, hits.nodes, input)
    }

    fn eval_resolved(
        &self,
        engine: &Engine,
        ctx: &ContextSequence,
        item: Option<&NodeProxy>,
        input: &str,
    ) -> Result<Evaluation> {
        let item_set: Option<NodeSet> = item.map(|n| std::iter::once(n.clone()).collect());
        let context = item_set.as_ref().or(ctx.nodes.as_ref());
        let selected = self.path.eval(engine.corpus, &ctx.docs, context);
        if selected.is_empty() {
            return Ok(Evaluation::empty());
        }

        let indexed = self.target.as_ref().is_some_and(|t| {
            fully_indexed(engine.corpus, &ctx.docs, &t.qname)
                && (matches!(self.op, TextOp::Matches)
                    || terms_indexed(engine.corpus, &ctx.docs, &self.parse_search(input)))
        });
        if indexed {
            return self.eval_indexed(engine, selected, input);
        }
        self.eval_generic(engine, selected, input)
    }

    /// Reject preselected or indexed candidates whose token order or
    /// distance fails the proximity constraint.
    fn refine_by_scan(
        &self,
        engine: &Engine,
        candidates: NodeSet,
        input: &str,
    ) -> Result<Evaluation> {
        let Some((spec, matchers)) = self.parse_validated(input)? else {
            return Ok(Evaluation::empty());
        };
        let mut nodes = NodeSet::new();
        let mut matches = MatchMap::new();
        for node in candidates.iter() {
            let Some(text) = engine.corpus.text_value(node) else {
                continue;
            };
            let hit = match self.op {
                TextOp::Phrase => {
                    scan_phrase(&spec, matchers.as_deref(), node.clone(), &text, &mut matches)
                }
                _ => scan_near(&spec, matchers.as_deref(), &text),
            };
            if hit {
                nodes.insert(node.clone());
                if !matches!(self.op, TextOp::Phrase) {
                    record_term_hits(&spec, matchers.as_deref(), node, &text, &mut matches);
                }
            }
        }
        matches.retain_nodes(|node| nodes.contains(node));
        Ok(Evaluation {
            nodes: Rc::new(nodes),
            matches,
        })
    }

    /// Linear fallback: tokenize every selected node's text value.
    fn eval_generic(
        &self,
        engine: &Engine,
        selected: NodeSet,
        input: &str,
    ) -> Result<Evaluation> {
        if matches!(self.op, TextOp::Matches) {
            return self.eval_generic_matches(engine, selected, input);
        }

        let Some((spec, matchers)) = self.parse_validated(input)? else {
            return Ok(Evaluation::empty());
        };

        let mut nodes = NodeSet::new();
        let mut matches = MatchMap::new();
        for node in selected.iter() {
            let Some(text) = engine.corpus.text_value(node) else {
                continue;
            };
            let hit = match self.op {
                TextOp::ContainsAll | TextOp::ContainsAny => {
                    let hit = scan_contains(&spec, matchers.as_deref(), &text);
                    if hit {
                        record_term_hits(&spec, matchers.as_deref(), node, &text, &mut matches);
                    }
                    hit
                }
                TextOp::Near { .. } => {
                    let hit = scan_near(&spec, matchers.as_deref(), &text);
                    if hit {
                        record_term_hits(&spec, matchers.as_deref(), node, &text, &mut matches);
                    }
                    hit
                }
                TextOp::Phrase => {
                    scan_phrase(&spec, matchers.as_deref(), node.clone(), &text, &mut matches)
                }
                TextOp::Matches => unreachable!(),
            };
            if hit {
                nodes.insert(node.clone());
            }
        }
        Ok(Evaluation {
            nodes: Rc::new(nodes),
            matches,
        })
    }

    fn eval_generic_matches(
        &self,
        engine: &Engine,
        selected: NodeSet,
        input: &str,
    ) -> Result<Evaluation> {
        let matcher = compile_term(input)?;
        let mut nodes = NodeSet::new();
        let mut matches = MatchMap::new();
        for node in selected.iter() {
            let Some(text) = engine.corpus.text_value(node) else {
                continue;
            };
            if matcher.is_match(&text) {
                matches.add(node.clone(), text.clone(), 0, text.chars().count());
                nodes.insert(node.clone());
            }
        }
        Ok(Evaluation {
            nodes: Rc::new(nodes),
            matches,
        })
    }

    /// A malformed pattern is a hard error for every operator except
    /// phrase, which logs it and matches nothing: inside a phrase the
    /// metacharacters were most likely meant literally, and failing the
    /// whole query over them helps nobody.
    fn compile_matchers(&self, spec: &SearchSpec) -> Result<CompiledMatchers> {
        match spec.compile_matchers() {
            Ok(None) => Ok(CompiledMatchers::Plain),
            Ok(Some(m)) => Ok(CompiledMatchers::Patterns(m)),
            Err(err) if matches!(self.op, TextOp::Phrase) => {
                warn!(error = %err, "ignoring malformed pattern in phrase search");
                Ok(CompiledMatchers::Invalid)
            }
            Err(err) => Err(err),
        }
    }
}

enum CompiledMatchers {
    Plain,
    Patterns(Vec<Regex>),
    Invalid,
}

/// True only if every non-system collection touched by `docs` would
/// have indexed every search term. A stop-listed or over-long term
/// never reached the dictionary, so an index lookup for it drops hits
/// the linear scan finds. A wildcard term could match a stop-listed
/// token, so it requires an empty stop list.
fn terms_indexed(corpus: &Corpus, docs: &RoaringBitmap, spec: &SearchSpec) -> bool {
    let mut collections = RoaringBitmap::new();
    for doc in docs {
        let Some(collection) = corpus.collection_of(doc) else {
            return false;
        };
        if !collections.insert(collection.id) || collection.system {
            continue;
        }
        for term in &spec.terms {
            let covered = if term.has_wildcard {
                collection.index.stop_words.is_empty()
            } else {
                collection.index.indexes_token(&term.text)
            };
            if !covered {
                return false;
            }
        }
    }
    true
}

/// Record every occurrence of every term on an accepted node
fn record_term_hits(
    spec: &SearchSpec,
    matchers: Option<&[Regex]>,
    node: &NodeProxy,
    text: &str,
    matches: &mut MatchMap,
) {
    for token in Tokenizer::new(text) {
        let lowered = token.text.to_lowercase();
        let hit = match matchers {
            Some(m) => m.iter().any(|matcher| matcher.is_match(&lowered)),
            None => spec.terms.iter().any(|t| t.text == lowered),
        };
        if hit {
            matches.add(
                node.clone(),
                token.text.to_string(),
                token.start,
                token.len(),
            );
        }
    }
}
