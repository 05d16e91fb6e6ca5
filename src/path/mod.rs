//! Path expressions: a tagged-union AST, the location-step analyzer that
//! decides index eligibility, and a minimal structural evaluator.
//!
//! The real query engine's path evaluator is an external collaborator;
//! the walk implemented here covers exactly the axes the text predicates
//! and their tests need.

use crate::dom::{NameKind, NodeProxy, NodeSet, QName};
use crate::store::{Corpus, NodeData, NodeKind};
use roaring::RoaringBitmap;

/// Traversal axis of a location step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    SelfAxis,
    Child,
    Attribute,
    Descendant,
    DescendantOrSelf,
    DescendantAttribute,
}

impl Axis {
    pub fn is_self(&self) -> bool {
        matches!(self, Axis::SelfAxis)
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, Axis::Attribute | Axis::DescendantAttribute)
    }
}

/// Name test of a location step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`: matches any name and disables index optimization
    Wildcard,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationStep {
    pub axis: Axis,
    pub test: NameTest,
}

impl LocationStep {
    pub fn new(axis: Axis, name: &str) -> Self {
        Self {
            axis,
            test: NameTest::Name(name.to_string()),
        }
    }

    pub fn wildcard(axis: Axis) -> Self {
        Self {
            axis,
            test: NameTest::Wildcard,
        }
    }

    fn matches(&self, node: &NodeData) -> bool {
        let kind_ok = if self.axis.is_attribute() {
            node.kind == NodeKind::Attribute
        } else {
            node.kind == NodeKind::Element
        };
        kind_ok
            && match &self.test {
                NameTest::Wildcard => true,
                NameTest::Name(name) => node.name.as_deref() == Some(name.as_str()),
            }
    }
}

/// A path expression: a chain of location steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub steps: Vec<LocationStep>,
}

impl PathExpr {
    pub fn new(steps: Vec<LocationStep>) -> Self {
        Self { steps }
    }

    /// Shorthand for a single `//name` step
    pub fn descendant(name: &str) -> Self {
        Self::new(vec![LocationStep::new(Axis::Descendant, name)])
    }

    /// Evaluate the path over the given documents, starting from
    /// `context` when present and from the document roots otherwise.
    pub fn eval(&self, corpus: &Corpus, docs: &RoaringBitmap, context: Option<&NodeSet>) -> NodeSet {
        let mut current: NodeSet = match context {
            Some(nodes) => nodes.iter().cloned().collect(),
            None => docs
                .iter()
                .filter_map(|d| {
                    corpus
                        .document(d)
                        .map(|doc| NodeProxy::new(d, doc.root().id.clone()))
                })
                .collect(),
        };

        for step in &self.steps {
            let mut next = NodeSet::new();
            for node in &current {
                self.apply_step(corpus, step, node, &mut next);
            }
            current = next;
        }
        current
    }

    fn apply_step(&self, corpus: &Corpus, step: &LocationStep, node: &NodeProxy, out: &mut NodeSet) {
        match step.axis {
            Axis::SelfAxis => {
                if corpus.node(node).is_some_and(|n| step.matches(n)) {
                    out.insert(node.clone());
                }
            }
            Axis::Child | Axis::Attribute => {
                for child in corpus.children(node) {
                    if step.matches(child) {
                        out.insert(NodeProxy::new(node.doc, child.id.clone()));
                    }
                }
            }
            Axis::Descendant | Axis::DescendantAttribute => {
                self.walk_descendants(corpus, step, node, false, out);
            }
            Axis::DescendantOrSelf => {
                self.walk_descendants(corpus, step, node, true, out);
            }
        }
    }

    fn walk_descendants(
        &self,
        corpus: &Corpus,
        step: &LocationStep,
        node: &NodeProxy,
        include_self: bool,
        out: &mut NodeSet,
    ) {
        if include_self && corpus.node(node).is_some_and(|n| step.matches(n)) {
            out.insert(node.clone());
        }
        for child in corpus.children(node) {
            let child_proxy = NodeProxy::new(node.doc, child.id.clone());
            if step.matches(child) {
                out.insert(child_proxy.clone());
            }
            if child.kind == NodeKind::Element {
                self.walk_descendants(corpus, step, &child_proxy, false, out);
            }
        }
    }
}

/// Outcome of the location-step analysis: the concrete name the index can
/// anchor on, and the axis the optimizer should traverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub qname: QName,
    pub axis: Axis,
}

/// Location-Step Analyzer.
///
/// Returns `None` when the path gives the optimizer nothing to anchor on:
/// a wildcard target name, an empty path, or a lone self-axis step (the
/// real target then lives on the enclosing step, which the predicate
/// cannot see from here).
pub fn analyze(path: &PathExpr) -> Option<TargetInfo> {
    let steps = &path.steps;
    if steps.is_empty() {
        return None;
    }
    if steps.len() == 1 && steps[0].axis.is_self() {
        // self-axis steps carry no new name
        return None;
    }

    let last = steps.last().unwrap();
    let NameTest::Name(name) = &last.test else {
        return None;
    };

    let kind = if last.axis.is_attribute() {
        NameKind::Attribute
    } else {
        NameKind::Element
    };
    let qname = QName {
        local: name.clone(),
        kind,
    };

    let mut axis = steps[0].axis;
    if axis.is_self() && steps.len() > 1 {
        axis = steps[1].axis;
    }

    Some(TargetInfo { qname, axis })
}
