//! # XTQ - Index-Optimized XML Text Queries
//!
//! XTQ evaluates full-text predicates (`contains`, `near`, `phrase`,
//! `matches`) over a native XML store, using a structural inverted index
//! to preselect candidates before any node is touched, and falling back
//! to a linear token scan wherever index coverage is incomplete.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`dom`] - document/node identifiers, node sets, match records
//! - [`store`] - collections, documents and index configuration
//! - [`path`] - location paths and the index-target analyzer
//! - [`index`] - the structural text-index interface and its in-memory
//!   implementation
//! - [`text`] - word tokenizing and glob-to-regex translation
//! - [`query`] - search parsing, preselection, token scanning and the
//!   optimizable text predicate
//!
//! ## Quick Start
//!
//! ```
//! use xtq::index::MemoryIndex;
//! use xtq::path::PathExpr;
//! use xtq::query::{ContextSequence, Engine, SearchArg, TextOp, TextPredicate};
//! use xtq::store::{Corpus, DocBuilder, IndexSpec};
//!
//! let mut corpus = Corpus::new();
//! let col = corpus.add_collection("library", IndexSpec::all());
//! let mut book = DocBuilder::new("book");
//! book.elem("para", "the quick brown fox");
//! corpus.add_document(col, book);
//!
//! let index = MemoryIndex::build(&corpus);
//! let engine = Engine { corpus: &corpus, index: &index };
//! let ctx = ContextSequence::new(corpus.all_documents());
//!
//! let mut pred = TextPredicate::new(
//!     TextOp::ContainsAll,
//!     PathExpr::descendant("para"),
//!     SearchArg::Literal("quick fox".to_string()),
//! );
//! let result = pred.eval(&engine, &ctx, None, None).unwrap();
//! assert_eq!(result.nodes.len(), 1);
//! ```
//!
//! ## Evaluation strategy
//!
//! A predicate moves through a fixed optimizer protocol. The path is
//! analyzed once for a single target name; if every collection holding
//! context documents indexes that name, the terms are looked up in the
//! index and only the surviving candidates are ever materialized.
//! Proximity and phrase operators then re-scan just those survivors to
//! check ordering and word distance. When coverage is partial the whole
//! evaluation drops to the scan, so results never depend on which
//! collections happen to be indexed.

pub mod dom;
pub mod index;
pub mod path;
pub mod query;
pub mod store;
pub mod text;
