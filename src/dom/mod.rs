//! Data model for candidate nodes and match records.
//!
//! - [`types`] - document/node identifiers and qualified names
//! - [`node_set`] - duplicate-free node sets with structural operations
//! - [`matches`] - per-evaluation match records with highlight offsets

pub mod matches;
pub mod node_set;
pub mod types;

pub use matches::{highlight, MatchMap, TextMatch};
pub use node_set::NodeSet;
pub use types::{CollectionId, DocId, NameKind, NodeId, NodeProxy, QName};
