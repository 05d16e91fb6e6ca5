//! Text predicate evaluation: search parsing, index preselection,
//! token scanning and the optimizer-facing predicate itself.

pub mod predicate;
pub mod preselect;
pub mod scan;
pub mod spec;

pub use predicate::{ContextSequence, Engine, Evaluation, SearchArg, TextOp, TextPredicate};
pub use preselect::preselect;
pub use scan::{scan_contains, scan_near, scan_phrase};
pub use spec::{Combinator, SearchSpec, Term};
