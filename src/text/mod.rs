//! Text-level building blocks: tokenizing and wildcard translation.
//!
//! - [`tokenizer`] - word tokenizer with char offsets
//! - [`glob`] - glob-style search terms to compiled regexes

pub mod glob;
pub mod tokenizer;

pub use glob::{compile_term, contains_wildcards, glob_to_regex, literal_prefix};
pub use tokenizer::{Token, Tokenizer};
