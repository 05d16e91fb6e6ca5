use crate::text::{compile_term, contains_wildcards, Tokenizer};
use anyhow::Result;
use regex::Regex;

/// How per-term hit sets are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Every term must hit (intersection)
    All,
    /// Any term may hit (union)
    Any,
}

/// One search term, flagged when it needs pattern matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub text: String,
    pub has_wildcard: bool,
}

/// A parsed search argument.
///
/// Parsed per evaluation call from the argument's runtime string value:
/// the search string may itself be data-dependent, so there is nothing to
/// compile ahead of time. Term order and repetition are preserved for
/// the proximity and phrase matchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    pub terms: Vec<Term>,
    pub combinator: Combinator,
    /// Minimum word distance between consecutive terms
    pub min_distance: usize,
    /// Maximum word distance between consecutive terms
    pub max_distance: usize,
}

impl SearchSpec {
    /// Containment search (`contains`-style operators)
    pub fn parse(input: &str, combinator: Combinator) -> Self {
        Self {
            terms: split_terms(input),
            combinator,
            min_distance: 1,
            max_distance: 1,
        }
    }

    /// Proximity search: terms in order, within the given word distances
    pub fn near(input: &str, min_distance: usize, max_distance: usize) -> Self {
        Self {
            terms: split_terms(input),
            combinator: Combinator::All,
            min_distance,
            max_distance,
        }
    }

    /// Exact phrase: strict adjacency
    pub fn phrase(input: &str) -> Self {
        Self {
            terms: split_terms(input),
            combinator: Combinator::All,
            min_distance: 0,
            max_distance: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// A single wildcard term drops the whole search into pattern mode
    pub fn has_wildcards(&self) -> bool {
        self.terms.iter().any(|t| t.has_wildcard)
    }

    /// Compile the per-term matchers for pattern mode.
    ///
    /// `None` when no term carries a wildcard (plain string compares are
    /// used instead). Built once per parse and passed by reference into
    /// the scanner; there is no shared pattern cache.
    pub fn compile_matchers(&self) -> Result<Option<Vec<Regex>>> {
        if !self.has_wildcards() {
            return Ok(None);
        }
        self.terms
            .iter()
            .map(|t| compile_term(&t.text))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

fn split_terms(input: &str) -> Vec<Term> {
    Tokenizer::with_wildcards(input)
        .map(|token| {
            let text = token.text.to_lowercase();
            let has_wildcard = contains_wildcards(&text);
            Term { text, has_wildcard }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_terms() {
        let spec = SearchSpec::parse("Cat dog", Combinator::All);
        assert_eq!(spec.terms.len(), 2);
        assert_eq!(spec.terms[0].text, "cat");
        assert!(!spec.terms[0].has_wildcard);
        assert!(!spec.has_wildcards());
        assert_eq!((spec.min_distance, spec.max_distance), (1, 1));
    }

    #[test]
    fn test_parse_wildcard_term_survives() {
        let spec = SearchSpec::parse("c?t* dog", Combinator::Any);
        assert_eq!(spec.terms[0].text, "c?t*");
        assert!(spec.terms[0].has_wildcard);
        assert!(spec.has_wildcards());
    }

    #[test]
    fn test_phrase_distances() {
        let spec = SearchSpec::phrase("a b");
        assert_eq!((spec.min_distance, spec.max_distance), (0, 0));
    }

    #[test]
    fn test_empty_input() {
        assert!(SearchSpec::parse("  ,. ", Combinator::All).is_empty());
    }

    #[test]
    fn test_compile_matchers_only_in_pattern_mode() {
        assert!(SearchSpec::parse("cat", Combinator::All)
            .compile_matchers()
            .unwrap()
            .is_none());

        let matchers = SearchSpec::parse("c?t dog", Combinator::All)
            .compile_matchers()
            .unwrap()
            .unwrap();
        assert_eq!(matchers.len(), 2);
        assert!(matchers[0].is_match("cat"));
        assert!(matchers[1].is_match("DOG"));
        assert!(!matchers[1].is_match("dogs"));
    }

    #[test]
    fn test_compile_matchers_bad_glob_is_error() {
        let spec = SearchSpec::parse("[cat dog", Combinator::All);
        assert!(spec.has_wildcards());
        assert!(spec.compile_matchers().is_err());
    }
}
