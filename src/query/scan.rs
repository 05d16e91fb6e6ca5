//! Token-level scanners.
//!
//! These run over the full text value of a single node, both as the
//! refinement stage after an index preselection and as the matching core
//! of the generic fallback. Proximity and phrase share one automaton;
//! a phrase is a proximity search with both distances pinned to zero.

use crate::dom::{MatchMap, NodeProxy};
use crate::query::spec::SearchSpec;
use crate::text::Tokenizer;
use regex::Regex;

fn term_matches(spec: &SearchSpec, matchers: Option<&[Regex]>, idx: usize, token: &str) -> bool {
    match matchers {
        Some(m) => m[idx].is_match(token),
        None => spec.terms[idx].text == token,
    }
}

/// Containment: every term (or any, per the combinator) occurs somewhere
/// in the text. Order and distance are ignored.
pub fn scan_contains(spec: &SearchSpec, matchers: Option<&[Regex]>, text: &str) -> bool {
    if spec.is_empty() {
        return false;
    }
    let mut seen = vec![false; spec.terms.len()];
    for token in Tokenizer::new(text) {
        let token = token.text.to_lowercase();
        for (i, hit) in seen.iter_mut().enumerate() {
            if !*hit && term_matches(spec, matchers, i, &token) {
                *hit = true;
                if matches!(spec.combinator, crate::query::spec::Combinator::Any) {
                    return true;
                }
            }
        }
        if seen.iter().all(|h| *h) {
            return true;
        }
    }
    false
}

/// Proximity: terms occur in order, each within the configured word
/// distance of its predecessor.
///
/// The automaton tracks the next expected term and the count of words
/// since the last accepted one. Overshooting the maximum resets it; a
/// repeat of the leading term restarts the window there, so a failed
/// partial match never hides a later complete one.
pub fn scan_near(spec: &SearchSpec, matchers: Option<&[Regex]>, text: &str) -> bool {
    if spec.is_empty() {
        return false;
    }
    let min = spec.min_distance as i64;
    let max = spec.max_distance as i64;
    let mut next = 0usize;
    let mut distance: i64 = -1;
    for token in Tokenizer::new(text) {
        let token = token.text.to_lowercase();
        if distance > max {
            next = 0;
            distance = -1;
        }
        if term_matches(spec, matchers, next, &token) {
            let within = distance < 0 || distance >= min;
            distance = 0;
            next += 1;
            if next == spec.terms.len() {
                if within {
                    return true;
                }
                next = 0;
                distance = -1;
            } else if !within {
                next = 0;
                distance = -1;
            }
        } else if next > 0 && term_matches(spec, matchers, 0, &token) {
            next = 1;
            distance = 0;
            if spec.terms.len() == 1 {
                return true;
            }
        } else if distance >= 0 {
            distance += 1;
        }
    }
    false
}

/// Exact phrase with occurrence recording.
///
/// Besides the boolean verdict, each non-overlapping occurrence is
/// recorded into `matches` with its character offsets in `text`, so a
/// caller can highlight the matched slice later.
pub fn scan_phrase(
    spec: &SearchSpec,
    matchers: Option<&[Regex]>,
    node: NodeProxy,
    text: &str,
    matches: &mut MatchMap,
) -> bool {
    if spec.is_empty() {
        return false;
    }
    let chars: Vec<char> = text.chars().collect();
    let mut found = false;
    let mut next = 0usize;
    let mut start = 0usize;
    for token in Tokenizer::new(text) {
        let lowered = token.text.to_lowercase();
        if term_matches(spec, matchers, next, &lowered) {
            if next == 0 {
                start = token.start;
            }
            next += 1;
            if next == spec.terms.len() {
                let literal: String = chars[start..token.end].iter().collect();
                matches.add(node.clone(), literal, start, token.end - start);
                found = true;
                next = 0;
            }
        } else if term_matches(spec, matchers, 0, &lowered) {
            start = token.start;
            next = 1;
            if spec.terms.len() == 1 {
                let literal: String = chars[start..token.end].iter().collect();
                matches.add(node.clone(), literal, start, token.end - start);
                found = true;
                next = 0;
            }
        } else {
            next = 0;
        }
    }
    found
}
