use anyhow::{bail, Result};
use regex::Regex;

/// True if the term contains glob metacharacters and needs pattern matching
pub fn contains_wildcards(term: &str) -> bool {
    term.chars()
        .any(|ch| matches!(ch, '*' | '?' | '\\' | '[' | ']'))
}

/// Lowercased literal prefix of a glob term, up to the first
/// metacharacter.
///
/// A non-empty prefix lets the index bound its dictionary scan to the
/// range sharing it; a term opening with a metacharacter has none and
/// the lookup degrades to a full dictionary scan.
pub fn literal_prefix(term: &str) -> String {
    term.chars()
        .take_while(|ch| !matches!(ch, '*' | '?' | '\\' | '[' | ']'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Translate a glob-style search term into a regex pattern.
///
/// `*` becomes `.*`, `?` becomes `.`, bracket classes pass through,
/// `\` escapes the following character, and every other regex
/// metacharacter is escaped. The result is unanchored; callers anchor it
/// when a whole-token match is wanted.
pub fn glob_to_regex(term: &str) -> Result<String> {
    let mut pattern = String::with_capacity(term.len() + 8);
    let mut chars = term.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => {
                    pattern.push('\\');
                    pattern.push(escaped);
                }
                None => bail!("invalid glob pattern '{}': trailing backslash", term),
            },
            '[' => {
                pattern.push('[');
                if chars.peek() == Some(&'^') || chars.peek() == Some(&'!') {
                    chars.next();
                    pattern.push('^');
                }
                let mut closed = false;
                for class_ch in chars.by_ref() {
                    match class_ch {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' => pattern.push_str("\\\\"),
                        c => pattern.push(c),
                    }
                }
                if !closed {
                    bail!("invalid glob pattern '{}': unterminated character class", term);
                }
                pattern.push(']');
            }
            ']' => bail!("invalid glob pattern '{}': unmatched ']'", term),
            // Escape regex metacharacters that are literal in a glob
            '.' | '+' | '(' | ')' | '{' | '}' | '|' | '^' | '$' => {
                pattern.push('\\');
                pattern.push(ch);
            }
            c => pattern.push(c),
        }
    }

    Ok(pattern)
}

/// Compile a glob term into a whole-token, case-insensitive matcher
pub fn compile_term(term: &str) -> Result<Regex> {
    let pattern = if contains_wildcards(term) {
        glob_to_regex(term)?
    } else {
        regex::escape(term)
    };
    Regex::new(&format!("(?i)^(?:{})$", pattern))
        .map_err(|e| anyhow::anyhow!("invalid glob pattern '{}': {}", term, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_wildcards() {
        assert!(contains_wildcards("c?t"));
        assert!(contains_wildcards("cat*"));
        assert!(contains_wildcards("[cd]at"));
        assert!(!contains_wildcards("cat"));
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("Ca*"), "ca");
        assert_eq!(literal_prefix("c?t"), "c");
        assert_eq!(literal_prefix("*at"), "");
        assert_eq!(literal_prefix("[cd]at"), "");
    }

    #[test]
    fn test_translation() {
        assert_eq!(glob_to_regex("c?t*").unwrap(), "c.t.*");
        assert_eq!(glob_to_regex("a.b").unwrap(), "a\\.b");
        assert_eq!(glob_to_regex("[cd]at").unwrap(), "[cd]at");
        assert_eq!(glob_to_regex("[!cd]at").unwrap(), "[^cd]at");
    }

    #[test]
    fn test_bad_patterns() {
        assert!(glob_to_regex("cat\\").is_err());
        assert!(glob_to_regex("[cat").is_err());
        assert!(glob_to_regex("ca]t").is_err());
    }

    #[test]
    fn test_compile_term_round_trip() {
        let re = compile_term("c?t*").unwrap();
        assert!(re.is_match("cat"));
        assert!(re.is_match("cats"));
        assert!(re.is_match("cot"));
        assert!(!re.is_match("dog"));
        // whole-token: no partial hit inside a longer word
        assert!(!re.is_match("scatter"));
    }

    #[test]
    fn test_compile_plain_term_is_exact() {
        let re = compile_term("cat").unwrap();
        assert!(re.is_match("CAT"));
        assert!(!re.is_match("cats"));
    }
}
