/// A word token with its char offsets into the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// Char offset of the first char
    pub start: usize,
    /// Char offset one past the last char
    pub end: usize,
}

impl Token<'_> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Word-level tokenizer over a node's text value.
///
/// Tokens are maximal alphanumeric runs; everything else is a separator.
/// Offsets are char offsets so they can be mapped back into the text for
/// highlighting. The tokenizer is an iterator and a fresh instance is
/// created per text, so scanning is restartable by construction.
pub struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    text: &'a str,
    char_pos: usize,
    /// Treat glob metacharacters as token characters (search-term parsing)
    wildcards: bool,
    in_class: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().peekable(),
            text,
            char_pos: 0,
            wildcards: false,
            in_class: false,
        }
    }

    /// Tokenizer for search strings: `*`, `?`, `[`, `]` and `\` stay part
    /// of the token so a glob term survives as one term.
    pub fn with_wildcards(text: &'a str) -> Self {
        let mut t = Self::new(text);
        t.wildcards = true;
        t
    }

    fn is_token_char(&mut self, ch: char) -> bool {
        if ch.is_alphanumeric() {
            return true;
        }
        if !self.wildcards {
            return false;
        }
        if self.in_class {
            // everything up to the closing bracket belongs to the class
            if ch == ']' {
                self.in_class = false;
            }
            return true;
        }
        match ch {
            '[' => {
                self.in_class = true;
                true
            }
            '*' | '?' | ']' | '\\' => true,
            _ => false,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        // Skip separators
        while let Some(&(_, ch)) = self.chars.peek() {
            if self.is_token_char(ch) {
                break;
            }
            self.chars.next();
            self.char_pos += 1;
        }

        let &(byte_start, _) = self.chars.peek()?;
        let char_start = self.char_pos;
        let mut byte_end = byte_start;

        while let Some(&(idx, ch)) = self.chars.peek() {
            if !self.is_token_char(ch) {
                break;
            }
            byte_end = idx + ch.len_utf8();
            self.chars.next();
            self.char_pos += 1;
        }

        Some(Token {
            text: &self.text[byte_start..byte_end],
            start: char_start,
            end: self.char_pos,
        })
    }
}
