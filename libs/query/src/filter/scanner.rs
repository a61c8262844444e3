//! Character-level scanner for filter strings
//!
//! Splits a filter string into words and group delimiters. Quoting (`"`)
//! protects whitespace, parentheses and colons; `\` inside quotes escapes the
//! next character. Bracketed literal lists (`[a, b]`) keep their internal
//! whitespace. Parenthesis balance is checked here so that the combinator only
//! ever sees well-formed groups.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// Unquoted text of the word.
    pub text: String,
    /// Byte offset into `text` where the first quoted run begins.
    pub quoted_from: Option<usize>,
}

impl Word {
    /// Prefix of the text that was not inside quotes and may carry syntax.
    pub fn syntax(&self) -> &str {
        match self.quoted_from {
            Some(at) => &self.text[..at],
            None => &self.text,
        }
    }

    /// Whether quoting began at or after `offset`.
    pub fn quoted_since(&self, offset: usize) -> bool {
        self.quoted_from.is_some_and(|at| at >= offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Open,
    Close,
    Word(Word),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte index of the token's first character in the input.
    pub index: usize,
}

/// Scan a filter string into tokens.
pub fn scan(input: &str) -> Result<Vec<Token>> {
    Scanner::new(input).run()
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    tokens: Vec<Token>,
    buf: String,
    start: usize,
    quoted_from: Option<usize>,
    in_quotes: bool,
    escaped: bool,
    brackets: usize,
    groups: Vec<usize>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            tokens: Vec::new(),
            buf: String::new(),
            start: 0,
            quoted_from: None,
            in_quotes: false,
            escaped: false,
            brackets: 0,
            groups: Vec::new(),
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn push(&mut self, c: char, at: usize) {
        if self.buf.is_empty() && self.quoted_from.is_none() {
            self.start = at;
        }
        self.buf.push(c);
    }

    fn flush(&mut self) {
        if self.buf.is_empty() && self.quoted_from.is_none() {
            return;
        }
        self.tokens.push(Token {
            kind: TokenKind::Word(Word {
                text: std::mem::take(&mut self.buf),
                quoted_from: self.quoted_from.take(),
            }),
            index: self.start,
        });
    }

    fn run(mut self) -> Result<Vec<Token>> {
        loop {
            let at = self.pos;
            let Some(c) = self.consume_char() else { break };

            if self.in_quotes {
                if self.escaped {
                    self.escaped = false;
                    self.buf.push(c);
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_quotes = false;
                } else {
                    self.buf.push(c);
                }
                continue;
            }

            match c {
                '"' => {
                    if self.buf.is_empty() && self.quoted_from.is_none() {
                        self.start = at;
                    }
                    self.in_quotes = true;
                    self.quoted_from.get_or_insert(self.buf.len());
                }
                '[' => {
                    self.brackets += 1;
                    self.push(c, at);
                }
                ']' => {
                    self.brackets = self.brackets.saturating_sub(1);
                    self.push(c, at);
                }
                c if self.brackets > 0 => self.push(c, at),
                c if c.is_whitespace() => self.flush(),
                '(' => {
                    self.flush();
                    self.groups.push(at);
                    self.tokens.push(Token {
                        kind: TokenKind::Open,
                        index: at,
                    });
                }
                ')' => {
                    self.flush();
                    if self.groups.pop().is_none() {
                        return Err(Error::UnbalancedGroup { index: at });
                    }
                    self.tokens.push(Token {
                        kind: TokenKind::Close,
                        index: at,
                    });
                }
                c => self.push(c, at),
            }
        }

        // An unterminated quote keeps whatever was scanned.
        self.flush();
        if let Some(&index) = self.groups.first() {
            return Err(Error::UnbalancedGroup { index });
        }
        Ok(self.tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(input: &str) -> Vec<String> {
        scan(input)
            .unwrap()
            .into_iter()
            .filter_map(|t| match t.kind {
                TokenKind::Word(w) => Some(w.text),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn splits_on_whitespace_and_groups() {
        let tokens = scan("(a:1 or b:2) and c:3").unwrap();
        assert_eq!(tokens.len(), 7);
        assert_eq!(tokens[0].kind, TokenKind::Open);
        assert_eq!(tokens[4].kind, TokenKind::Close);
        assert_eq!(tokens[4].index, 11);
        assert_eq!(words("(a:1 or b:2) and c:3"), ["a:1", "or", "b:2", "and", "c:3"]);
    }

    #[test]
    fn quotes_protect_whitespace_and_escapes() {
        let tokens = scan(r#"name:"John \"JJ\" (Smith)" x:1"#).unwrap();
        match &tokens[0].kind {
            TokenKind::Word(w) => {
                assert_eq!(w.text, r#"name:John "JJ" (Smith)"#);
                assert_eq!(w.quoted_from, Some(5));
                assert_eq!(w.syntax(), "name:");
            }
            other => panic!("unexpected token {other:?}"),
        }
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn literal_lists_keep_spaces() {
        assert_eq!(words("id::in:[1, 2, 3] and x:y"), ["id::in:[1, 2, 3]", "and", "x:y"]);
    }

    #[test]
    fn unbalanced_groups_report_index() {
        assert!(matches!(
            scan("a:1 ) or b:2"),
            Err(Error::UnbalancedGroup { index: 4 })
        ));
        assert!(matches!(
            scan("x:1 (a:1 or b:2"),
            Err(Error::UnbalancedGroup { index: 4 })
        ));
        assert!(scan(r#"name:"(unbalanced""#).is_ok());
    }

    #[test]
    fn unterminated_quote_is_tolerated() {
        assert_eq!(words(r#"name:"open ended"#), ["name:open ended"]);
        assert_eq!(words(r#"name:"""#), ["name:"]);
    }
}
