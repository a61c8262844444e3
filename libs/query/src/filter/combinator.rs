//! Left-to-right logical combination of filter terms
//!
//! There is no precedence beyond grouping: `a or b and c` is `(a or b) and c`.
//! `not` negates the term that follows it, and two terms with no operator
//! between them are joined with `and`.

use super::scanner::{Token, TokenKind, Word};
use super::Predicate;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogicalOp {
    And,
    Or,
}

fn logical_word(word: &Word) -> Option<&'static str> {
    if word.quoted_from.is_some() {
        return None;
    }
    match word.text.to_ascii_lowercase().as_str() {
        "and" => Some("and"),
        "or" => Some("or"),
        "not" => Some("not"),
        _ => None,
    }
}

/// Combine scanned tokens into one predicate tree. `compile` turns a single
/// word into a leaf.
pub(crate) fn combine<F>(tokens: &[Token], mut compile: F) -> Result<Option<Predicate>>
where
    F: FnMut(&Word) -> Result<Predicate>,
{
    let mut cursor = Combinator {
        tokens,
        pos: 0,
        compile: &mut compile,
    };
    let tree = cursor.group()?;
    if let Some(token) = tokens.get(cursor.pos) {
        return Err(Error::UnbalancedGroup { index: token.index });
    }
    Ok(tree)
}

struct Combinator<'t, 'f, F> {
    tokens: &'t [Token],
    pos: usize,
    compile: &'f mut F,
}

impl<F> Combinator<'_, '_, F>
where
    F: FnMut(&Word) -> Result<Predicate>,
{
    /// Parse until the matching `)` or the end of input.
    fn group(&mut self) -> Result<Option<Predicate>> {
        let mut acc: Option<Predicate> = None;
        let mut pending: Option<(LogicalOp, usize)> = None;
        let mut negate_next: Option<usize> = None;
        let tokens = self.tokens;

        while let Some(token) = tokens.get(self.pos) {
            let term = match &token.kind {
                TokenKind::Close => break,
                TokenKind::Open => {
                    self.pos += 1;
                    let inner = self.group()?;
                    match tokens.get(self.pos) {
                        Some(Token {
                            kind: TokenKind::Close,
                            ..
                        }) => self.pos += 1,
                        _ => return Err(Error::UnbalancedGroup { index: token.index }),
                    }
                    match inner {
                        Some(tree) => tree,
                        None => continue,
                    }
                }
                TokenKind::Word(word) => {
                    self.pos += 1;
                    match logical_word(word) {
                        Some("not") => {
                            negate_next = match negate_next {
                                Some(_) => None,
                                None => Some(token.index),
                            };
                            continue;
                        }
                        Some(op) => {
                            if acc.is_none() || pending.is_some() || negate_next.is_some() {
                                return Err(Error::UnknownOperator(format!(
                                    "dangling '{op}' at index {}",
                                    token.index
                                )));
                            }
                            let op = if op == "or" { LogicalOp::Or } else { LogicalOp::And };
                            pending = Some((op, token.index));
                            continue;
                        }
                        None => (self.compile)(word)?,
                    }
                }
            };

            let term = match negate_next.take() {
                Some(_) => Predicate::Not(Box::new(term)),
                None => term,
            };
            acc = Some(match (acc, pending.take()) {
                (None, _) => term,
                (Some(left), Some((LogicalOp::Or, _))) => {
                    Predicate::Or(Box::new(left), Box::new(term))
                }
                // No operator between two terms conjoins them; the earlier
                // term is never discarded.
                (Some(left), _) => Predicate::And(Box::new(left), Box::new(term)),
            });
        }

        if let Some((_, index)) = pending {
            return Err(Error::UnknownOperator(format!(
                "dangling operator at index {index}"
            )));
        }
        if let Some(index) = negate_next {
            return Err(Error::UnknownOperator(format!(
                "dangling 'not' at index {index}"
            )));
        }
        Ok(acc)
    }
}
