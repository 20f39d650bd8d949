// src/core/tokenizer.rs

//! Lexer for the condition/value expression language.
//!
//! The tokenizer never looks further ahead than the longest fixed operator
//! (two characters). Whitespace runs and literal runs are coalesced into a
//! single token each; `AND`/`OR` are recognized only when a whole literal run
//! spells them (case-insensitively).

use std::fmt;
use thiserror::Error;

/// The closed set of token kinds produced by [`tokenize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Whitespace,
    OpenBracket,
    CloseBracket,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    And,
    Or,
    Not,
    Quotation,
    Dollar,
    At,
    Percent,
    ItemListSeparator,
    Arrow,
    Literal,
}

/// A single lexed token. `value` is the exact source text it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Raised when part of the input cannot be lexed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unrecognized input at offset {offset}: '{remainder}'")]
pub struct TokenizeError {
    pub offset: usize,
    pub remainder: String,
}

// Ordered longest-first so that `<=` wins over `<`, `->` wins over a literal `-`, etc.
const SPECIAL_TOKENS: &[(&str, TokenKind)] = &[
    ("==", TokenKind::Equals),
    ("!=", TokenKind::NotEquals),
    ("<=", TokenKind::LessThanOrEquals),
    (">=", TokenKind::GreaterThanOrEquals),
    ("->", TokenKind::Arrow),
    ("<", TokenKind::LessThan),
    (">", TokenKind::GreaterThan),
    ("!", TokenKind::Not),
    ("(", TokenKind::OpenBracket),
    (")", TokenKind::CloseBracket),
    ("'", TokenKind::Quotation),
    ("$", TokenKind::Dollar),
    ("@", TokenKind::At),
    ("%", TokenKind::Percent),
    (";", TokenKind::ItemListSeparator),
];

fn match_special(rest: &str) -> Option<(&'static str, TokenKind)> {
    SPECIAL_TOKENS
        .iter()
        .find(|(text, _)| rest.starts_with(text))
        .copied()
}

fn keyword_kind(literal: &str) -> Option<TokenKind> {
    if literal.eq_ignore_ascii_case("and") {
        Some(TokenKind::And)
    } else if literal.eq_ignore_ascii_case("or") {
        Some(TokenKind::Or)
    } else {
        None
    }
}

/// Lexes `text` into a flat token sequence. Empty input yields an empty sequence.
pub fn tokenize(text: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokens = Vec::with_capacity(text.len() / 3 + 1);
    let mut offset = 0;

    while offset < text.len() {
        let rest = text.get(offset..).unwrap_or_default();

        // 1. Whitespace run.
        let ws_len: usize = rest
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(char::len_utf8)
            .sum();
        if ws_len > 0 {
            tokens.push(Token::new(
                TokenKind::Whitespace,
                rest.get(..ws_len).unwrap_or_default(),
            ));
            offset += ws_len;
            continue;
        }

        // 2. Fixed special token, longest match first.
        if let Some((symbol, kind)) = match_special(rest) {
            tokens.push(Token::new(kind, symbol));
            offset += symbol.len();
            continue;
        }

        // 3. Literal run up to the next whitespace or special token.
        let mut literal_len = 0;
        for (i, c) in rest.char_indices() {
            let tail = rest.get(i..).unwrap_or_default();
            if c.is_whitespace() || match_special(tail).is_some() {
                break;
            }
            literal_len = i + c.len_utf8();
        }
        if literal_len == 0 {
            return Err(TokenizeError {
                offset,
                remainder: rest.to_string(),
            });
        }

        let literal = rest.get(..literal_len).unwrap_or_default();
        let kind = keyword_kind(literal).unwrap_or(TokenKind::Literal);
        tokens.push(Token::new(kind, literal));
        offset += literal_len;
    }

    log::trace!("Tokenized '{}' into {} tokens.", text, tokens.len());
    Ok(tokens)
}
