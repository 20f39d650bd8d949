// src/core/parser.rs

//! # Expression Parser
//!
//! Turns token sequences into [`Expression`] trees. Two grammars share the same
//! building blocks:
//!
//! - **Conditions** ([`parse`]): binary operators resolved by precedence
//!   climbing (`!` > relational > equality > `AND` > `OR`), `'...'` quoted
//!   concatenations, `$(..)`, `@(..)`, `%(..)`, `Fn(..)` calls and top-level
//!   `;` item lists.
//! - **Values** ([`parse_value`]): the whole text is a template, as if it were
//!   quoted, split into an item list on top-level `;`. Quote characters are
//!   plain text here.

use crate::core::{
    ast::{BinaryOperator, Expression, Function},
    tokenizer::{Token, TokenKind, TokenizeError, tokenize},
};
use thiserror::Error;

/// Represents errors that can occur while parsing an expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error("Unterminated quoted string starting at token {position}.")]
    UnterminatedQuote { position: usize },
    #[error("Expected {expected} at token {position}, found '{found}'.")]
    Expected {
        expected: &'static str,
        found: String,
        position: usize,
    },
    #[error("Unexpected end of expression: expected {expected}.")]
    UnexpectedEnd { expected: &'static str },
    #[error("Unexpected token '{token}' at position {position}.")]
    UnexpectedToken { token: String, position: usize },
}

type ParseResult<T> = Result<T, ParseError>;

// --- PUBLIC PARSER API ---

/// Parses condition text (tokenizer + parser).
pub fn parse(text: &str) -> ParseResult<Expression> {
    parse_tokens(tokenize(text)?)
}

/// Parses an already tokenized condition.
pub fn parse_tokens(tokens: Vec<Token>) -> ParseResult<Expression> {
    let mut parser = Parser::new(tokens);
    if parser.at_end_skipping_whitespace() {
        return Ok(Expression::StringLiteral(String::new()));
    }
    let expression = parser.parse_list()?;
    parser.expect_end()?;
    Ok(expression)
}

/// Parses value text: property values, item includes, task parameters.
pub fn parse_value(text: &str) -> ParseResult<Expression> {
    let mut parser = Parser::new(tokenize(text)?);
    let mut segments = vec![Vec::new()];
    loop {
        let parts = parser.parse_template(TemplateMode::Value)?;
        if let Some(current) = segments.last_mut() {
            current.extend(parts);
        }
        match parser.peek_raw() {
            Some(token) if token.is(TokenKind::ItemListSeparator) => {
                parser.advance();
                segments.push(Vec::new());
            }
            _ => break,
        }
    }
    parser.expect_end()?;

    if segments.len() == 1 {
        Ok(Expression::Concat(segments.pop().unwrap_or_default()))
    } else {
        Ok(Expression::ItemList(
            segments.into_iter().map(Expression::Concat).collect(),
        ))
    }
}

// --- HELPER IMPLEMENTATIONS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemplateMode {
    /// Inside `'...'`: stops at the closing quote, `;` is text.
    Quoted,
    /// A bare value: stops at end of input or a top-level `;`.
    Value,
}

#[derive(Debug)]
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek_raw(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn skip_whitespace(&mut self) {
        while self
            .peek_raw()
            .is_some_and(|t| t.is(TokenKind::Whitespace))
        {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.skip_whitespace();
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end_skipping_whitespace(&mut self) -> bool {
        self.peek().is_none()
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> ParseResult<Token> {
        let position = self.pos;
        match self.peek().cloned() {
            Some(token) if token.is(kind) => {
                self.pos += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::Expected {
                expected,
                found: token.value,
                position,
            }),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }

    fn expect_end(&mut self) -> ParseResult<()> {
        let position = self.pos;
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ParseError::UnexpectedToken {
                token: token.value.clone(),
                position,
            }),
        }
    }

    // --- Condition grammar ---

    fn parse_list(&mut self) -> ParseResult<Expression> {
        let mut elements = vec![self.parse_binary(1)?];
        while self
            .peek()
            .is_some_and(|t| t.is(TokenKind::ItemListSeparator))
        {
            self.advance();
            elements.push(self.parse_binary(1)?);
        }
        if elements.len() == 1 {
            Ok(elements.pop().unwrap_or_else(|| Expression::string("")))
        } else {
            Ok(Expression::ItemList(elements))
        }
    }

    fn peek_binary_operator(&mut self) -> Option<BinaryOperator> {
        let kind = self.peek()?.kind;
        match kind {
            TokenKind::Equals => Some(BinaryOperator::Equals),
            TokenKind::NotEquals => Some(BinaryOperator::NotEquals),
            TokenKind::LessThan => Some(BinaryOperator::LessThan),
            TokenKind::LessThanOrEquals => Some(BinaryOperator::LessThanOrEquals),
            TokenKind::GreaterThan => Some(BinaryOperator::GreaterThan),
            TokenKind::GreaterThanOrEquals => Some(BinaryOperator::GreaterThanOrEquals),
            TokenKind::And => Some(BinaryOperator::And),
            TokenKind::Or => Some(BinaryOperator::Or),
            _ => None,
        }
    }

    /// Precedence climbing: an operator weaker than `min_precedence` ends the
    /// current sub-expression and is left for an outer call to reduce.
    fn parse_binary(&mut self, min_precedence: u8) -> ParseResult<Expression> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.peek_binary_operator() {
            if op.precedence() < min_precedence {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(op.precedence() + 1)?;
            lhs = Expression::binary(lhs, op, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        if self.peek().is_some_and(|t| t.is(TokenKind::Not)) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::not(operand));
        }
        self.parse_adjacent_primaries()
    }

    /// Primaries written back to back without whitespace (`$(Dir)file.txt`)
    /// form a single concatenation.
    fn parse_adjacent_primaries(&mut self) -> ParseResult<Expression> {
        let first = self.parse_primary()?;
        let mut parts = vec![first];
        while self.peek_raw().is_some_and(|t| {
            matches!(
                t.kind,
                TokenKind::Literal | TokenKind::Dollar | TokenKind::At | TokenKind::Percent
            )
        }) {
            parts.push(self.parse_primary()?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().unwrap_or_else(|| Expression::string("")))
        } else {
            Ok(Expression::Concat(parts))
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let position = self.pos;
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => {
                return Err(ParseError::UnexpectedEnd {
                    expected: "an operand",
                });
            }
        };

        match token.kind {
            TokenKind::OpenBracket => {
                self.advance();
                let inner = self.parse_binary(1)?;
                self.expect(TokenKind::CloseBracket, "')'")?;
                Ok(inner)
            }
            TokenKind::Quotation => {
                self.advance();
                let parts = self.parse_template(TemplateMode::Quoted)?;
                if self.advance().is_none() {
                    return Err(ParseError::UnterminatedQuote { position });
                }
                Ok(Expression::Concat(parts))
            }
            TokenKind::Dollar => self.parse_reference(),
            TokenKind::At => self.parse_item_reference(),
            TokenKind::Percent => self.parse_reference(),
            TokenKind::Literal => {
                self.advance();
                let function = Function::from_name(&token.value);
                match function {
                    Some(function)
                        if self
                            .peek_raw()
                            .is_some_and(|t| t.is(TokenKind::OpenBracket)) =>
                    {
                        self.parse_function_call(function)
                    }
                    _ => Ok(Expression::Literal(token.value)),
                }
            }
            _ => Err(ParseError::UnexpectedToken {
                token: token.value,
                position,
            }),
        }
    }

    fn parse_function_call(&mut self, function: Function) -> ParseResult<Expression> {
        self.expect(TokenKind::OpenBracket, "'(' after function name")?;
        let argument = self.parse_binary(1)?;
        self.expect(TokenKind::CloseBracket, "')' closing the function call")?;
        Ok(Expression::call(function, argument))
    }

    fn parse_name(&mut self) -> ParseResult<String> {
        let position = self.pos;
        match self.peek().cloned() {
            Some(token)
                if matches!(
                    token.kind,
                    TokenKind::Literal | TokenKind::And | TokenKind::Or
                ) =>
            {
                self.pos += 1;
                Ok(token.value)
            }
            Some(token) => Err(ParseError::Expected {
                expected: "a name",
                found: token.value,
                position,
            }),
            None => Err(ParseError::UnexpectedEnd { expected: "a name" }),
        }
    }

    /// `$(Name)` or `%(Name)`, starting at the sigil.
    fn parse_reference(&mut self) -> ParseResult<Expression> {
        let sigil = self.advance().map(|t| t.kind);
        self.expect_adjacent_open_bracket()?;
        let name = self.parse_name()?;
        self.expect(TokenKind::CloseBracket, "')' closing the reference")?;
        match sigil {
            Some(TokenKind::Percent) => Ok(Expression::MetadataReference(name)),
            _ => Ok(Expression::PropertyReference(name)),
        }
    }

    /// `@(Name)` or `@(Name -> 'projection')`, starting at `@`.
    fn parse_item_reference(&mut self) -> ParseResult<Expression> {
        self.advance();
        self.expect_adjacent_open_bracket()?;
        let name = self.parse_name()?;

        if self.peek().is_some_and(|t| t.is(TokenKind::Arrow)) {
            self.advance();
            let quote_position = self.pos;
            self.expect(TokenKind::Quotation, "a quoted projection after '->'")?;
            let projection = self.parse_template(TemplateMode::Quoted)?;
            if self.advance().is_none() {
                return Err(ParseError::UnterminatedQuote {
                    position: quote_position,
                });
            }
            self.expect(TokenKind::CloseBracket, "')' closing the item projection")?;
            return Ok(Expression::ItemListProjection { name, projection });
        }

        self.expect(TokenKind::CloseBracket, "')' closing the item reference")?;
        Ok(Expression::ItemListReference(name))
    }

    fn expect_adjacent_open_bracket(&mut self) -> ParseResult<()> {
        let position = self.pos;
        match self.peek_raw().cloned() {
            Some(token) if token.is(TokenKind::OpenBracket) => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(ParseError::Expected {
                expected: "'(' after '$', '@' or '%'",
                found: token.value,
                position,
            }),
            None => Err(ParseError::UnexpectedEnd {
                expected: "'(' after '$', '@' or '%'",
            }),
        }
    }

    // --- Template sub-grammar (quoted regions and bare values) ---

    /// Collects parts until the closing quote (left unconsumed) or, in value
    /// mode, until end of input or a top-level `;` (also left unconsumed).
    fn parse_template(&mut self, mode: TemplateMode) -> ParseResult<Vec<Expression>> {
        let mut parts: Vec<Expression> = Vec::new();
        let mut text = String::new();

        let flush = |parts: &mut Vec<Expression>, text: &mut String| {
            if !text.is_empty() {
                parts.push(Expression::StringLiteral(std::mem::take(text)));
            }
        };

        loop {
            let Some(token) = self.peek_raw().cloned() else {
                break;
            };
            let next_is_bracket = self
                .tokens
                .get(self.pos + 1)
                .is_some_and(|t| t.is(TokenKind::OpenBracket));

            match token.kind {
                TokenKind::Quotation if mode == TemplateMode::Quoted => break,
                TokenKind::ItemListSeparator if mode == TemplateMode::Value => break,
                TokenKind::Dollar | TokenKind::Percent if next_is_bracket => {
                    flush(&mut parts, &mut text);
                    parts.push(self.parse_reference()?);
                }
                TokenKind::At if next_is_bracket => {
                    flush(&mut parts, &mut text);
                    parts.push(self.parse_item_reference()?);
                }
                _ => {
                    text.push_str(&token.value);
                    self.pos += 1;
                }
            }
        }

        flush(&mut parts, &mut text);
        Ok(parts)
    }
}
