// src/core/ast.rs

//! Immutable expression tree for the condition/value language.
//!
//! Nodes compare structurally (`PartialEq`), so the parser and the optimizer can
//! be tested by comparing whole trees. [`optimize`] flattens nested
//! concatenations and item lists and folds adjacent literals; it is idempotent
//! and never changes what an expression evaluates to.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    And,
    Or,
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter. `Not` (unary) sits above all of these.
    pub fn precedence(self) -> u8 {
        match self {
            Self::LessThan | Self::LessThanOrEquals | Self::GreaterThan | Self::GreaterThanOrEquals => 4,
            Self::Equals | Self::NotEquals => 3,
            Self::And => 2,
            Self::Or => 1,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEquals => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEquals => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Built-in functions callable as `Name(argument)`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Exists,
    HasTrailingSlash,
}

impl Function {
    /// Case-insensitive lookup of a function name.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("Exists") {
            Some(Self::Exists)
        } else if name.eq_ignore_ascii_case("HasTrailingSlash") {
            Some(Self::HasTrailingSlash)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Exists => "Exists",
            Self::HasTrailingSlash => "HasTrailingSlash",
        }
    }
}

/// A node of the expression tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    /// Unquoted text.
    Literal(String),
    /// Text that appeared inside `'...'`.
    StringLiteral(String),
    /// `$(Name)`
    PropertyReference(String),
    /// `%(Name)`
    MetadataReference(String),
    /// `@(Name)`
    ItemListReference(String),
    /// `@(Name -> 'projection')`; `projection` is evaluated once per item.
    ItemListProjection {
        name: String,
        projection: Vec<Expression>,
    },
    /// Parts joined into one string.
    Concat(Vec<Expression>),
    /// `a;b;c`
    ItemList(Vec<Expression>),
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        lhs: Box<Expression>,
        op: BinaryOperator,
        rhs: Box<Expression>,
    },
    Function {
        function: Function,
        argument: Box<Expression>,
    },
}

impl Expression {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::StringLiteral(value.into())
    }

    pub fn property(name: impl Into<String>) -> Self {
        Self::PropertyReference(name.into())
    }

    pub fn metadata(name: impl Into<String>) -> Self {
        Self::MetadataReference(name.into())
    }

    pub fn items(name: impl Into<String>) -> Self {
        Self::ItemListReference(name.into())
    }

    pub fn binary(lhs: Self, op: BinaryOperator, rhs: Self) -> Self {
        Self::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    pub fn not(operand: Self) -> Self {
        Self::Unary {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        }
    }

    pub fn call(function: Function, argument: Self) -> Self {
        Self::Function {
            function,
            argument: Box::new(argument),
        }
    }

    /// True for nodes that can yield more than one item when materialized.
    pub fn is_item_producing(&self) -> bool {
        matches!(
            self,
            Self::ItemListReference(_) | Self::ItemListProjection { .. } | Self::ItemList(_)
        )
    }
}

fn write_quoted_parts(f: &mut fmt::Formatter<'_>, parts: &[Expression]) -> fmt::Result {
    for part in parts {
        match part {
            Expression::StringLiteral(s) | Expression::Literal(s) => f.write_str(s)?,
            other => write!(f, "{}", other)?,
        }
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => f.write_str(s),
            Self::StringLiteral(s) => write!(f, "'{}'", s),
            Self::PropertyReference(name) => write!(f, "$({})", name),
            Self::MetadataReference(name) => write!(f, "%({})", name),
            Self::ItemListReference(name) => write!(f, "@({})", name),
            Self::ItemListProjection { name, projection } => {
                write!(f, "@({} -> '", name)?;
                write_quoted_parts(f, projection)?;
                f.write_str("')")
            }
            Self::Concat(parts) => {
                f.write_str("'")?;
                write_quoted_parts(f, parts)?;
                f.write_str("'")
            }
            Self::ItemList(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                f.write_str(&rendered.join(";"))
            }
            Self::Unary { operand, .. } => write!(f, "!{}", operand),
            Self::Binary { lhs, op, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Self::Function { function, argument } => {
                write!(f, "{}({})", function.name(), argument)
            }
        }
    }
}

// --- Optimizer ---

/// Flattens nested `Concat`/`ItemList` nodes and folds adjacent literals.
pub fn optimize(expression: &Expression) -> Expression {
    match expression {
        Expression::Concat(parts) => {
            let mut flat = Vec::with_capacity(parts.len());
            for part in parts {
                match optimize(part) {
                    Expression::Concat(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            let mut folded = fold_literals(flat);
            let collapse = matches!(
                folded.as_slice(),
                [Expression::StringLiteral(_) | Expression::PropertyReference(_)]
            );
            if folded.is_empty() {
                Expression::StringLiteral(String::new())
            } else if collapse {
                folded.swap_remove(0)
            } else {
                Expression::Concat(folded)
            }
        }
        Expression::ItemList(parts) => {
            let mut flat = Vec::with_capacity(parts.len());
            for part in parts {
                match optimize(part) {
                    // An empty list still occupies a slot between separators.
                    Expression::ItemList(inner) if inner.is_empty() => {
                        flat.push(Expression::StringLiteral(String::new()));
                    }
                    Expression::ItemList(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            Expression::ItemList(flat)
        }
        Expression::ItemListProjection { name, projection } => {
            let mut flat = Vec::with_capacity(projection.len());
            for part in projection {
                match optimize(part) {
                    Expression::Concat(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            Expression::ItemListProjection {
                name: name.clone(),
                projection: fold_literals(flat),
            }
        }
        Expression::Unary { op, operand } => Expression::Unary {
            op: *op,
            operand: Box::new(optimize(operand)),
        },
        Expression::Binary { lhs, op, rhs } => Expression::Binary {
            lhs: Box::new(optimize(lhs)),
            op: *op,
            rhs: Box::new(optimize(rhs)),
        },
        Expression::Function { function, argument } => Expression::Function {
            function: *function,
            argument: Box::new(optimize(argument)),
        },
        leaf => leaf.clone(),
    }
}

/// Merges runs of adjacent `Literal`/`StringLiteral` parts into one `StringLiteral`.
fn fold_literals(parts: Vec<Expression>) -> Vec<Expression> {
    let mut folded: Vec<Expression> = Vec::with_capacity(parts.len());
    for part in parts {
        let text = match &part {
            Expression::Literal(s) | Expression::StringLiteral(s) => Some(s.clone()),
            _ => None,
        };
        match (text, folded.last_mut()) {
            (Some(s), Some(Expression::StringLiteral(last))) => last.push_str(&s),
            (Some(s), _) => folded.push(Expression::StringLiteral(s)),
            (None, _) => folded.push(part),
        }
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Expression {
        Expression::Concat(vec![
            Expression::literal("bin"),
            Expression::Concat(vec![
                Expression::string("/"),
                Expression::property("Configuration"),
                Expression::Concat(vec![Expression::string("/"), Expression::literal("x")]),
            ]),
        ])
    }

    #[test]
    fn test_optimize_flattens_and_folds() {
        let optimized = optimize(&nested());
        assert_eq!(
            optimized,
            Expression::Concat(vec![
                Expression::string("bin/"),
                Expression::property("Configuration"),
                Expression::string("/x"),
            ])
        );
    }

    #[test]
    fn test_optimize_is_idempotent() {
        let once = optimize(&nested());
        assert_eq!(optimize(&once), once);

        let list = Expression::ItemList(vec![
            Expression::literal("a"),
            Expression::ItemList(vec![Expression::literal("b"), Expression::items("C")]),
        ]);
        let once = optimize(&list);
        assert_eq!(
            once,
            Expression::ItemList(vec![
                Expression::literal("a"),
                Expression::literal("b"),
                Expression::items("C"),
            ])
        );
        assert_eq!(optimize(&once), once);
    }

    #[test]
    fn test_optimize_collapses_trivial_concat() {
        let single = Expression::Concat(vec![Expression::literal("a"), Expression::string("b")]);
        assert_eq!(optimize(&single), Expression::string("ab"));
        assert_eq!(optimize(&Expression::Concat(vec![])), Expression::string(""));
        // Item-producing parts are kept inside the concat.
        let items = Expression::Concat(vec![Expression::items("Compile")]);
        assert_eq!(optimize(&items), items);
    }

    #[test]
    fn test_display_round_trips_readably() {
        let expr = Expression::binary(
            Expression::Concat(vec![Expression::property("A"), Expression::string("|x")]),
            BinaryOperator::Equals,
            Expression::string("1|x"),
        );
        assert_eq!(expr.to_string(), "('$(A)|x' == '1|x')");
    }
}
