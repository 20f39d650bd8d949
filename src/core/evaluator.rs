// src/core/evaluator.rs

//! # Expression Evaluator
//!
//! Walks an [`Expression`] against a [`BuildEnvironment`] and produces a
//! [`Value`]. Evaluation never mutates the environment.
//!
//! Coercion rules:
//! - `AND`/`OR` evaluate both operands and require each to be a boolean or the
//!   string `true`/`false` (any case); anything else is an error.
//! - Relational operators require both operands to parse as numbers
//!   (decimal, or hexadecimal with a `0x` prefix).
//! - `==`/`!=` compare the evaluated strings, ignoring ASCII case.
//! - `!` of an empty value is `true`; `!` of a value that is not a boolean is
//!   `false` (logged as a warning) rather than an error.
//! - Item references and projections used as scalars become `;`-joined strings.

use crate::constants::{
    META_DIRECTORY, META_EXTENSION, META_FILENAME, META_FULL_PATH, META_IDENTITY,
    META_RECURSIVE_DIR, META_RELATIVE_DIR, META_ROOT_DIR,
};
use crate::core::{
    ast::{BinaryOperator, Expression, Function, UnaryOperator},
    environment::BuildEnvironment,
    paths,
};
use crate::models::ProjectItem;
use crate::system::filesystem::FileSystem;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Bool(bool),
}

impl Value {
    pub fn into_string(self) -> String {
        match self {
            Self::String(s) => s,
            Self::Bool(b) => b.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Represents errors that can occur while evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Expression \"{expression}\" evaluated to \"{value}\" instead of a boolean value.")]
    NotABoolean { expression: String, value: String },
    #[error("Expression \"{expression}\" evaluated to \"{value}\" instead of a number.")]
    NotANumber { expression: String, value: String },
    #[error("Metadata reference \"%({name})\" is only valid inside an item projection.")]
    MetadataOutsideItem { name: String },
}

type EvalResult<T> = Result<T, EvaluationError>;

/// Evaluation context: the environment, the filesystem used by `Exists`, the
/// directory relative paths resolve against, and the current item (inside a
/// projection or item definition).
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    env: &'a BuildEnvironment,
    fs: &'a dyn FileSystem,
    base_dir: &'a Path,
    item: Option<&'a ProjectItem>,
}

impl<'a> Evaluator<'a> {
    pub fn new(env: &'a BuildEnvironment, fs: &'a dyn FileSystem, base_dir: &'a Path) -> Self {
        Self {
            env,
            fs,
            base_dir,
            item: None,
        }
    }

    /// The same context with `item` supplying `%(..)` references.
    pub fn with_item<'b>(&self, item: &'b ProjectItem) -> Evaluator<'b>
    where
        'a: 'b,
    {
        Evaluator {
            env: self.env,
            fs: self.fs,
            base_dir: self.base_dir,
            item: Some(item),
        }
    }

    pub fn base_dir(&self) -> &Path {
        self.base_dir
    }

    // --- Public evaluation API ---

    pub fn evaluate(&self, expression: &Expression) -> EvalResult<Value> {
        match expression {
            Expression::Literal(s) | Expression::StringLiteral(s) => Ok(Value::String(s.clone())),
            Expression::PropertyReference(name) => Ok(Value::String(self.env.property(name))),
            Expression::MetadataReference(name) => match self.item {
                Some(item) => Ok(Value::String(metadata_value(item, name, self.base_dir))),
                None => Err(EvaluationError::MetadataOutsideItem { name: name.clone() }),
            },
            Expression::ItemListReference(name) => {
                let includes: Vec<String> =
                    self.env.items(name).into_iter().map(|i| i.include).collect();
                Ok(Value::String(includes.join(";")))
            }
            Expression::ItemListProjection { name, projection } => {
                let projected = self.project_items(name, projection)?;
                Ok(Value::String(projected.join(";")))
            }
            Expression::Concat(parts) => {
                let mut result = String::new();
                for part in parts {
                    result.push_str(&self.evaluate_string(part)?);
                }
                Ok(Value::String(result))
            }
            Expression::ItemList(elements) => {
                let rendered = elements
                    .iter()
                    .map(|e| self.evaluate_string(e))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::String(rendered.join(";")))
            }
            Expression::Unary {
                op: UnaryOperator::Not,
                operand,
            } => self.evaluate_not(operand),
            Expression::Binary { lhs, op, rhs } => self.evaluate_binary(lhs, *op, rhs),
            Expression::Function { function, argument } => {
                self.evaluate_function(*function, argument)
            }
        }
    }

    pub fn evaluate_string(&self, expression: &Expression) -> EvalResult<String> {
        self.evaluate(expression).map(Value::into_string)
    }

    /// Evaluates `expression` and coerces the result to a boolean.
    pub fn evaluate_condition(&self, expression: &Expression) -> EvalResult<bool> {
        let value = self.evaluate(expression)?;
        to_bool(expression, value)
    }

    /// Absent conditions are true.
    pub fn evaluate_optional_condition(&self, condition: Option<&Expression>) -> EvalResult<bool> {
        condition.map_or(Ok(true), |c| self.evaluate_condition(c))
    }

    /// Evaluates to a list of non-empty, trimmed `;`-separated strings.
    pub fn evaluate_list(&self, expression: &Expression) -> EvalResult<Vec<String>> {
        Ok(split_list(&self.evaluate_string(expression)?))
    }

    /// Materializes `expression` into new items of `item_type`.
    ///
    /// References and projections produce one item per source item and carry
    /// its metadata over; everything else is evaluated to a string and split
    /// on `;`.
    pub fn evaluate_items(
        &self,
        expression: &Expression,
        item_type: &str,
    ) -> EvalResult<Vec<ProjectItem>> {
        match expression {
            Expression::ItemListReference(name) => Ok(self
                .env
                .items(name)
                .iter()
                .map(|i| i.retyped(item_type))
                .collect()),
            Expression::ItemListProjection { name, projection } => {
                let mut items = Vec::new();
                for source in self.env.items(name) {
                    let include = self
                        .with_item(&source)
                        .evaluate_projection_parts(projection)?;
                    if include.is_empty() {
                        continue;
                    }
                    items.push(ProjectItem {
                        item_type: item_type.to_string(),
                        include,
                        metadata: source.metadata.clone(),
                    });
                }
                Ok(items)
            }
            Expression::ItemList(elements) => {
                let mut items = Vec::new();
                for element in elements {
                    items.extend(self.evaluate_items(element, item_type)?);
                }
                Ok(items)
            }
            Expression::Concat(parts) if parts.len() == 1 => match parts.first() {
                Some(single) if single.is_item_producing() => {
                    self.evaluate_items(single, item_type)
                }
                _ => self.evaluate_scalar_items(expression, item_type),
            },
            _ => self.evaluate_scalar_items(expression, item_type),
        }
    }

    // --- Helpers ---

    fn evaluate_scalar_items(
        &self,
        expression: &Expression,
        item_type: &str,
    ) -> EvalResult<Vec<ProjectItem>> {
        Ok(self
            .evaluate_list(expression)?
            .into_iter()
            .map(|include| ProjectItem::new(item_type, include))
            .collect())
    }

    fn evaluate_projection_parts(&self, parts: &[Expression]) -> EvalResult<String> {
        let mut result = String::new();
        for part in parts {
            result.push_str(&self.evaluate_string(part)?);
        }
        Ok(result)
    }

    fn project_items(&self, name: &str, projection: &[Expression]) -> EvalResult<Vec<String>> {
        let mut projected = Vec::new();
        for item in self.env.items(name) {
            let value = self.with_item(&item).evaluate_projection_parts(projection)?;
            if !value.is_empty() {
                projected.push(value);
            }
        }
        Ok(projected)
    }

    fn evaluate_not(&self, operand: &Expression) -> EvalResult<Value> {
        match self.evaluate(operand)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::String(s) if s.is_empty() => Ok(Value::Bool(true)),
            Value::String(s) => match parse_bool(&s) {
                Some(b) => Ok(Value::Bool(!b)),
                None => {
                    log::warn!(
                        "Negating non-boolean value '{}' of \"{}\"; treating it as false.",
                        s,
                        operand
                    );
                    Ok(Value::Bool(false))
                }
            },
        }
    }

    fn evaluate_binary(
        &self,
        lhs: &Expression,
        op: BinaryOperator,
        rhs: &Expression,
    ) -> EvalResult<Value> {
        match op {
            BinaryOperator::And | BinaryOperator::Or => {
                let left = to_bool(lhs, self.evaluate(lhs)?)?;
                let right = to_bool(rhs, self.evaluate(rhs)?)?;
                let result = if op == BinaryOperator::And {
                    left && right
                } else {
                    left || right
                };
                Ok(Value::Bool(result))
            }
            BinaryOperator::Equals | BinaryOperator::NotEquals => {
                let left = self.evaluate_string(lhs)?;
                let right = self.evaluate_string(rhs)?;
                let equal = left.eq_ignore_ascii_case(&right);
                Ok(Value::Bool(if op == BinaryOperator::Equals {
                    equal
                } else {
                    !equal
                }))
            }
            _ => {
                let left = to_number(lhs, self.evaluate_string(lhs)?)?;
                let right = to_number(rhs, self.evaluate_string(rhs)?)?;
                let result = match op {
                    BinaryOperator::LessThan => left < right,
                    BinaryOperator::LessThanOrEquals => left <= right,
                    BinaryOperator::GreaterThan => left > right,
                    _ => left >= right,
                };
                Ok(Value::Bool(result))
            }
        }
    }

    fn evaluate_function(&self, function: Function, argument: &Expression) -> EvalResult<Value> {
        let value = self.evaluate_string(argument)?;
        let result = match function {
            Function::Exists => {
                let trimmed = value.trim();
                !trimmed.is_empty() && self.fs.exists(&paths::absolutize(self.base_dir, trimmed))
            }
            Function::HasTrailingSlash => value.ends_with('/') || value.ends_with('\\'),
        };
        Ok(Value::Bool(result))
    }
}

// --- Coercions ---

fn parse_bool(text: &str) -> Option<bool> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn to_bool(expression: &Expression, value: Value) -> EvalResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::String(s) => parse_bool(&s).ok_or_else(|| EvaluationError::NotABoolean {
            expression: expression.to_string(),
            value: s,
        }),
    }
}

fn to_number(expression: &Expression, text: String) -> EvalResult<f64> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok().map(|n| n as f64),
        None => trimmed.parse::<f64>().ok().filter(|n| n.is_finite()),
    };
    parsed.ok_or_else(|| EvaluationError::NotANumber {
        expression: expression.to_string(),
        value: text,
    })
}

/// Splits on `;`, trimming entries and dropping empty ones.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// --- Item metadata ---

/// Resolves a metadata value: well-known names are computed from the
/// include, other names come from the item's own metadata, and anything
/// undefined is the empty string.
pub fn metadata_value(item: &ProjectItem, name: &str, base_dir: &Path) -> String {
    well_known_metadata(item, name, base_dir)
        .or_else(|| item.metadata.get(name).cloned())
        .unwrap_or_default()
}

fn well_known_metadata(item: &ProjectItem, name: &str, base_dir: &Path) -> Option<String> {
    let include = item.include.as_str();
    let path = Path::new(include);
    let is = |well_known: &str| name.eq_ignore_ascii_case(well_known);

    if is(META_IDENTITY) {
        Some(include.to_string())
    } else if is(META_FULL_PATH) {
        Some(paths::absolutize(base_dir, include).display().to_string())
    } else if is(META_FILENAME) {
        Some(
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    } else if is(META_EXTENSION) {
        Some(
            path.extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
        )
    } else if is(META_RELATIVE_DIR) {
        let cut = include.rfind(|c| c == '/' || c == '\\').map_or(0, |i| i + 1);
        Some(include.get(..cut).unwrap_or_default().to_string())
    } else if is(META_ROOT_DIR) {
        Some(root_dir(&paths::absolutize(base_dir, include)))
    } else if is(META_DIRECTORY) {
        Some(directory_without_root(&paths::absolutize(base_dir, include)))
    } else if is(META_RECURSIVE_DIR) {
        Some(
            item.metadata
                .get(META_RECURSIVE_DIR)
                .cloned()
                .unwrap_or_default(),
        )
    } else {
        None
    }
}

fn root_dir(full_path: &Path) -> String {
    let root: PathBuf = full_path
        .components()
        .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect();
    root.display().to_string()
}

fn directory_without_root(full_path: &Path) -> String {
    let parent = full_path.parent().unwrap_or(full_path);
    let relative: PathBuf = parent
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    let mut rendered = relative.display().to_string();
    if !rendered.is_empty() {
        rendered.push(std::path::MAIN_SEPARATOR);
    }
    rendered
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::core::ast::optimize;
    use crate::core::parser::{parse, parse_value};
    use crate::system::filesystem::MemoryFileSystem;

    fn env(pairs: &[(&str, &str)]) -> BuildEnvironment {
        let mut env = BuildEnvironment::new();
        for (name, value) in pairs {
            env.set_property(*name, *value);
        }
        env
    }

    fn eval(text: &str, env: &BuildEnvironment) -> EvalResult<Value> {
        let fs = MemoryFileSystem::new("/work").with_file("/work/present.txt", "");
        let expr = parse(text).unwrap();
        Evaluator::new(env, &fs, Path::new("/work")).evaluate(&expr)
    }

    fn eval_bool(text: &str, env: &BuildEnvironment) -> bool {
        match eval(text, env).unwrap() {
            Value::Bool(b) => b,
            Value::String(s) => panic!("expected a boolean, got '{}'", s),
        }
    }

    #[test]
    fn test_configuration_platform_condition() {
        let condition = " '$(Configuration)|$(Platform)' == 'Release|AnyCPU' ";
        let release = env(&[("Configuration", "Release"), ("Platform", "AnyCPU")]);
        let debug = env(&[("Configuration", "Debug"), ("Platform", "AnyCPU")]);
        assert!(eval_bool(condition, &release));
        assert!(!eval_bool(condition, &debug));
    }

    #[test]
    fn test_or_with_true_ignores_left_value() {
        assert!(eval_bool("$(Foo) == 42 OR true", &env(&[])));
        assert!(eval_bool("$(Foo) == 42 OR true", &env(&[("Foo", "7")])));
    }

    #[test]
    fn test_and_requires_both_sides() {
        let condition = "'$(Configuration)' == 'Debug' AND '$(Platform)' == 'AnyCPU'";
        assert!(eval_bool(
            condition,
            &env(&[("Configuration", "Debug"), ("Platform", "AnyCPU")])
        ));
        assert!(!eval_bool(
            condition,
            &env(&[("Configuration", "Debug"), ("Platform", "x64")])
        ));
    }

    #[test]
    fn test_equality_ignores_ascii_case() {
        assert!(eval_bool("'$(C)' == 'debug'", &env(&[("C", "DEBUG")])));
        assert!(eval_bool("'a' != 'b'", &env(&[])));
    }

    #[test]
    fn test_boolean_coercion_failure_names_the_subexpression() {
        let err = eval("'yes' AND true", &env(&[])).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::NotABoolean {
                expression: "'yes'".to_string(),
                value: "yes".to_string(),
            }
        );
        assert!(eval_bool("'TRUE' and 'False' or 'true'", &env(&[])));
    }

    #[test]
    fn test_relational_operators_coerce_numbers() {
        let e = env(&[("Version", "4.5"), ("Mask", "0x10")]);
        assert!(eval_bool("$(Version) > 4", &e));
        assert!(eval_bool("$(Version) <= 4.5", &e));
        assert!(eval_bool("$(Mask) == 0x10 AND $(Mask) >= 16", &e));
        let err = eval("'abc' < 3", &e).unwrap_err();
        assert!(matches!(err, EvaluationError::NotANumber { value, .. } if value == "abc"));
    }

    #[test]
    fn test_not_semantics() {
        let e = env(&[("Flag", "true")]);
        assert!(!eval_bool("!$(Flag)", &e));
        assert!(eval_bool("!$(Missing)", &e));
        assert!(eval_bool("!false", &e));
        // A value that is not a boolean degrades to false instead of failing.
        assert!(!eval_bool("!'banana'", &e));
    }

    #[test]
    fn test_functions() {
        let e = env(&[("OutDir", "bin/"), ("Name", "present.txt")]);
        assert!(eval_bool("HasTrailingSlash('$(OutDir)')", &e));
        assert!(!eval_bool("HasTrailingSlash('bin')", &e));
        assert!(eval_bool("Exists('$(Name)')", &e));
        assert!(!eval_bool("exists('missing.txt')", &e));
        assert!(!eval_bool("Exists('')", &e));
    }

    #[test]
    fn test_metadata_outside_item_is_an_error() {
        let err = eval("'%(Filename)' == ''", &env(&[])).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::MetadataOutsideItem {
                name: "Filename".to_string()
            }
        );
    }

    fn item_env() -> BuildEnvironment {
        let mut e = BuildEnvironment::new();
        e.set_property("Out", "obj");
        e.add_item(ProjectItem::new("Compile", "src/a.cs").with_metadata("Link", "A"));
        e.add_item(ProjectItem::new("Compile", "src/sub/b.cs"));
        e
    }

    #[test]
    fn test_item_reference_and_projection_as_scalars() {
        let e = item_env();
        let fs = MemoryFileSystem::new("/p");
        let evaluator = Evaluator::new(&e, &fs, Path::new("/p"));

        let refs = parse("@(Compile)").unwrap();
        assert_eq!(evaluator.evaluate_string(&refs).unwrap(), "src/a.cs;src/sub/b.cs");

        let projection = parse_value("@(Compile->'$(Out)/%(Filename).o')").unwrap();
        assert_eq!(
            evaluator.evaluate_string(&projection).unwrap(),
            "obj/a.o;obj/b.o"
        );
    }

    #[test]
    fn test_evaluate_items_creates_new_items() {
        let e = item_env();
        let fs = MemoryFileSystem::new("/p");
        let evaluator = Evaluator::new(&e, &fs, Path::new("/p"));

        let projected = evaluator
            .evaluate_items(&parse_value("@(Compile->'%(RelativeDir)%(Filename).o')").unwrap(), "Obj")
            .unwrap();
        assert_eq!(projected.len(), 2);
        assert_eq!(projected[0].item_type, "Obj");
        assert_eq!(projected[0].include, "src/a.o");
        assert_eq!(projected[0].metadata.get("Link").map(String::as_str), Some("A"));
        assert_eq!(projected[1].include, "src/sub/b.o");

        let mixed = evaluator
            .evaluate_items(&parse_value("x.txt;@(Compile);;$(Out)/y").unwrap(), "All")
            .unwrap();
        let includes: Vec<&str> = mixed.iter().map(|i| i.include.as_str()).collect();
        assert_eq!(includes, vec!["x.txt", "src/a.cs", "src/sub/b.cs", "obj/y"]);
        // The originals are untouched.
        assert!(e.items("All").is_empty());
    }

    #[test]
    fn test_well_known_metadata() {
        let item = ProjectItem::new("Compile", "src/sub/b.cs").with_metadata(META_RECURSIVE_DIR, "sub/");
        let base = Path::new("/p");
        assert_eq!(metadata_value(&item, "Identity", base), "src/sub/b.cs");
        assert_eq!(metadata_value(&item, "filename", base), "b");
        assert_eq!(metadata_value(&item, "Extension", base), ".cs");
        assert_eq!(metadata_value(&item, "RelativeDir", base), "src/sub/");
        assert_eq!(metadata_value(&item, "RecursiveDir", base), "sub/");
        assert_eq!(metadata_value(&item, "Custom", base), "");
        if cfg!(unix) {
            assert_eq!(metadata_value(&item, "FullPath", base), "/p/src/sub/b.cs");
            assert_eq!(metadata_value(&item, "RootDir", base), "/");
            assert_eq!(metadata_value(&item, "Directory", base), "p/src/sub/");
        }
    }

    #[test]
    fn test_optimize_preserves_results() {
        let e = env(&[("Configuration", "Release"), ("Platform", "AnyCPU")]);
        let fs = MemoryFileSystem::new("/");
        let evaluator = Evaluator::new(&e, &fs, Path::new("/"));
        for text in [
            " '$(Configuration)|$(Platform)' == 'Release|AnyCPU' ",
            "!('$(Configuration)' == 'Debug') AND 2 < 10",
            "a;'b$(Platform)';c",
            "'' == ''",
        ] {
            let expr = parse(text).unwrap();
            let optimized = optimize(&expr);
            assert_eq!(optimize(&optimized), optimized, "{}", text);
            assert_eq!(
                evaluator.evaluate(&expr).unwrap(),
                evaluator.evaluate(&optimized).unwrap(),
                "{}",
                text
            );
        }
    }

    /// Deterministic pseudo-random trees of concatenations and lists.
    struct TreeGen(u64);

    impl TreeGen {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) % bound
        }

        fn index(&mut self, bound: u64) -> usize {
            usize::try_from(self.next(bound)).unwrap()
        }

        fn tree(&mut self, depth: u32) -> Expression {
            let leaf_only = depth == 0;
            match self.next(if leaf_only { 4 } else { 6 }) {
                0 => Expression::literal(["a", "b c", ""][self.index(3)]),
                1 => Expression::string(["", "x", ";"][self.index(3)]),
                2 => Expression::property("Configuration"),
                3 => Expression::property("Undefined"),
                4 => Expression::Concat(self.children(depth)),
                _ => Expression::ItemList(self.children(depth)),
            }
        }

        fn children(&mut self, depth: u32) -> Vec<Expression> {
            let count = self.next(4);
            (0..count).map(|_| self.tree(depth - 1)).collect()
        }
    }

    #[test]
    fn test_optimize_preserves_results_on_generated_trees() {
        let e = env(&[("Configuration", "Release")]);
        let fs = MemoryFileSystem::new("/");
        let evaluator = Evaluator::new(&e, &fs, Path::new("/"));

        let empty_first = Expression::ItemList(vec![
            Expression::ItemList(vec![]),
            Expression::literal("a"),
        ]);
        assert_eq!(
            evaluator.evaluate(&optimize(&empty_first)).unwrap(),
            Value::String(";a".to_string())
        );

        let mut generator = TreeGen(0x5eed);
        for _ in 0..500 {
            let tree = generator.tree(4);
            let optimized = optimize(&tree);
            assert_eq!(optimize(&optimized), optimized, "{:?}", tree);
            assert_eq!(
                evaluator.evaluate(&tree).unwrap(),
                evaluator.evaluate(&optimized).unwrap(),
                "{:?}",
                tree
            );
            assert_eq!(
                evaluator.evaluate_items(&tree, "Out").unwrap(),
                evaluator.evaluate_items(&optimized, "Out").unwrap(),
                "{:?}",
                tree
            );
        }
    }
}
