// src/cli/mod.rs

//! Command-line surface of the `keel` binary.
//!
//! The top-level parser only collects raw arguments; each command parses its
//! own flags from them (see [`args`]) so that `keel <projects...>` can fall
//! back to `build` without a subcommand.

use crate::core::compiler::ProjectLoadError;
use crate::core::evaluator::EvaluationError;
use crate::core::graph_loader::GraphLoadError;
use crate::core::parser::ParseError;
use crate::core::project_graph::GraphError;
use clap::Parser;
use thiserror::Error;

pub mod args;
pub mod handlers;

/// keel: a multi-threaded build engine for declarative project files.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// A command (build, graph, targets, cache) followed by its arguments.
    /// Without a known command, `build` is assumed.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}

// --- Exit codes ---

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_BUILD_FAILED: i32 = 1;
pub const EXIT_PARSE_FAILURE: i32 = 2;
pub const EXIT_INTERNAL_ERROR: i32 = 3;
pub const EXIT_CANCELLED: i32 = 130;

/// Outcomes a handler reports after it already told the user what happened.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliError {
    #[error("Build failed.")]
    BuildFailed,
    #[error("Build was cancelled.")]
    Cancelled,
}

/// Maps a handler error to the process exit code.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    for cause in error.chain() {
        if let Some(cli_error) = cause.downcast_ref::<CliError>() {
            return match cli_error {
                CliError::BuildFailed => EXIT_BUILD_FAILED,
                CliError::Cancelled => EXIT_CANCELLED,
            };
        }
        if cause.downcast_ref::<ParseError>().is_some() {
            return EXIT_PARSE_FAILURE;
        }
        if let Some(load_error) = cause.downcast_ref::<ProjectLoadError>() {
            if is_parse_failure(load_error) {
                return EXIT_PARSE_FAILURE;
            }
        }
        match cause.downcast_ref::<GraphLoadError>() {
            Some(GraphLoadError::Load(load_error)) if is_parse_failure(load_error) => {
                return EXIT_PARSE_FAILURE;
            }
            Some(GraphLoadError::Evaluation { .. })
            | Some(GraphLoadError::Graph(GraphError::Cycle { .. })) => return EXIT_BUILD_FAILED,
            _ => {}
        }
        if cause.downcast_ref::<EvaluationError>().is_some()
            || matches!(
                cause.downcast_ref::<GraphError>(),
                Some(GraphError::Cycle { .. })
            )
        {
            return EXIT_BUILD_FAILED;
        }
    }
    EXIT_INTERNAL_ERROR
}

fn is_parse_failure(error: &ProjectLoadError) -> bool {
    matches!(
        error,
        ProjectLoadError::TomlParse { .. }
            | ProjectLoadError::Expression { .. }
            | ProjectLoadError::InvalidItem { .. }
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(exit_code_for(&anyhow::Error::new(CliError::BuildFailed)), 1);
        assert_eq!(exit_code_for(&anyhow::Error::new(CliError::Cancelled)), 130);
        assert_eq!(exit_code_for(&anyhow!("disk on fire")), 3);

        let evaluation = anyhow::Error::new(GraphLoadError::Evaluation {
            path: PathBuf::from("/p/app.keel.toml"),
            source: EvaluationError::NotABoolean {
                expression: "'x' AND true".to_string(),
                value: "x".to_string(),
            },
        });
        assert_eq!(exit_code_for(&evaluation), 1);

        let cycle = anyhow::Error::new(GraphLoadError::Graph(GraphError::Cycle {
            from: PathBuf::from("/p/a.keel.toml"),
            to: PathBuf::from("/p/b.keel.toml"),
        }));
        assert_eq!(exit_code_for(&cycle), 1);

        let registered = anyhow::Error::new(GraphLoadError::Graph(GraphError::NotRegistered(
            PathBuf::from("/p/a.keel.toml"),
        )));
        assert_eq!(exit_code_for(&registered), 3);
    }

    #[test]
    fn test_target_evaluation_failure_is_a_build_failure() {
        let error = Err::<(), _>(EvaluationError::NotANumber {
            expression: "$(Count) > 1".to_string(),
            value: "many".to_string(),
        })
        .context("Failed to evaluate 'app.keel.toml'")
        .unwrap_err();
        assert_eq!(exit_code_for(&error), 1);
    }

    #[test]
    fn test_parse_failures_are_found_through_context() {
        let parse = crate::core::parser::parse("'a' ==").unwrap_err();
        let error = Err::<(), _>(parse)
            .context("while reading a condition")
            .unwrap_err();
        assert_eq!(exit_code_for(&error), 2);

        let toml_error = crate::core::compiler::compile_project(
            &PathBuf::from("/p/x.keel.toml"),
            "[[target]\n",
        )
        .unwrap_err();
        let wrapped = anyhow::Error::new(GraphLoadError::Load(toml_error));
        assert_eq!(exit_code_for(&wrapped), 2);
    }

    #[test]
    fn test_missing_project_file_is_internal() {
        let error = anyhow::Error::new(ProjectLoadError::Io {
            path: PathBuf::from("/nope.keel.toml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert_eq!(exit_code_for(&error), 3);
    }
}
