// src/cli/args.rs

//! Per-command argument parsers. Each parses the arguments that follow the
//! command name, so none of them expects a binary name.

use crate::system::logger::Verbosity;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Builds projects and every project they reference."
)]
pub struct BuildArgs {
    /// Project files to build. Defaults to every `*.keel.toml` in the current directory.
    pub projects: Vec<PathBuf>,

    /// Targets to build, separated by `,` or `;`. Defaults to each project's default targets.
    #[arg(long, short, value_delimiter = ',')]
    pub targets: Vec<String>,

    /// Sets a global property, as NAME=VALUE. May be repeated.
    #[arg(long = "property", short = 'p', value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    /// Maximum number of projects built at once (0 = one per CPU).
    #[arg(long, short = 'm')]
    pub max_parallelism: Option<usize>,

    /// Compile every project file instead of reading the project cache.
    #[arg(long)]
    pub no_cache: bool,

    /// How much of the build log to print.
    #[arg(long, short, value_enum, default_value_t = Verbosity::Normal)]
    pub verbosity: Verbosity,
}

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Displays the project dependency graph as a tree."
)]
pub struct GraphArgs {
    /// Entry project files. Defaults to every `*.keel.toml` in the current directory.
    pub projects: Vec<PathBuf>,

    /// Sets a global property, as NAME=VALUE. May be repeated.
    #[arg(long = "property", short = 'p', value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    #[arg(long)]
    pub no_cache: bool,

    /// Print the graph as JSON instead of a tree.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Lists the targets of a project with their dependencies."
)]
pub struct TargetsArgs {
    /// The project file. Defaults to the only `*.keel.toml` in the current directory.
    pub project: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Manages the compiled project cache.")]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    /// Deletes every cached project.
    Clean,
    /// Prints the cache directory.
    Path,
}

/// Parses a `NAME=VALUE` pair. The value may be empty; the name may not.
pub fn parse_property(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing property name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property() {
        assert_eq!(
            parse_property("Configuration=Release").unwrap(),
            ("Configuration".to_string(), "Release".to_string())
        );
        assert_eq!(
            parse_property("Defines=A=1").unwrap(),
            ("Defines".to_string(), "A=1".to_string())
        );
        assert_eq!(parse_property("Empty=").unwrap().1, "");
        assert!(parse_property("NoEquals").is_err());
        assert!(parse_property("=value").is_err());
    }

    #[test]
    fn test_build_args() {
        let args = BuildArgs::try_parse_from([
            "app.keel.toml",
            "-t",
            "Clean,Build",
            "-p",
            "Configuration=Release",
            "-m",
            "4",
            "--no-cache",
            "-v",
            "detailed",
        ])
        .unwrap();
        assert_eq!(args.projects, vec![PathBuf::from("app.keel.toml")]);
        assert_eq!(args.targets, vec!["Clean", "Build"]);
        assert_eq!(args.properties.len(), 1);
        assert_eq!(args.max_parallelism, Some(4));
        assert!(args.no_cache);
        assert_eq!(args.verbosity, Verbosity::Detailed);
    }

    #[test]
    fn test_build_args_defaults() {
        let args = BuildArgs::try_parse_from(Vec::<String>::new()).unwrap();
        assert!(args.projects.is_empty());
        assert!(args.targets.is_empty());
        assert_eq!(args.verbosity, Verbosity::Normal);
    }

    #[test]
    fn test_cache_subcommand() {
        let args = CacheArgs::try_parse_from(["clean"]).unwrap();
        assert_eq!(args.command, CacheCommand::Clean);
        assert!(CacheArgs::try_parse_from(["explode"]).is_err());
    }
}
