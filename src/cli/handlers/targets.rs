// src/cli/handlers/targets.rs

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    CancellationToken,
    cli::{args::TargetsArgs, handlers::commons},
    core::{
        compiler,
        environment::BuildEnvironment,
        evaluator::{EvaluationError, Evaluator},
        project_evaluator,
    },
    models::Project,
    system::{
        filesystem::{FileSystem, RealFileSystem},
        settings,
    },
};

/// Lists the targets of one project, marking the default ones.
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let targets_args = TargetsArgs::try_parse_from(&args)?;
    let settings = settings::load_settings().context("Failed to load keel settings")?;
    let path = match targets_args.project {
        Some(path) => path,
        None => single_project_in_current_dir()?,
    };

    let fs = RealFileSystem;
    let cache = commons::open_cache(&settings, false);
    let project = compiler::load_project(&path, &fs, cache.as_ref())?;
    let global = Arc::new(commons::global_environment(&settings, &[]));
    let env = project_evaluator::evaluate_project(&project, global, &fs)
        .with_context(|| format!("Failed to evaluate '{}'", project.filename.display()))?;

    println!(
        "\nTargets of {} [{}]:",
        project.name().cyan(),
        project.filename.display()
    );
    for line in describe_targets(&project, &env, &fs)? {
        println!("{}", line);
    }
    Ok(())
}

fn single_project_in_current_dir() -> Result<PathBuf> {
    let mut found = commons::resolve_entry_projects(&[])?;
    if found.len() > 1 {
        return Err(anyhow!(
            "Found {} project files in the current directory; name the one to inspect.",
            found.len()
        ));
    }
    found
        .pop()
        .ok_or_else(|| anyhow!("No project file found in the current directory."))
}

/// One line per target plus indented detail lines.
fn describe_targets(
    project: &Project,
    env: &BuildEnvironment,
    fs: &dyn FileSystem,
) -> Result<Vec<String>, EvaluationError> {
    if project.targets.is_empty() {
        return Ok(vec!["  (no targets)".to_string()]);
    }
    let evaluator = Evaluator::new(env, fs, project.directory());

    let mut defaults = match &project.default_targets {
        Some(expression) => evaluator.evaluate_list(expression)?,
        None => Vec::new(),
    };
    if defaults.is_empty() {
        defaults.extend(project.targets.first().map(|t| t.name.clone()));
    }

    let mut lines = Vec::new();
    for target in &project.targets {
        let is_default = defaults.iter().any(|d| d.eq_ignore_ascii_case(&target.name));
        lines.push(if is_default {
            format!("  {} (default)", target.name)
        } else {
            format!("  {}", target.name)
        });
        if let Some(depends_on) = &target.depends_on_targets {
            let names = evaluator.evaluate_list(depends_on)?;
            if !names.is_empty() {
                lines.push(format!("      depends on: {}", names.join(", ")));
            }
        }
        if let Some(condition) = &target.condition {
            lines.push(format!("      condition: {}", condition));
        }
        if target.inputs.is_some() && target.outputs.is_some() {
            lines.push("      incremental".to_string());
        }
    }
    Ok(lines)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::system::filesystem::MemoryFileSystem;
    use std::path::Path;

    fn describe(content: &str) -> Vec<String> {
        let fs = MemoryFileSystem::new("/w").with_file("/w/app.keel.toml", content);
        let project = compiler::load_project(Path::new("/w/app.keel.toml"), &fs, None).unwrap();
        let env =
            project_evaluator::evaluate_project(&project, Arc::new(BuildEnvironment::new()), &fs)
                .unwrap();
        describe_targets(&project, &env, &fs).unwrap()
    }

    #[test]
    fn test_default_and_dependencies() {
        let lines = describe(
            r#"
default_targets = "$(Main)"

[[property_group]]
[[property_group.property]]
name = "Main"
value = "Build"

[[target]]
name = "Restore"

[[target]]
name = "Build"
depends_on = "Restore;Compile"
inputs = "a.cs"
outputs = "a.dll"
"#,
        );
        assert_eq!(
            lines,
            vec![
                "  Restore",
                "  Build (default)",
                "      depends on: Restore, Compile",
                "      incremental",
            ]
        );
    }

    #[test]
    fn test_first_target_is_the_fallback_default() {
        let lines = describe("[[target]]\nname = \"Only\"\n");
        assert_eq!(lines, vec!["  Only (default)"]);
    }

    #[test]
    fn test_project_without_targets() {
        assert_eq!(describe(""), vec!["  (no targets)"]);
    }
}
