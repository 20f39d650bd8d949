// src/cli/handlers/commons.rs

// Shared plumbing for the handlers: locating project files, preparing the
// global environment and cache, and the builder the scheduler runs.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    constants::PROJECT_FILE_SUFFIX,
    core::{
        cache::ProjectCache,
        environment::BuildEnvironment,
        project_graph::BuildRequest,
        scheduler::{BuildOutcome, ProjectBuilder},
        task_executor::{ExecutionError, TaskEngine},
        tasks::BuildServices,
    },
    system::{logger::BuildLog, settings::Settings},
};

/// Every project file directly inside `dir`, sorted by name.
pub fn find_project_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        let is_project = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(PROJECT_FILE_SUFFIX));
        if is_project && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// The projects named on the command line, or the ones in the current directory.
pub fn resolve_entry_projects(projects: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if !projects.is_empty() {
        return Ok(projects.to_vec());
    }
    let cwd = std::env::current_dir().context("Could not determine the current directory")?;
    let found = find_project_files(&cwd)?;
    if found.is_empty() {
        return Err(anyhow!(
            "No project file given and no '*{}' file found in '{}'.",
            PROJECT_FILE_SUFFIX,
            cwd.display()
        ));
    }
    Ok(found)
}

/// The shared ancestor environment: settings defaults, then command-line overrides.
pub fn global_environment(settings: &Settings, overrides: &[(String, String)]) -> BuildEnvironment {
    let mut env = BuildEnvironment::new();
    for (name, value) in &settings.default_properties {
        env.set_property(name.as_str(), value.as_str());
    }
    for (name, value) in overrides {
        env.set_property(name.as_str(), value.as_str());
    }
    env
}

/// The project cache, unless disabled. A cache that cannot be located is only a warning.
pub fn open_cache(settings: &Settings, no_cache: bool) -> Option<ProjectCache> {
    if no_cache || !settings.cache.enabled {
        log::debug!("Project cache disabled.");
        return None;
    }
    match settings.cache_dir() {
        Ok(dir) => Some(ProjectCache::new(dir)),
        Err(e) => {
            log::warn!("Project cache unavailable: {}", e);
            None
        }
    }
}

// --- Project builder ---

/// Runs the requested targets of each project the scheduler hands out.
#[derive(Debug)]
pub struct EngineBuilder {
    services: BuildServices,
    log: Arc<BuildLog>,
    targets: Vec<String>,
}

impl EngineBuilder {
    pub fn new(services: BuildServices, log: Arc<BuildLog>, targets: Vec<String>) -> Self {
        Self {
            services,
            log,
            targets,
        }
    }
}

impl ProjectBuilder for EngineBuilder {
    fn build(&self, request: BuildRequest) -> Result<BuildOutcome> {
        let BuildRequest {
            project,
            mut environment,
        } = request;
        let logger = self.log.create_logger();
        log::debug!(
            "Worker {:?} building '{}' (logger {}).",
            std::thread::current().name(),
            project.filename.display(),
            logger.id()
        );

        let mut engine = TaskEngine::new(&project, &mut environment, &self.services, &logger);
        let result = engine.build(&self.targets);
        log::debug!(
            "Targets run for '{}': [{}]",
            project.filename.display(),
            engine.executed_targets().join(", ")
        );
        match result {
            Ok(()) => Ok(BuildOutcome::Succeeded),
            Err(ExecutionError::Cancelled) => {
                log::debug!("Build of '{}' cancelled.", project.filename.display());
                Ok(BuildOutcome::Failed)
            }
            Err(e) => {
                log::debug!("Build of '{}' failed: {}", project.filename.display(), e);
                Ok(BuildOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::compiler;
    use crate::core::project_evaluator;
    use crate::system::filesystem::MemoryFileSystem;
    use crate::system::logger::{MemorySink, Verbosity};
    use crate::system::settings::CompilerSettings;
    use crate::system::toolchain::ProcessCompiler;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_find_project_files_only_matches_the_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.keel.toml"), "").unwrap();
        fs::write(dir.path().join("a.keel.toml"), "").unwrap();
        fs::write(dir.path().join("settings.toml"), "").unwrap();
        fs::create_dir(dir.path().join("sub.keel.toml")).unwrap();

        let found = find_project_files(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.keel.toml", "b.keel.toml"]);
    }

    #[test]
    fn test_overrides_win_over_settings() {
        let settings = Settings::default();
        let env = global_environment(
            &settings,
            &[("Configuration".to_string(), "Release".to_string())],
        );
        assert_eq!(env.property("Configuration"), "Release");
        assert_eq!(env.property("Platform"), "AnyCPU");
    }

    #[test]
    fn test_disabled_cache() {
        let mut settings = Settings::default();
        assert!(open_cache(&settings, true).is_none());
        settings.cache.enabled = false;
        assert!(open_cache(&settings, false).is_none());
    }

    fn builder_run(content: &str, targets: &[&str]) -> (BuildOutcome, Vec<String>) {
        let fs = Arc::new(MemoryFileSystem::new("/w").with_file("/w/app.keel.toml", content));
        let project = compiler::load_project(Path::new("/w/app.keel.toml"), fs.as_ref(), None).unwrap();
        let environment =
            project_evaluator::evaluate_project(&project, Arc::new(BuildEnvironment::new()), fs.as_ref())
                .unwrap();

        let sink = Arc::new(MemorySink::new(Verbosity::Normal));
        let log = Arc::new(BuildLog::new().with_sink(sink.clone()));
        let services = BuildServices {
            fs,
            compiler: Arc::new(ProcessCompiler::new(&CompilerSettings::default())),
            cancellation_token: Arc::new(AtomicBool::new(false)),
        };
        let builder = EngineBuilder::new(
            services,
            log,
            targets.iter().map(|t| t.to_string()).collect(),
        );
        let outcome = builder
            .build(BuildRequest {
                project: Arc::new(project),
                environment,
            })
            .unwrap();
        (outcome, sink.lines())
    }

    #[test]
    fn test_builder_runs_requested_targets() {
        let content = r#"
[[target]]
name = "Build"

[[target.task]]
kind = "Message"
text = "building"

[[target]]
name = "Test"

[[target.task]]
kind = "Message"
text = "testing"
"#;
        let (outcome, lines) = builder_run(content, &["Test"]);
        assert_eq!(outcome, BuildOutcome::Succeeded);
        assert_eq!(lines, vec!["Test:", "  testing"]);
    }

    #[test]
    fn test_builder_reports_failure() {
        let content = r#"
[[target]]
name = "Build"

[[target.task]]
kind = "Error"
text = "broken"
"#;
        let (outcome, _) = builder_run(content, &[]);
        assert_eq!(outcome, BuildOutcome::Failed);
    }
}
