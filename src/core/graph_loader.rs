// src/core/graph_loader.rs

//! # Graph Loader
//!
//! Discovers the full project graph from a set of entry projects. Projects
//! are loaded breadth-first in waves: every project of a wave is compiled (or
//! read from the cache) and evaluated in parallel with `rayon`, and the
//! `ProjectReference` items it declares form the next wave. Edges are added
//! once every project is registered, so a reference cycle is reported as a
//! [`GraphError::Cycle`] instead of hanging the build.

use crate::constants::PROJECT_REFERENCE_ITEM;
use crate::core::{
    cache::ProjectCache,
    compiler::{self, ProjectLoadError},
    environment::BuildEnvironment,
    evaluator::EvaluationError,
    paths,
    project_evaluator,
    project_graph::{GraphError, ProjectGraph},
};
use crate::models::Project;
use crate::system::filesystem::FileSystem;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphLoadError {
    #[error(transparent)]
    Load(#[from] ProjectLoadError),
    #[error("Failed to evaluate project '{path}': {source}")]
    Evaluation {
        path: PathBuf,
        #[source]
        source: EvaluationError,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Could not determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// One loaded and evaluated project, with the projects it references.
struct LoadedProject {
    project: Arc<Project>,
    environment: BuildEnvironment,
    references: Vec<PathBuf>,
}

/// Loads entry projects and everything they reference into a [`ProjectGraph`].
#[derive(Debug)]
pub struct GraphLoader<'a> {
    fs: &'a dyn FileSystem,
    cache: Option<&'a ProjectCache>,
    global: Arc<BuildEnvironment>,
}

impl<'a> GraphLoader<'a> {
    /// `global` is the shared ancestor of every project environment.
    pub fn new(fs: &'a dyn FileSystem, global: Arc<BuildEnvironment>) -> Self {
        Self {
            fs,
            cache: None,
            global,
        }
    }

    pub fn with_cache(mut self, cache: &'a ProjectCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Loads `entry_projects` and their transitive references.
    pub fn load(&self, entry_projects: &[PathBuf]) -> Result<ProjectGraph, GraphLoadError> {
        let cwd = self.fs.current_dir().map_err(GraphLoadError::CurrentDir)?;
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut wave: Vec<PathBuf> = Vec::new();
        for entry in entry_projects {
            let path = paths::absolutize(&cwd, entry);
            if seen.insert(path.clone()) {
                wave.push(path);
            }
        }

        let graph = ProjectGraph::new();
        let mut edges: Vec<(PathBuf, Vec<PathBuf>)> = Vec::new();
        let mut wave_number = 0;

        while !wave.is_empty() {
            wave_number += 1;
            log::debug!("Loading wave {} ({} project(s)).", wave_number, wave.len());

            // Results keep the wave order, so registration order is deterministic.
            let loaded: Vec<Result<LoadedProject, GraphLoadError>> =
                wave.par_iter().map(|path| self.load_one(path)).collect();

            let mut next_wave = Vec::new();
            for result in loaded {
                let loaded = result?;
                let path = loaded.project.filename.clone();
                for reference in &loaded.references {
                    if seen.insert(reference.clone()) {
                        next_wave.push(reference.clone());
                    }
                }
                graph.add(loaded.project, loaded.environment)?;
                edges.push((path, loaded.references));
            }
            wave = next_wave;
        }

        for (project, references) in &edges {
            for reference in references {
                graph.add_dependency(project, reference)?;
            }
        }
        log::debug!("Project graph has {} project(s).", graph.len());
        Ok(graph)
    }

    fn load_one(&self, path: &Path) -> Result<LoadedProject, GraphLoadError> {
        let project = compiler::load_project(path, self.fs, self.cache)?;
        let environment =
            project_evaluator::evaluate_project(&project, Arc::clone(&self.global), self.fs)
                .map_err(|source| GraphLoadError::Evaluation {
                    path: project.filename.clone(),
                    source,
                })?;

        let mut references: Vec<PathBuf> = Vec::new();
        for item in environment.items(PROJECT_REFERENCE_ITEM) {
            let reference = paths::absolutize(project.directory(), &item.include);
            if !references.contains(&reference) {
                references.push(reference);
            }
        }
        log::trace!(
            "'{}' references {} project(s).",
            project.filename.display(),
            references.len()
        );
        Ok(LoadedProject {
            project: Arc::new(project),
            environment,
            references,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::system::filesystem::MemoryFileSystem;

    fn project_file(references: &[&str]) -> String {
        let mut content = String::from("[[target]]\nname = \"Build\"\n");
        if !references.is_empty() {
            content.push_str("\n[[item_group]]\n");
            for reference in references {
                content.push_str(&format!(
                    "[[item_group.item]]\ntype = \"ProjectReference\"\ninclude = \"{reference}\"\n"
                ));
            }
        }
        content
    }

    fn fixture() -> MemoryFileSystem {
        MemoryFileSystem::new("/src")
            .with_file(
                "/src/app/app.keel.toml",
                &project_file(&["../lib/lib.keel.toml", "../util/util.keel.toml"]),
            )
            .with_file("/src/lib/lib.keel.toml", &project_file(&["../util/util.keel.toml"]))
            .with_file("/src/util/util.keel.toml", &project_file(&[]))
    }

    fn names(graph: &ProjectGraph) -> Vec<String> {
        graph
            .edges()
            .into_iter()
            .map(|(p, _)| p.display().to_string())
            .collect()
    }

    #[test]
    fn test_references_are_discovered_breadth_first() {
        let fs = fixture();
        let loader = GraphLoader::new(&fs, Arc::new(BuildEnvironment::new()));
        let graph = loader.load(&[PathBuf::from("app/app.keel.toml")]).unwrap();

        assert_eq!(
            names(&graph),
            vec![
                "/src/app/app.keel.toml",
                "/src/lib/lib.keel.toml",
                "/src/util/util.keel.toml"
            ]
        );
        let first = graph.try_get_next_project().unwrap();
        assert_eq!(first.project.name(), "util");
        assert!(graph.try_get_next_project().is_none());
    }

    #[test]
    fn test_environment_inherits_global_properties() {
        let fs = fixture();
        let mut global = BuildEnvironment::new();
        global.set_property("Configuration", "Release");
        let graph = GraphLoader::new(&fs, Arc::new(global))
            .load(&[PathBuf::from("/src/util/util.keel.toml")])
            .unwrap();
        let request = graph.try_get_next_project().unwrap();
        assert_eq!(request.environment.property("Configuration"), "Release");
        assert_eq!(request.environment.property("ProjectName"), "util");
    }

    #[test]
    fn test_duplicate_entries_are_loaded_once() {
        let fs = fixture();
        let graph = GraphLoader::new(&fs, Arc::new(BuildEnvironment::new()))
            .load(&[
                PathBuf::from("/src/util/util.keel.toml"),
                PathBuf::from("util/../util/util.keel.toml"),
            ])
            .unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_reference_cycle_is_an_error() {
        let fs = MemoryFileSystem::new("/src")
            .with_file("/src/a.keel.toml", &project_file(&["b.keel.toml"]))
            .with_file("/src/b.keel.toml", &project_file(&["a.keel.toml"]));
        let result = GraphLoader::new(&fs, Arc::new(BuildEnvironment::new()))
            .load(&[PathBuf::from("a.keel.toml")]);
        assert!(matches!(
            result,
            Err(GraphLoadError::Graph(GraphError::Cycle { .. }))
        ));
    }

    #[test]
    fn test_missing_reference_fails_the_load() {
        let fs = MemoryFileSystem::new("/src")
            .with_file("/src/a.keel.toml", &project_file(&["missing.keel.toml"]));
        let result = GraphLoader::new(&fs, Arc::new(BuildEnvironment::new()))
            .load(&[PathBuf::from("a.keel.toml")]);
        assert!(matches!(
            result,
            Err(GraphLoadError::Load(ProjectLoadError::Io { .. }))
        ));
    }
}
