// src/core/project_graph.rs

//! # Project Dependency Graph
//!
//! The only structure shared and mutated by every worker. All state lives
//! behind one mutex; a condition variable wakes idle workers whenever a
//! project becomes buildable or the graph finishes.
//!
//! Invariants:
//! - a project is handed out at most once, and only when none of its
//!   dependencies is still outstanding;
//! - when a project fails, every project depending on it (directly or
//!   transitively) is skipped without running and counts as finished;
//! - the finished signal fires exactly once, when succeeded + failed +
//!   skipped equals the number of registered projects.

use crate::CancellationToken;
use crate::core::environment::BuildEnvironment;
use crate::models::Project;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Project '{0}' is already part of the build graph.")]
    AlreadyRegistered(PathBuf),
    #[error("Project '{0}' is not part of the build graph.")]
    NotRegistered(PathBuf),
    #[error("Project '{0}' has already started building; its dependencies can no longer change.")]
    AlreadyStarted(PathBuf),
    #[error("Adding a dependency from '{from}' to '{to}' would create a cycle.")]
    Cycle { from: PathBuf, to: PathBuf },
}

/// Lifecycle of a registered project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    Todo,
    InFlight,
    Succeeded,
    Failed,
    /// Never built because a dependency failed.
    Skipped,
}

impl ProjectStatus {
    fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// A project handed to a worker, together with exclusive ownership of its environment.
#[derive(Debug)]
pub struct BuildRequest {
    pub project: Arc<Project>,
    pub environment: BuildEnvironment,
}

#[derive(Debug)]
struct Node {
    path: PathBuf,
    project: Arc<Project>,
    environment: Option<BuildEnvironment>,
    status: ProjectStatus,
    /// Dependencies that have not finished yet.
    outstanding: HashSet<usize>,
    dependencies: Vec<usize>,
    dependents: Vec<usize>,
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: Vec<Node>,
    index: HashMap<PathBuf, usize>,
    finished_count: usize,
    finished: bool,
}

impl GraphState {
    fn id(&self, path: &Path) -> Result<usize, GraphError> {
        self.index
            .get(path)
            .copied()
            .ok_or_else(|| GraphError::NotRegistered(path.to_path_buf()))
    }

    fn node_mut(&mut self, id: usize) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// True if `target` is reachable from `start` by following dependency edges.
    fn depends_transitively(&self, start: usize, target: usize) -> bool {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.dependencies.iter().copied());
            }
        }
        false
    }

    fn take_next(&mut self) -> Option<BuildRequest> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.status == ProjectStatus::Todo && n.outstanding.is_empty())?;
        node.status = ProjectStatus::InFlight;
        let environment = node.environment.take().unwrap_or_default();
        log::debug!("Dequeued project '{}'.", node.path.display());
        Some(BuildRequest {
            project: Arc::clone(&node.project),
            environment,
        })
    }

    fn finish(&mut self, id: usize, status: ProjectStatus) {
        if let Some(node) = self.node_mut(id) {
            if node.status.is_finished() {
                return;
            }
            node.status = status;
            node.environment = None;
            self.finished_count += 1;
        }
    }

    /// Skips every not-yet-started project that depends on `failed`, transitively.
    fn skip_dependents(&mut self, failed: usize) {
        let mut queue: VecDeque<usize> = VecDeque::from([failed]);
        while let Some(current) = queue.pop_front() {
            let dependents = self
                .nodes
                .get(current)
                .map(|n| n.dependents.clone())
                .unwrap_or_default();
            for dependent in dependents {
                let is_todo = self
                    .nodes
                    .get(dependent)
                    .is_some_and(|n| n.status == ProjectStatus::Todo);
                if is_todo {
                    if let Some(node) = self.nodes.get(dependent) {
                        log::debug!("Skipping '{}': a dependency failed.", node.path.display());
                    }
                    self.finish(dependent, ProjectStatus::Skipped);
                    queue.push_back(dependent);
                }
            }
        }
    }

    /// Sets the finished flag once every project has finished. Returns true
    /// on the transition.
    fn update_finished(&mut self) -> bool {
        if !self.finished && self.finished_count == self.nodes.len() {
            self.finished = true;
            return true;
        }
        false
    }
}

/// Thread-safe project dependency graph.
#[derive(Debug, Default)]
pub struct ProjectGraph {
    state: Mutex<GraphState>,
    changed: Condvar,
}

impl ProjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // --- Registration ---

    /// Registers a project with its evaluated environment and no dependencies.
    pub fn add(&self, project: Arc<Project>, environment: BuildEnvironment) -> Result<(), GraphError> {
        let mut state = self.lock();
        let path = project.filename.clone();
        if state.index.contains_key(&path) {
            return Err(GraphError::AlreadyRegistered(path));
        }
        let id = state.nodes.len();
        state.index.insert(path.clone(), id);
        state.nodes.push(Node {
            path,
            project,
            environment: Some(environment),
            status: ProjectStatus::Todo,
            outstanding: HashSet::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        });
        // A new project re-opens a graph that had nothing left to do.
        state.finished = false;
        Ok(())
    }

    /// Records that `project` must not start before `depends_on` has finished.
    pub fn add_dependency(&self, project: &Path, depends_on: &Path) -> Result<(), GraphError> {
        let mut state = self.lock();
        let from = state.id(project)?;
        let to = state.id(depends_on)?;

        let from_status = state.nodes.get(from).map(|n| n.status);
        if from_status != Some(ProjectStatus::Todo) {
            return Err(GraphError::AlreadyStarted(project.to_path_buf()));
        }
        if from == to || state.depends_transitively(to, from) {
            return Err(GraphError::Cycle {
                from: project.to_path_buf(),
                to: depends_on.to_path_buf(),
            });
        }

        let dependency_status = state.nodes.get(to).map(|n| n.status);
        if let Some(node) = state.node_mut(from) {
            if node.dependencies.contains(&to) {
                return Ok(());
            }
            node.dependencies.push(to);
            if !dependency_status.is_some_and(ProjectStatus::is_finished) {
                node.outstanding.insert(to);
            }
        }
        if let Some(node) = state.node_mut(to) {
            node.dependents.push(from);
        }

        if matches!(
            dependency_status,
            Some(ProjectStatus::Failed | ProjectStatus::Skipped)
        ) {
            state.finish(from, ProjectStatus::Skipped);
            state.skip_dependents(from);
            if state.update_finished() {
                self.changed.notify_all();
            }
        }
        Ok(())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Scheduling ---

    /// Atomically takes the first registered project that is ready to build.
    pub fn try_get_next_project(&self) -> Option<BuildRequest> {
        self.lock().take_next()
    }

    /// Blocks until a project is ready, the graph finishes or `cancel` is set.
    /// Wakes at least every `poll_interval` to observe cancellation.
    pub fn wait_for_next_project(
        &self,
        cancel: &CancellationToken,
        poll_interval: Duration,
    ) -> Option<BuildRequest> {
        let mut state = self.lock();
        loop {
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(request) = state.take_next() {
                return Some(request);
            }
            if state.finished || state.finished_count == state.nodes.len() {
                return None;
            }
            state = match self.changed.wait_timeout(state, poll_interval) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn mark_as_success(&self, project: &Path) -> Result<(), GraphError> {
        let mut state = self.lock();
        let id = state.id(project)?;
        state.finish(id, ProjectStatus::Succeeded);
        let dependents = state
            .nodes
            .get(id)
            .map(|n| n.dependents.clone())
            .unwrap_or_default();
        for dependent in dependents {
            if let Some(node) = state.node_mut(dependent) {
                node.outstanding.remove(&id);
            }
        }
        state.update_finished();
        self.changed.notify_all();
        Ok(())
    }

    pub fn mark_as_failed(&self, project: &Path) -> Result<(), GraphError> {
        let mut state = self.lock();
        let id = state.id(project)?;
        state.finish(id, ProjectStatus::Failed);
        state.skip_dependents(id);
        state.update_finished();
        self.changed.notify_all();
        Ok(())
    }

    // --- Completion ---

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Blocks until the finished signal fires or `timeout` elapses.
    /// Returns whether the graph is finished.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let result = self
            .changed
            .wait_timeout_while(state, timeout, |s| !s.finished);
        match result {
            Ok((guard, _)) => guard.finished,
            Err(poisoned) => poisoned.into_inner().0.finished,
        }
    }

    // --- Reporting ---

    pub fn status(&self, project: &Path) -> Option<ProjectStatus> {
        let state = self.lock();
        let id = state.index.get(project).copied()?;
        state.nodes.get(id).map(|n| n.status)
    }

    /// Projects with `status`, in registration order.
    pub fn projects_with_status(&self, status: ProjectStatus) -> Vec<PathBuf> {
        self.lock()
            .nodes
            .iter()
            .filter(|n| n.status == status)
            .map(|n| n.path.clone())
            .collect()
    }

    /// Every registered project with the projects it depends on, in registration order.
    pub fn edges(&self) -> Vec<(PathBuf, Vec<PathBuf>)> {
        let state = self.lock();
        state
            .nodes
            .iter()
            .map(|n| {
                let deps = n
                    .dependencies
                    .iter()
                    .filter_map(|&d| state.nodes.get(d).map(|dep| dep.path.clone()))
                    .collect();
                (n.path.clone(), deps)
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Instant;

    fn project(name: &str) -> Arc<Project> {
        Arc::new(Project {
            filename: PathBuf::from(format!("/src/{name}.keel.toml")),
            default_targets: None,
            property_groups: vec![],
            item_groups: vec![],
            targets: vec![],
        })
    }

    fn path(name: &str) -> PathBuf {
        PathBuf::from(format!("/src/{name}.keel.toml"))
    }

    fn graph(names: &[&str]) -> ProjectGraph {
        let graph = ProjectGraph::new();
        for name in names {
            graph.add(project(name), BuildEnvironment::new()).unwrap();
        }
        graph
    }

    fn next_name(graph: &ProjectGraph) -> Option<String> {
        graph.try_get_next_project().map(|r| r.project.name())
    }

    #[test]
    fn test_duplicate_and_unknown_projects_are_rejected() {
        let g = graph(&["p1"]);
        assert!(g.contains(&path("p1")));
        assert_eq!(
            g.add(project("p1"), BuildEnvironment::new()),
            Err(GraphError::AlreadyRegistered(path("p1")))
        );
        assert_eq!(
            g.add_dependency(&path("p1"), &path("ghost")),
            Err(GraphError::NotRegistered(path("ghost")))
        );
    }

    #[test]
    fn test_dependency_is_returned_first() {
        let g = graph(&["p2", "p1"]);
        g.add_dependency(&path("p2"), &path("p1")).unwrap();

        assert_eq!(next_name(&g).as_deref(), Some("p1"));
        assert_eq!(next_name(&g), None);

        g.mark_as_success(&path("p1")).unwrap();
        assert!(!g.is_finished());
        assert_eq!(next_name(&g).as_deref(), Some("p2"));
        g.mark_as_success(&path("p2")).unwrap();
        assert!(g.is_finished());
    }

    #[test]
    fn test_failure_skips_transitive_dependents_and_still_finishes() {
        let g = graph(&["p1", "p2", "p3", "other"]);
        g.add_dependency(&path("p2"), &path("p1")).unwrap();
        g.add_dependency(&path("p3"), &path("p2")).unwrap();

        assert_eq!(next_name(&g).as_deref(), Some("p1"));
        assert_eq!(next_name(&g).as_deref(), Some("other"));
        g.mark_as_failed(&path("p1")).unwrap();

        assert_eq!(g.status(&path("p2")), Some(ProjectStatus::Skipped));
        assert_eq!(g.status(&path("p3")), Some(ProjectStatus::Skipped));
        assert_eq!(next_name(&g), None);
        assert!(!g.is_finished());

        g.mark_as_success(&path("other")).unwrap();
        assert!(g.is_finished());
        assert!(g.wait_finished(Duration::from_millis(1)));
        assert_eq!(g.projects_with_status(ProjectStatus::Failed), vec![path("p1")]);
    }

    #[test]
    fn test_cycles_are_rejected() {
        let g = graph(&["a", "b", "c"]);
        g.add_dependency(&path("a"), &path("b")).unwrap();
        g.add_dependency(&path("b"), &path("c")).unwrap();
        assert!(matches!(
            g.add_dependency(&path("c"), &path("a")),
            Err(GraphError::Cycle { .. })
        ));
        assert!(matches!(
            g.add_dependency(&path("a"), &path("a")),
            Err(GraphError::Cycle { .. })
        ));
    }

    #[test]
    fn test_dependency_on_failed_project_is_skipped_immediately() {
        let g = graph(&["p1"]);
        assert!(g.try_get_next_project().is_some());
        g.mark_as_failed(&path("p1")).unwrap();
        assert!(g.is_finished());

        g.add(project("late"), BuildEnvironment::new()).unwrap();
        assert!(!g.is_finished());
        g.add_dependency(&path("late"), &path("p1")).unwrap();
        assert_eq!(g.status(&path("late")), Some(ProjectStatus::Skipped));
        assert!(g.is_finished());
    }

    #[test]
    fn test_concurrent_callers_never_receive_the_same_project() {
        let names: Vec<String> = (0..64).map(|i| format!("p{i}")).collect();
        let g = Arc::new(ProjectGraph::new());
        for name in &names {
            g.add(project(name), BuildEnvironment::new()).unwrap();
        }
        let cancel: CancellationToken = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let g = Arc::clone(&g);
                let cancel = Arc::clone(&cancel);
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(request) =
                        g.wait_for_next_project(&cancel, Duration::from_millis(5))
                    {
                        taken.push(request.project.name());
                        g.mark_as_success(&request.project.filename).unwrap();
                    }
                    taken
                })
            })
            .collect();

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(all, expected);
        assert!(g.is_finished());
    }

    #[test]
    fn test_wait_returns_none_when_cancelled() {
        let g = graph(&["a", "b"]);
        g.add_dependency(&path("b"), &path("a")).unwrap();
        let _in_flight = g.try_get_next_project();
        let cancel: CancellationToken = Arc::new(AtomicBool::new(true));
        assert!(g
            .wait_for_next_project(&cancel, Duration::from_millis(1))
            .is_none());
    }

    #[test]
    fn test_idle_waiter_wakes_when_dependency_succeeds() {
        let g = Arc::new(graph(&["lib", "app"]));
        g.add_dependency(&path("app"), &path("lib")).unwrap();
        assert_eq!(next_name(&g).as_deref(), Some("lib"));

        let waiter = {
            let g = Arc::clone(&g);
            thread::spawn(move || {
                let cancel: CancellationToken = Arc::new(AtomicBool::new(false));
                let started = Instant::now();
                let next = g.wait_for_next_project(&cancel, Duration::from_secs(60));
                (next.map(|r| r.project.name()), started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        g.mark_as_success(&path("lib")).unwrap();

        let (next, waited) = waiter.join().unwrap();
        assert_eq!(next.as_deref(), Some("app"));
        assert!(waited < Duration::from_secs(10), "woke after {waited:?}");
    }

    #[test]
    fn test_idle_waiter_wakes_when_graph_finishes() {
        let g = Arc::new(graph(&["lib", "app"]));
        g.add_dependency(&path("app"), &path("lib")).unwrap();
        let _in_flight = g.try_get_next_project();

        let waiter = {
            let g = Arc::clone(&g);
            thread::spawn(move || {
                let cancel: CancellationToken = Arc::new(AtomicBool::new(false));
                let started = Instant::now();
                let next = g.wait_for_next_project(&cancel, Duration::from_secs(60));
                (next.is_none(), started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        g.mark_as_failed(&path("lib")).unwrap();

        let (none, waited) = waiter.join().unwrap();
        assert!(none);
        assert!(g.is_finished());
        assert!(waited < Duration::from_secs(10), "woke after {waited:?}");
    }
}
