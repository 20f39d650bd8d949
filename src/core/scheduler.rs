// src/core/scheduler.rs

//! # Worker Pool
//!
//! A fixed number of OS threads drain the [`ProjectGraph`]. Each worker takes
//! the next buildable project, hands it to the [`ProjectBuilder`] and reports
//! the outcome back to the graph. An error returned by the builder, or a panic
//! inside it, fails that project only; the worker keeps serving others.

use crate::CancellationToken;
use crate::core::project_graph::{BuildRequest, ProjectGraph, ProjectStatus};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Could not start worker thread {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    Failed,
}

/// Builds one project. Implementations must be shareable across workers.
pub trait ProjectBuilder: Send + Sync {
    fn build(&self, request: BuildRequest) -> anyhow::Result<BuildOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Number of worker threads (at least one is started).
    pub max_parallelism: usize,
    /// Longest time an idle worker waits before re-checking cancellation.
    pub poll_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_parallelism: 1,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Final state of every project once the workers have stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// Projects never started because the build was cancelled.
    pub not_started: Vec<PathBuf>,
    pub cancelled: bool,
}

impl BuildSummary {
    fn collect(graph: &ProjectGraph, cancelled: bool) -> Self {
        let mut not_started = graph.projects_with_status(ProjectStatus::Todo);
        not_started.extend(graph.projects_with_status(ProjectStatus::InFlight));
        Self {
            succeeded: graph.projects_with_status(ProjectStatus::Succeeded),
            failed: graph.projects_with_status(ProjectStatus::Failed),
            skipped: graph.projects_with_status(ProjectStatus::Skipped),
            not_started,
            cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self.failed.is_empty()
            && self.skipped.is_empty()
            && self.not_started.is_empty()
    }
}

/// A running pool of build workers.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<ProjectGraph>,
    workers: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Scheduler {
    /// Spawns the workers. They start taking projects immediately.
    pub fn start(
        graph: Arc<ProjectGraph>,
        builder: Arc<dyn ProjectBuilder>,
        options: SchedulerOptions,
        cancellation_token: CancellationToken,
    ) -> Result<Self, SchedulerError> {
        let count = options.max_parallelism.max(1);
        log::debug!("Starting {} build worker(s).", count);
        let mut scheduler = Self {
            graph,
            workers: Vec::with_capacity(count),
            cancellation_token,
        };
        for index in 0..count {
            let graph = Arc::clone(&scheduler.graph);
            let builder = Arc::clone(&builder);
            let cancel = Arc::clone(&scheduler.cancellation_token);
            let poll_interval = options.poll_interval;
            let spawned = thread::Builder::new()
                .name(format!("keel-worker-{index}"))
                .spawn(move || worker_loop(&graph, builder.as_ref(), &cancel, poll_interval));
            match spawned {
                Ok(handle) => scheduler.workers.push(handle),
                Err(source) => {
                    // Workers already running must not outlive the failed start.
                    scheduler.cancellation_token.store(true, Ordering::SeqCst);
                    scheduler.join_workers();
                    return Err(SchedulerError::Spawn { index, source });
                }
            }
        }
        Ok(scheduler)
    }

    /// Starts the workers and waits for the graph to drain.
    pub fn run(
        graph: Arc<ProjectGraph>,
        builder: Arc<dyn ProjectBuilder>,
        options: SchedulerOptions,
        cancellation_token: CancellationToken,
    ) -> Result<BuildSummary, SchedulerError> {
        Ok(Self::start(graph, builder, options, cancellation_token)?.wait())
    }

    /// Waits until every worker has returned, which happens when the graph
    /// is finished or the build is cancelled.
    pub fn wait(mut self) -> BuildSummary {
        self.join_workers();
        let cancelled = self.cancellation_token.load(Ordering::SeqCst);
        BuildSummary::collect(&self.graph, cancelled)
    }

    /// Requests cancellation and joins all workers before returning.
    pub fn stop(self) -> BuildSummary {
        self.cancellation_token.store(true, Ordering::SeqCst);
        self.wait()
    }

    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                log::error!("Build worker '{}' terminated abnormally.", name);
            }
        }
    }
}

fn worker_loop(
    graph: &ProjectGraph,
    builder: &dyn ProjectBuilder,
    cancel: &CancellationToken,
    poll_interval: Duration,
) {
    while let Some(request) = graph.wait_for_next_project(cancel, poll_interval) {
        let path = request.project.filename.clone();
        log::debug!("Worker picked up '{}'.", path.display());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| builder.build(request)));
        let succeeded = match outcome {
            Ok(Ok(BuildOutcome::Succeeded)) => true,
            Ok(Ok(BuildOutcome::Failed)) => false,
            Ok(Err(e)) => {
                log::error!("Building '{}' failed unexpectedly: {:#}", path.display(), e);
                false
            }
            Err(_) => {
                log::error!("Building '{}' panicked.", path.display());
                false
            }
        };
        report(graph, &path, succeeded);
    }
    log::trace!("Worker exiting.");
}

fn report(graph: &ProjectGraph, path: &Path, succeeded: bool) {
    let result = if succeeded {
        graph.mark_as_success(path)
    } else {
        graph.mark_as_failed(path)
    };
    if let Err(e) = result {
        log::error!("Could not record the result of '{}': {}", path.display(), e);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::core::environment::BuildEnvironment;
    use crate::models::Project;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Instant;

    fn path(name: &str) -> PathBuf {
        PathBuf::from(format!("/src/{name}.keel.toml"))
    }

    fn graph(names: &[&str], edges: &[(&str, &str)]) -> Arc<ProjectGraph> {
        let graph = ProjectGraph::new();
        for name in names {
            let project = Project {
                filename: path(name),
                default_targets: None,
                property_groups: vec![],
                item_groups: vec![],
                targets: vec![],
            };
            graph.add(Arc::new(project), BuildEnvironment::new()).unwrap();
        }
        for (from, to) in edges {
            graph.add_dependency(&path(from), &path(to)).unwrap();
        }
        Arc::new(graph)
    }

    fn options(workers: usize) -> SchedulerOptions {
        SchedulerOptions {
            max_parallelism: workers,
            poll_interval: Duration::from_millis(5),
        }
    }

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    /// Records build order; fails or panics on the named projects.
    #[derive(Default)]
    struct ScriptedBuilder {
        order: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
        panic_on: Vec<&'static str>,
        error_on: Vec<&'static str>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ProjectBuilder for ScriptedBuilder {
        fn build(&self, request: BuildRequest) -> anyhow::Result<BuildOutcome> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            let name = request.project.name();
            self.order.lock().unwrap().push(name.clone());
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on.contains(&name.as_str()) {
                panic!("builder exploded on {name}");
            }
            if self.error_on.contains(&name.as_str()) {
                anyhow::bail!("no such file");
            }
            if self.fail.contains(&name.as_str()) {
                return Ok(BuildOutcome::Failed);
            }
            Ok(BuildOutcome::Succeeded)
        }
    }

    #[test]
    fn test_chain_builds_in_dependency_order() {
        let g = graph(&["app", "lib", "core"], &[("app", "lib"), ("lib", "core")]);
        let builder = Arc::new(ScriptedBuilder::default());
        let summary = Scheduler::run(g, builder.clone(), options(4), token()).unwrap();
        assert!(summary.is_success());
        assert_eq!(*builder.order.lock().unwrap(), vec!["core", "lib", "app"]);
    }

    #[test]
    fn test_idle_workers_wake_without_polling() {
        let g = graph(&["app", "lib", "core"], &[("app", "lib"), ("lib", "core")]);
        let builder = Arc::new(ScriptedBuilder::default());
        let slow_poll = SchedulerOptions {
            max_parallelism: 3,
            poll_interval: Duration::from_secs(60),
        };
        let started = Instant::now();
        let summary = Scheduler::run(g, builder.clone(), slow_poll, token()).unwrap();
        assert!(summary.is_success());
        assert_eq!(*builder.order.lock().unwrap(), vec!["core", "lib", "app"]);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_failure_skips_dependents_and_other_projects_still_build() {
        let g = graph(
            &["core", "lib", "app", "tool"],
            &[("lib", "core"), ("app", "lib")],
        );
        let builder = Arc::new(ScriptedBuilder {
            fail: vec!["core"],
            ..ScriptedBuilder::default()
        });
        let summary = Scheduler::run(g.clone(), builder.clone(), options(2), token()).unwrap();
        assert_eq!(summary.failed, vec![path("core")]);
        assert_eq!(summary.skipped, vec![path("lib"), path("app")]);
        assert_eq!(summary.succeeded, vec![path("tool")]);
        assert!(!summary.is_success());
        assert!(g.is_finished());
        assert!(!builder.order.lock().unwrap().contains(&"lib".to_string()));
    }

    #[test]
    fn test_panics_and_errors_fail_only_their_project() {
        let g = graph(&["boom", "oops", "fine"], &[]);
        let builder = Arc::new(ScriptedBuilder {
            panic_on: vec!["boom"],
            error_on: vec!["oops"],
            ..ScriptedBuilder::default()
        });
        let summary = Scheduler::run(g, builder, options(1), token()).unwrap();
        assert_eq!(summary.failed, vec![path("boom"), path("oops")]);
        assert_eq!(summary.succeeded, vec![path("fine")]);
    }

    #[test]
    fn test_parallelism_is_bounded() {
        let names: Vec<String> = (0..12).map(|i| format!("p{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let g = graph(&refs, &[]);
        let builder = Arc::new(ScriptedBuilder::default());
        let summary = Scheduler::run(g, builder.clone(), options(3), token()).unwrap();
        assert_eq!(summary.succeeded.len(), 12);
        assert!(builder.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_stop_joins_workers_and_reports_cancellation() {
        let g = graph(&["a", "b"], &[("b", "a")]);
        let in_flight = g.try_get_next_project();
        assert!(in_flight.is_some());
        let builder = Arc::new(ScriptedBuilder::default());
        let scheduler = Scheduler::start(g, builder, options(2), token()).unwrap();
        let summary = scheduler.stop();
        assert!(summary.cancelled);
        assert_eq!(summary.not_started, vec![path("b"), path("a")]);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_empty_graph_returns_immediately() {
        let summary = Scheduler::run(
            Arc::new(ProjectGraph::new()),
            Arc::new(ScriptedBuilder::default()),
            options(2),
            token(),
        )
        .unwrap();
        assert!(summary.is_success());
    }
}
