// src/core/task_executor.rs

//! # Task Engine
//!
//! Builds the requested targets of one project. Targets are processed from a
//! pending stack: a target whose dependencies have not run yet pushes the first
//! missing one on top of itself, which yields depth-first, dependency-first
//! ordering. Each target runs at most once per build.
//!
//! The first task that reports an error stops the whole project build. A
//! target only counts as executed if it ran to completion or was skipped by
//! its condition or by being up to date.

use crate::core::{
    ast::Expression,
    environment::BuildEnvironment,
    evaluator::{EvaluationError, Evaluator},
    parser::{self, ParseError},
    paths,
    tasks::{self, BuildServices, TaskContext, TaskError},
};
use crate::models::{Importance, Project, Target};
use crate::system::logger::ProjectLogger;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Target '{target}' failed.")]
    Failed { target: String },
    #[error("Target '{target}' depends on itself through '{through}'.")]
    CircularDependency { target: String, through: String },
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("Invalid target list '{text}': {source}")]
    TargetList { text: String, source: ParseError },
    #[error("Build was cancelled.")]
    Cancelled,
}

/// How a target left the pending stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetOutcome {
    Ran,
    ConditionFalse,
    UpToDate,
}

/// Runs targets of one project against its exclusively owned environment.
#[derive(Debug)]
pub struct TaskEngine<'a> {
    project: &'a Project,
    env: &'a mut BuildEnvironment,
    services: &'a BuildServices,
    logger: &'a ProjectLogger,
    executed: HashSet<usize>,
    /// Executed targets in completion order.
    executed_order: Vec<usize>,
    dependency_cache: HashMap<usize, Vec<usize>>,
}

impl<'a> TaskEngine<'a> {
    pub fn new(
        project: &'a Project,
        env: &'a mut BuildEnvironment,
        services: &'a BuildServices,
        logger: &'a ProjectLogger,
    ) -> Self {
        Self {
            project,
            env,
            services,
            logger,
            executed: HashSet::new(),
            executed_order: Vec::new(),
            dependency_cache: HashMap::new(),
        }
    }

    /// Names of the targets that completed, in order.
    pub fn executed_targets(&self) -> Vec<&str> {
        self.executed_order
            .iter()
            .filter_map(|&i| self.project.targets.get(i))
            .map(|t| t.name.as_str())
            .collect()
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(
            &*self.env,
            self.services.fs.as_ref(),
            self.project.directory(),
        )
    }

    fn target(&self, index: usize) -> Option<&'a Target> {
        self.project.targets.get(index)
    }

    fn target_name(&self, index: usize) -> String {
        self.target(index)
            .map(|t| t.name.clone())
            .unwrap_or_default()
    }

    /// Logs an evaluation failure through the build log and returns it.
    fn evaluation_failed(&self, target: &Target, error: EvaluationError) -> ExecutionError {
        self.logger
            .error(format!("{}: {}", target.name, error));
        ExecutionError::Evaluation(error)
    }

    // --- Target resolution ---

    /// Builds `requested`, or the project's default targets when empty.
    pub fn build(&mut self, requested: &[String]) -> Result<(), ExecutionError> {
        let names = self.requested_names(requested)?;
        let mut pending: Vec<usize> = Vec::with_capacity(names.len());
        for name in names.iter().rev() {
            match self.project.target_index(name) {
                Some(index) => pending.push(index),
                None => self.logger.warning(format!(
                    "Target '{}' does not exist in project '{}'.",
                    name,
                    self.project.name()
                )),
            }
        }
        self.run_pending(pending)
    }

    fn requested_names(&self, requested: &[String]) -> Result<Vec<String>, ExecutionError> {
        if !requested.is_empty() {
            let evaluator = self.evaluator();
            let mut names = Vec::new();
            for text in requested {
                let expression = parser::parse_value(text).map_err(|source| {
                    self.logger.error(format!("Invalid target list '{text}': {source}"));
                    ExecutionError::TargetList {
                        text: text.clone(),
                        source,
                    }
                })?;
                let evaluated = evaluator.evaluate_list(&expression).map_err(|e| {
                    self.logger.error(format!("Target list '{text}': {e}"));
                    ExecutionError::Evaluation(e)
                })?;
                names.extend(evaluated);
            }
            return Ok(names);
        }
        if let Some(defaults) = &self.project.default_targets {
            let names = self.evaluator().evaluate_list(defaults).map_err(|e| {
                self.logger.error(format!("default_targets: {e}"));
                ExecutionError::Evaluation(e)
            })?;
            if !names.is_empty() {
                return Ok(names);
            }
        }
        Ok(match self.project.targets.first() {
            Some(first) => vec![first.name.clone()],
            None => {
                log::debug!(
                    "Project '{}' declares no targets; nothing to build.",
                    self.project.name()
                );
                Vec::new()
            }
        })
    }

    /// Dependencies of a target, resolved once per build. Unknown names are
    /// reported as warnings the first time they are seen.
    fn dependencies(&mut self, index: usize) -> Result<Vec<usize>, ExecutionError> {
        if let Some(cached) = self.dependency_cache.get(&index) {
            return Ok(cached.clone());
        }
        let Some(target) = self.target(index) else {
            return Ok(Vec::new());
        };
        let names = match &target.depends_on_targets {
            Some(expression) => self
                .evaluator()
                .evaluate_list(expression)
                .map_err(|e| self.evaluation_failed(target, e))?,
            None => Vec::new(),
        };
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            match self.project.target_index(&name) {
                Some(dependency) => resolved.push(dependency),
                None => self.logger.warning(format!(
                    "Target '{}' depends on '{}', which does not exist.",
                    target.name, name
                )),
            }
        }
        self.dependency_cache.insert(index, resolved.clone());
        Ok(resolved)
    }

    fn run_pending(&mut self, mut pending: Vec<usize>) -> Result<(), ExecutionError> {
        // Targets whose dependencies are currently being brought up to date.
        let mut expanding: HashSet<usize> = HashSet::new();

        while let Some(&top) = pending.last() {
            if self.executed.contains(&top) {
                pending.pop();
                expanding.remove(&top);
                continue;
            }

            let dependencies = self.dependencies(top)?;
            let missing = dependencies
                .into_iter()
                .find(|d| !self.executed.contains(d));
            if let Some(dependency) = missing {
                if dependency == top || expanding.contains(&dependency) {
                    let error = ExecutionError::CircularDependency {
                        target: self.target_name(dependency),
                        through: self.target_name(top),
                    };
                    self.logger.error(error.to_string());
                    return Err(error);
                }
                expanding.insert(top);
                pending.push(dependency);
                continue;
            }

            pending.pop();
            expanding.remove(&top);
            let outcome = self.execute_target(top)?;
            log::trace!("Target '{}' finished: {:?}.", self.target_name(top), outcome);
            self.executed.insert(top);
            self.executed_order.push(top);
        }
        Ok(())
    }

    // --- Target execution ---

    fn execute_target(&mut self, index: usize) -> Result<TargetOutcome, ExecutionError> {
        let Some(target) = self.target(index) else {
            return Ok(TargetOutcome::ConditionFalse);
        };

        let enabled = self
            .evaluator()
            .evaluate_optional_condition(target.condition.as_ref())
            .map_err(|e| self.evaluation_failed(target, e))?;
        if !enabled {
            let condition = target
                .condition
                .as_ref()
                .map(Expression::to_string)
                .unwrap_or_default();
            self.logger.message(
                Importance::Low,
                format!(
                    "Target '{}' skipped: condition \"{}\" was false.",
                    target.name, condition
                ),
            );
            return Ok(TargetOutcome::ConditionFalse);
        }

        if self.is_up_to_date(target)? {
            self.logger.message(
                Importance::Low,
                format!(
                    "Skipping target '{}' because all output files are up-to-date with respect to the input files.",
                    target.name
                ),
            );
            return Ok(TargetOutcome::UpToDate);
        }

        self.logger
            .message(Importance::Normal, format!("{}:", target.name));

        for task in &target.tasks {
            if self.services.cancellation_token.load(Ordering::SeqCst) {
                return Err(ExecutionError::Cancelled);
            }
            let enabled = self
                .evaluator()
                .evaluate_optional_condition(task.condition.as_ref())
                .map_err(|e| self.evaluation_failed(target, e))?;
            if !enabled {
                log::trace!("Task '{}' in '{}' skipped by its condition.", task.kind.name(), target.name);
                continue;
            }

            let errors_before = self.logger.error_count();
            let mut ctx = TaskContext {
                project: self.project,
                env: &mut *self.env,
                services: self.services,
                logger: self.logger,
            };
            match tasks::execute_task(&task.kind, &mut ctx) {
                Ok(()) => {}
                Err(TaskError::Cancelled) => return Err(ExecutionError::Cancelled),
                Err(e) => self.logger.error(format!("{}: {}", task.kind.name(), e)),
            }
            if self.logger.error_count() > errors_before {
                return Err(ExecutionError::Failed {
                    target: target.name.clone(),
                });
            }
        }
        Ok(TargetOutcome::Ran)
    }

    /// A target with inputs and outputs is up to date when every output
    /// exists and none is older than the newest input.
    fn is_up_to_date(&self, target: &Target) -> Result<bool, ExecutionError> {
        let (Some(inputs), Some(outputs)) = (&target.inputs, &target.outputs) else {
            return Ok(false);
        };
        let evaluator = self.evaluator();
        let inputs = evaluator
            .evaluate_list(inputs)
            .map_err(|e| self.evaluation_failed(target, e))?;
        let outputs = evaluator
            .evaluate_list(outputs)
            .map_err(|e| self.evaluation_failed(target, e))?;
        if inputs.is_empty() || outputs.is_empty() {
            return Ok(false);
        }

        let fs = self.services.fs.as_ref();
        let base_dir = self.project.directory();
        let times = |files: &[String]| -> Option<Vec<SystemTime>> {
            files
                .iter()
                .map(|f| fs.modified(&paths::absolutize(base_dir, f)).ok())
                .collect()
        };
        let (Some(input_times), Some(output_times)) = (times(&inputs), times(&outputs)) else {
            return Ok(false);
        };
        let newest_input = input_times.into_iter().max();
        let oldest_output = output_times.into_iter().min();
        Ok(match (newest_input, oldest_output) {
            (Some(input), Some(output)) => output >= input,
            _ => false,
        })
    }
}
