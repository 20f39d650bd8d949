// src/core/mod.rs

//! # Core Build Engine
//!
//! Everything between a project file on disk and a finished build:
//!
//! - **Expressions**: `tokenizer`, `parser`, `ast` (nodes and the optimizer)
//!   and `evaluator`.
//! - **Projects**: `compiler` turns TOML into a `Project`, `cache` keeps the
//!   compiled form, `environment` and `project_evaluator` resolve properties
//!   and items, `paths` and `wildcards` deal with the filesystem side.
//! - **Builds**: `graph_loader` and `project_graph` order projects,
//!   `scheduler` drains the graph with worker threads, `task_executor` and
//!   `tasks` run targets.

pub mod ast;
pub mod cache;
pub mod compiler;
pub mod environment;
pub mod evaluator;
pub mod graph_display;
pub mod graph_loader;
pub mod parser;
pub mod paths;
pub mod project_evaluator;
pub mod project_graph;
pub mod scheduler;
pub mod task_executor;
pub mod tasks;
pub mod tokenizer;
pub mod wildcards;
