// src/cli/handlers/mod.rs

// One module per `keel` command.

pub mod build;
pub mod cache;
pub mod commons;
pub mod graph;
pub mod targets;
