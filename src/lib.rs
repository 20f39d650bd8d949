//! # keel
//!
//! A multi-threaded build engine. Project files declare property groups, item
//! groups and targets; an expression language resolves their conditions and
//! values; projects are arranged into a dependency graph and drained by a pool
//! of worker threads that execute each project's targets.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag used to request cooperative cancellation of a running build.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
