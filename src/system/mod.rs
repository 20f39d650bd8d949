//! # System Interaction Layer
//!
//! Boundaries between the build engine and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: spawns external processes, captures their output and kills
//!   them when a build is cancelled.
//! - **`filesystem`**: the `FileSystem` trait with a real and an in-memory
//!   implementation.
//! - **`logger`**: per-project build logs with error and warning counters.
//! - **`settings`**: loading (and first-run creation) of `settings.toml`.
//! - **`toolchain`**: the compiler abstraction used by the `Compile` task.

pub mod executor;
pub mod filesystem;
pub mod logger;
pub mod settings;
pub mod toolchain;
