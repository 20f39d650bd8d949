// src/system/executor.rs

use crate::CancellationToken;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, Stdio};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    Spawn(String, #[source] std::io::Error),
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

/// A program with its already-split arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Splits a command line with POSIX shell quoting rules.
    pub fn parse(command_line: &str, cwd: impl Into<PathBuf>) -> Result<Self, ProcessError> {
        let trimmed = command_line.trim();
        let mut parts = shlex::split(trimmed)
            .ok_or_else(|| ProcessError::CommandParse(trimmed.to_string()))?
            .into_iter();
        let program = parts.next().ok_or(ProcessError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
            cwd: cwd.into(),
        })
    }

    /// The command rendered back as a single line, for logs.
    pub fn display_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shlex::try_join(words.iter().copied()).unwrap_or_else(|_| words.join(" "))
    }
}

/// Exit status and captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `command` to completion, capturing stdout and stderr.
///
/// The wait is a non-blocking loop so that setting `cancellation_token` kills
/// the child and returns [`ProcessError::Cancelled`].
pub fn run(
    command: &ProcessCommand,
    cancellation_token: &CancellationToken,
) -> Result<ProcessOutput, ProcessError> {
    if cancellation_token.load(Ordering::SeqCst) {
        return Err(ProcessError::Cancelled);
    }
    let line = command.display_line();
    let clean_cwd = dunce::simplified(&command.cwd).to_path_buf();
    log::debug!("Running '{}' in '{}'.", line, clean_cwd.display());

    let mut child = match spawn(&command.program, &command.args, &clean_cwd) {
        Ok(child) => child,
        // Built-ins such as `echo` only exist inside cmd.exe.
        Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
            log::debug!("Command '{}' not found. Retrying with cmd /C.", command.program);
            let mut args = vec!["/C".to_string(), command.program.clone()];
            args.extend(command.args.iter().cloned());
            spawn("cmd", &args, &clean_cwd).map_err(|e| ProcessError::Spawn(line.clone(), e))?
        }
        Err(e) => return Err(ProcessError::Spawn(line, e)),
    };

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code().unwrap_or(-1),
            Ok(None) => {
                if cancellation_token.load(Ordering::SeqCst) {
                    log::debug!(
                        "Cancellation requested, killing child process (PID: {})...",
                        child.id()
                    );
                    if let Err(e) = child.kill() {
                        log::warn!("Failed to kill child process {}: {}", child.id(), e);
                    }
                    child.wait().ok();
                    return Err(ProcessError::Cancelled);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(ProcessError::Spawn(line, e)),
        }
    };

    let output = ProcessOutput {
        exit_code,
        stdout: collect(stdout_reader),
        stderr: collect(stderr_reader),
    };
    log::debug!("'{}' exited with code {}.", line, output.exit_code);
    Ok(output)
}

/// Parses and runs a command line. See [`run`].
pub fn run_command_line(
    command_line: &str,
    cwd: &Path,
    cancellation_token: &CancellationToken,
) -> Result<ProcessOutput, ProcessError> {
    run(&ProcessCommand::parse(command_line, cwd)?, cancellation_token)
}

fn spawn(program: &str, args: &[String], cwd: &Path) -> std::io::Result<Child> {
    StdCommand::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}

// Pipes are read on their own threads; a child blocked on a full pipe would
// never exit.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut bytes) {
                log::warn!("Failed to read process output: {}", e);
            }
            String::from_utf8_lossy(&bytes).into_owned()
        })
    })
}

fn collect(reader: Option<thread::JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    fn token(cancelled: bool) -> CancellationToken {
        Arc::new(AtomicBool::new(cancelled))
    }

    #[test]
    fn test_parse_splits_with_shell_quoting() {
        let command = ProcessCommand::parse("  csc /out:'my app.exe' a.cs ", "/tmp").unwrap();
        assert_eq!(command.program, "csc");
        assert_eq!(command.args, vec!["/out:my app.exe", "a.cs"]);
        assert!(matches!(
            ProcessCommand::parse("   ", "/tmp"),
            Err(ProcessError::EmptyCommand)
        ));
        assert!(matches!(
            ProcessCommand::parse("echo 'open", "/tmp"),
            Err(ProcessError::CommandParse(_))
        ));
    }

    #[test]
    fn test_pre_cancelled_token_never_spawns() {
        let command = ProcessCommand::new("definitely-not-a-real-program", "/");
        assert!(matches!(run(&command, &token(true)), Err(ProcessError::Cancelled)));
    }

    #[test]
    fn test_missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let command = ProcessCommand::new("keel-no-such-program-xyz", dir.path());
        assert!(matches!(run(&command, &token(false)), Err(ProcessError::Spawn(..))));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_and_exit_code_are_captured() {
        let dir = tempfile::tempdir().unwrap();
        let output =
            run_command_line("sh -c 'echo hello; echo oops >&2; exit 3'", dir.path(), &token(false))
                .unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }
}
