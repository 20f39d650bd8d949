// src/system/toolchain.rs

//! The compiler seam. The `Compile` task only knows the [`Compiler`] trait;
//! [`ProcessCompiler`] is the default implementation that shells out to a
//! csc-style command-line compiler.

use crate::CancellationToken;
use crate::system::executor::{self, ProcessCommand, ProcessError};
use crate::system::settings::CompilerSettings;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompilerError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("Compiler exited with code {exit_code}.")]
    Failed { exit_code: i32, output: String },
}

/// Fully resolved inputs of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileRequest {
    pub sources: Vec<PathBuf>,
    pub references: Vec<PathBuf>,
    pub resources: Vec<PathBuf>,
    pub output_assembly: PathBuf,
    /// `exe`, `library`, `winexe`...; the compiler default when absent.
    pub target_type: Option<String>,
    pub define_constants: Vec<String>,
    pub additional_flags: Vec<String>,
    pub working_directory: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    pub exit_code: i32,
    /// Combined stdout and stderr.
    pub output: String,
}

pub trait Compiler: Send + Sync + Debug {
    /// Runs one compilation. A non-zero exit is [`CompilerError::Failed`].
    fn compile(
        &self,
        request: &CompileRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<CompileOutput, CompilerError>;
}

/// Invokes an external compiler executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCompiler {
    executable: String,
    default_flags: Vec<String>,
}

impl ProcessCompiler {
    pub fn new(settings: &CompilerSettings) -> Self {
        Self {
            executable: settings.executable.clone(),
            default_flags: settings.default_flags.clone(),
        }
    }

    /// The command that [`Compiler::compile`] runs for `request`.
    pub fn command_for(&self, request: &CompileRequest) -> ProcessCommand {
        let mut command = ProcessCommand::new(&self.executable, &request.working_directory);
        for flag in &self.default_flags {
            command = command.arg(flag);
        }
        if let Some(target_type) = &request.target_type {
            command = command.arg(format!("/target:{target_type}"));
        }
        command = command.arg(format!("/out:{}", request.output_assembly.display()));
        if !request.define_constants.is_empty() {
            command = command.arg(format!("/define:{}", request.define_constants.join(";")));
        }
        for reference in &request.references {
            command = command.arg(format!("/reference:{}", reference.display()));
        }
        for resource in &request.resources {
            command = command.arg(format!("/resource:{}", resource.display()));
        }
        for flag in &request.additional_flags {
            command = command.arg(flag);
        }
        for source in &request.sources {
            command = command.arg(source.display().to_string());
        }
        command
    }
}

impl Compiler for ProcessCompiler {
    fn compile(
        &self,
        request: &CompileRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<CompileOutput, CompilerError> {
        let command = self.command_for(request);
        let result = executor::run(&command, cancellation_token)?;
        let succeeded = result.success();
        let mut output = result.stdout;
        output.push_str(&result.stderr);
        if !succeeded {
            return Err(CompilerError::Failed {
                exit_code: result.exit_code,
                output,
            });
        }
        Ok(CompileOutput {
            exit_code: result.exit_code,
            output,
        })
    }
}
