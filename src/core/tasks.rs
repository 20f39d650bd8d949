// src/core/tasks.rs

//! # Built-in Tasks
//!
//! The dispatch table from [`TaskKind`] to its implementation. Every task reads
//! its parameters through the evaluator, acts through the build services and
//! reports through the project logger. A returned [`TaskError`] is turned
//! into a logged error by the task engine.

use crate::CancellationToken;
use crate::constants::{
    META_EXTENSION, META_FILENAME, META_HINT_PATH, OUTPUT_ASSEMBLY, OUTPUT_COPIED_FILES,
    OUTPUT_DELETED_FILES, OUTPUT_EXIT_CODE, OUTPUT_RESOLVED_FILES,
};
use crate::core::{
    ast::Expression,
    environment::BuildEnvironment,
    evaluator::{EvaluationError, Evaluator, metadata_value, split_list},
    paths, project_evaluator,
};
use crate::models::{Importance, ItemDefinition, Project, ProjectItem, Property, TaskKind};
use crate::system::{
    executor::{self, ProcessError},
    filesystem::FileSystem,
    logger::ProjectLogger,
    toolchain::{CompileRequest, Compiler, CompilerError},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Prefix of every line a task writes, so output nests under the target header.
const TASK_INDENT: &str = "  ";

#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("{action} '{path}' failed: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid parameters: {message}")]
    InvalidParameters { task: &'static str, message: String },
    #[error(
        "{sources} source file(s) but {destinations} destination file(s); the lists must have the same length."
    )]
    CopyLengthMismatch { sources: usize, destinations: usize },
    #[error("Command '{command}' exited with code {exit_code}.")]
    ExitCode { command: String, exit_code: i32 },
    #[error(transparent)]
    Process(ProcessError),
    #[error(transparent)]
    Compiler(CompilerError),
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

impl From<ProcessError> for TaskError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Cancelled => Self::Cancelled,
            other => Self::Process(other),
        }
    }
}

impl From<CompilerError> for TaskError {
    fn from(e: CompilerError) -> Self {
        match e {
            CompilerError::Process(ProcessError::Cancelled) => Self::Cancelled,
            other => Self::Compiler(other),
        }
    }
}

/// Collaborators shared by every task of a build.
#[derive(Debug, Clone)]
pub struct BuildServices {
    pub fs: Arc<dyn FileSystem>,
    pub compiler: Arc<dyn Compiler>,
    pub cancellation_token: CancellationToken,
}

/// Everything a running task may read or change.
#[derive(Debug)]
pub struct TaskContext<'a> {
    pub project: &'a Project,
    pub env: &'a mut BuildEnvironment,
    pub services: &'a BuildServices,
    pub logger: &'a ProjectLogger,
}

impl TaskContext<'_> {
    fn base_dir(&self) -> &Path {
        self.project.directory()
    }

    fn fs(&self) -> &dyn FileSystem {
        self.services.fs.as_ref()
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&*self.env, self.services.fs.as_ref(), self.project.directory())
    }

    fn optional_string(&self, expression: Option<&Expression>) -> Result<Option<String>, TaskError> {
        match expression {
            Some(e) => {
                let value = self.evaluator().evaluate_string(e)?;
                Ok(Some(value).filter(|v| !v.trim().is_empty()))
            }
            None => Ok(None),
        }
    }

    fn optional_list(&self, expression: Option<&Expression>) -> Result<Vec<String>, TaskError> {
        match expression {
            Some(e) => Ok(self.evaluator().evaluate_list(e)?),
            None => Ok(Vec::new()),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        paths::absolutize(self.base_dir(), path)
    }

    fn log(&self, importance: Importance, text: &str) {
        self.logger.lines(importance, TASK_INDENT, text);
    }
}

// --- Dispatch ---

/// Runs one task. The caller has already checked the task's condition.
pub fn execute_task(kind: &TaskKind, ctx: &mut TaskContext<'_>) -> Result<(), TaskError> {
    log::trace!("Executing task '{}'.", kind.name());
    match kind {
        TaskKind::Message { text, importance } => {
            let text = ctx.evaluator().evaluate_string(text)?;
            ctx.log(*importance, &text);
            Ok(())
        }
        TaskKind::Error { text } => {
            let text = ctx.evaluator().evaluate_string(text)?;
            ctx.logger.error(text);
            Ok(())
        }
        TaskKind::Warning { text } => {
            let text = ctx.evaluator().evaluate_string(text)?;
            ctx.logger.warning(text);
            Ok(())
        }
        TaskKind::PropertyGroup(properties) => property_group(ctx, properties),
        TaskKind::ItemGroup(items) => item_group(ctx, items),
        TaskKind::Copy {
            source_files,
            destination_files,
            destination_folder,
            skip_unchanged_files,
        } => copy(
            ctx,
            source_files,
            destination_files.as_ref(),
            destination_folder.as_ref(),
            *skip_unchanged_files,
        ),
        TaskKind::Delete { files } => delete(ctx, files),
        TaskKind::Exec {
            command,
            working_directory,
            ignore_exit_code,
        } => exec(ctx, command, working_directory.as_ref(), *ignore_exit_code),
        TaskKind::Compile {
            sources,
            references,
            resources,
            output_assembly,
            target_type,
            define_constants,
            additional_flags,
        } => compile(
            ctx,
            CompileParameters {
                sources,
                references: references.as_ref(),
                resources: resources.as_ref(),
                output_assembly,
                target_type: target_type.as_ref(),
                define_constants: define_constants.as_ref(),
                additional_flags: additional_flags.as_ref(),
            },
        ),
        TaskKind::ResolveReferences {
            references,
            search_paths,
            output_item,
        } => resolve_references(ctx, references, search_paths.as_ref(), output_item),
        TaskKind::Output {
            task_parameter,
            property_name,
            item_name,
        } => output(ctx, task_parameter, property_name.as_deref(), item_name.as_deref()),
    }
}

// --- Environment tasks ---

fn property_group(ctx: &mut TaskContext<'_>, properties: &[Property]) -> Result<(), TaskError> {
    let project = ctx.project;
    let fs = Arc::clone(&ctx.services.fs);
    project_evaluator::apply_properties(ctx.env, properties, fs.as_ref(), project.directory())?;
    Ok(())
}

fn item_group(ctx: &mut TaskContext<'_>, items: &[ItemDefinition]) -> Result<(), TaskError> {
    let project = ctx.project;
    let fs = Arc::clone(&ctx.services.fs);
    project_evaluator::apply_item_definitions(ctx.env, items, fs.as_ref(), project.directory())?;
    Ok(())
}

fn output(
    ctx: &mut TaskContext<'_>,
    task_parameter: &str,
    property_name: Option<&str>,
    item_name: Option<&str>,
) -> Result<(), TaskError> {
    if property_name.is_none() && item_name.is_none() {
        return Err(TaskError::InvalidParameters {
            task: "Output",
            message: format!(
                "'{task_parameter}' needs a property_name or an item_name to write to."
            ),
        });
    }
    let value = match ctx.env.output(task_parameter) {
        Some(value) => value.to_string(),
        None => {
            log::debug!("Output '{}' was never set; using ''.", task_parameter);
            String::new()
        }
    };
    if let Some(name) = property_name {
        ctx.env.set_property(name, value.clone());
    }
    if let Some(item_type) = item_name {
        for include in split_list(&value) {
            ctx.env.add_item(ProjectItem::new(item_type, include));
        }
    }
    Ok(())
}

// --- File tasks ---

fn copy(
    ctx: &mut TaskContext<'_>,
    source_files: &Expression,
    destination_files: Option<&Expression>,
    destination_folder: Option<&Expression>,
    skip_unchanged_files: bool,
) -> Result<(), TaskError> {
    let sources = ctx.evaluator().evaluate_items(source_files, "SourceFiles")?;
    let destinations: Vec<PathBuf> = match (destination_files, destination_folder) {
        (Some(files), None) => ctx
            .evaluator()
            .evaluate_list(files)?
            .iter()
            .map(|f| ctx.full_path(f))
            .collect(),
        (None, Some(folder)) => {
            let folder = ctx.full_path(&ctx.evaluator().evaluate_string(folder)?);
            sources
                .iter()
                .map(|item| {
                    let base_dir = ctx.base_dir();
                    let file_name = format!(
                        "{}{}",
                        metadata_value(item, META_FILENAME, base_dir),
                        metadata_value(item, META_EXTENSION, base_dir)
                    );
                    folder.join(file_name)
                })
                .collect()
        }
        _ => {
            return Err(TaskError::InvalidParameters {
                task: "Copy",
                message: "exactly one of destination_files and destination_folder must be set."
                    .to_string(),
            });
        }
    };

    if sources.len() != destinations.len() {
        return Err(TaskError::CopyLengthMismatch {
            sources: sources.len(),
            destinations: destinations.len(),
        });
    }

    let mut copied = Vec::new();
    for (source, destination) in sources.iter().zip(&destinations) {
        let from = ctx.full_path(&source.include);
        if skip_unchanged_files && is_unchanged(ctx.fs(), &from, destination) {
            ctx.log(
                Importance::Low,
                &format!(
                    "Skipping unchanged file '{}' -> '{}'.",
                    from.display(),
                    destination.display()
                ),
            );
            continue;
        }
        ctx.log(
            Importance::Normal,
            &format!(
                "Copying file from '{}' to '{}'.",
                from.display(),
                destination.display()
            ),
        );
        ctx.fs()
            .copy(&from, destination)
            .map_err(|source| TaskError::Io {
                action: "Copying",
                path: from.clone(),
                source,
            })?;
        copied.push(destination.display().to_string());
    }
    ctx.env.set_output(OUTPUT_COPIED_FILES, copied.join(";"));
    Ok(())
}

/// The destination exists and is not older than the source.
fn is_unchanged(fs: &dyn FileSystem, from: &Path, to: &Path) -> bool {
    match (fs.modified(from), fs.modified(to)) {
        (Ok(source_time), Ok(destination_time)) => destination_time >= source_time,
        _ => false,
    }
}

fn delete(ctx: &mut TaskContext<'_>, files: &Expression) -> Result<(), TaskError> {
    let files = ctx.evaluator().evaluate_list(files)?;
    let mut deleted = Vec::new();
    for file in files {
        let path = ctx.full_path(&file);
        if !ctx.fs().is_file(&path) {
            log::debug!("Nothing to delete at '{}'.", path.display());
            continue;
        }
        ctx.log(Importance::Low, &format!("Deleting file '{}'.", path.display()));
        ctx.fs().delete(&path).map_err(|source| TaskError::Io {
            action: "Deleting",
            path: path.clone(),
            source,
        })?;
        deleted.push(path.display().to_string());
    }
    ctx.env.set_output(OUTPUT_DELETED_FILES, deleted.join(";"));
    Ok(())
}

// --- Process tasks ---

fn exec(
    ctx: &mut TaskContext<'_>,
    command: &Expression,
    working_directory: Option<&Expression>,
    ignore_exit_code: bool,
) -> Result<(), TaskError> {
    let command = ctx.evaluator().evaluate_string(command)?;
    let cwd = match ctx.optional_string(working_directory)? {
        Some(dir) => ctx.full_path(&dir),
        None => ctx.base_dir().to_path_buf(),
    };
    ctx.log(Importance::Normal, &command);

    let result =
        executor::run_command_line(&command, &cwd, &ctx.services.cancellation_token)?;
    ctx.log(Importance::Normal, &result.stdout);
    ctx.log(Importance::Normal, &result.stderr);
    ctx.env
        .set_output(OUTPUT_EXIT_CODE, result.exit_code.to_string());

    if !result.success() {
        if ignore_exit_code {
            ctx.log(
                Importance::Low,
                &format!("Exit code {} ignored.", result.exit_code),
            );
        } else {
            return Err(TaskError::ExitCode {
                command,
                exit_code: result.exit_code,
            });
        }
    }
    Ok(())
}

struct CompileParameters<'a> {
    sources: &'a Expression,
    references: Option<&'a Expression>,
    resources: Option<&'a Expression>,
    output_assembly: &'a Expression,
    target_type: Option<&'a Expression>,
    define_constants: Option<&'a Expression>,
    additional_flags: Option<&'a Expression>,
}

fn compile(ctx: &mut TaskContext<'_>, params: CompileParameters<'_>) -> Result<(), TaskError> {
    let evaluator = ctx.evaluator();
    let to_paths = |list: Vec<String>| list.iter().map(|p| ctx.full_path(p)).collect::<Vec<_>>();

    let sources = to_paths(evaluator.evaluate_list(params.sources)?);
    if sources.is_empty() {
        return Err(TaskError::InvalidParameters {
            task: "Compile",
            message: "no source files to compile.".to_string(),
        });
    }
    let output_assembly = evaluator.evaluate_string(params.output_assembly)?;
    if output_assembly.trim().is_empty() {
        return Err(TaskError::InvalidParameters {
            task: "Compile",
            message: "output_assembly is empty.".to_string(),
        });
    }
    let flags = ctx.optional_string(params.additional_flags)?.unwrap_or_default();
    let additional_flags = shlex::split(&flags).ok_or_else(|| TaskError::InvalidParameters {
        task: "Compile",
        message: format!("could not parse additional_flags '{flags}'."),
    })?;

    let request = CompileRequest {
        sources,
        references: to_paths(ctx.optional_list(params.references)?),
        resources: to_paths(ctx.optional_list(params.resources)?),
        output_assembly: ctx.full_path(&output_assembly),
        target_type: ctx.optional_string(params.target_type)?,
        define_constants: ctx.optional_list(params.define_constants)?,
        additional_flags,
        working_directory: ctx.base_dir().to_path_buf(),
    };

    ctx.log(
        Importance::Normal,
        &format!(
            "Compiling {} file(s) into '{}'.",
            request.sources.len(),
            request.output_assembly.display()
        ),
    );
    let result = ctx
        .services
        .compiler
        .compile(&request, &ctx.services.cancellation_token);
    match result {
        Ok(output) => {
            ctx.log(Importance::Normal, &output.output);
            ctx.env.set_output(
                OUTPUT_ASSEMBLY,
                request.output_assembly.display().to_string(),
            );
            Ok(())
        }
        Err(CompilerError::Failed { exit_code, output }) => {
            ctx.log(Importance::High, &output);
            Err(TaskError::Compiler(CompilerError::Failed { exit_code, output }))
        }
        Err(e) => Err(e.into()),
    }
}

// --- Reference resolution ---

fn resolve_references(
    ctx: &mut TaskContext<'_>,
    references: &Expression,
    search_paths: Option<&Expression>,
    output_item: &str,
) -> Result<(), TaskError> {
    let references = ctx.evaluator().evaluate_items(references, "Reference")?;
    let search_dirs: Vec<PathBuf> = ctx
        .optional_list(search_paths)?
        .iter()
        .map(|dir| ctx.full_path(dir))
        .collect();

    let mut resolved_items = Vec::new();
    for reference in &references {
        match resolve_reference(ctx, reference, &search_dirs) {
            Some(path) => {
                ctx.log(
                    Importance::Low,
                    &format!("Resolved '{}' to '{}'.", reference.include, path.display()),
                );
                let mut item = ProjectItem::new(output_item, path.display().to_string());
                item.metadata = reference.metadata.clone();
                resolved_items.push(item);
            }
            None => ctx.logger.warning(format!(
                "Could not resolve reference '{}'.",
                reference.include
            )),
        }
    }

    let resolved: Vec<String> = resolved_items.iter().map(|i| i.include.clone()).collect();
    for item in resolved_items {
        ctx.env.add_item(item);
    }
    ctx.env.set_output(OUTPUT_RESOLVED_FILES, resolved.join(";"));
    Ok(())
}

/// `HintPath` wins; otherwise the include itself, then each search directory
/// with the include as-is or with `.dll`/`.exe` appended.
fn resolve_reference(
    ctx: &TaskContext<'_>,
    reference: &ProjectItem,
    search_dirs: &[PathBuf],
) -> Option<PathBuf> {
    let fs = ctx.fs();
    let hint = metadata_value(reference, META_HINT_PATH, ctx.base_dir());
    if !hint.trim().is_empty() {
        let path = ctx.full_path(hint.trim());
        return fs.is_file(&path).then_some(path);
    }

    let include = reference.include.as_str();
    let has_binary_extension = Path::new(include)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("dll") || e.eq_ignore_ascii_case("exe"));
    let file_names: Vec<String> = if has_binary_extension {
        vec![include.to_string()]
    } else {
        vec![format!("{include}.dll"), format!("{include}.exe")]
    };

    let direct = ctx.full_path(include);
    if has_binary_extension && fs.is_file(&direct) {
        return Some(direct);
    }
    search_dirs
        .iter()
        .flat_map(|dir| file_names.iter().map(move |name| dir.join(name)))
        .find(|candidate| fs.is_file(candidate))
}
