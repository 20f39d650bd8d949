// src/core/compiler.rs

//! # Project Compiler
//!
//! Ahead-of-time compilation of `*.keel.toml` files. The user-facing TOML is
//! deserialized into the file models, then every expression-bearing string is
//! parsed and optimized into the domain [`Project`]. The result is what the
//! project cache stores, so a cache hit skips TOML and expression parsing.

use crate::core::{
    ast::{Expression, optimize},
    cache::ProjectCache,
    parser::{self, ParseError},
    paths,
};
use crate::models::{
    ItemDefinition, ItemFile, ItemGroup, ItemGroupFile, Project, ProjectFile, Property,
    PropertyFile, PropertyGroup, PropertyGroupFile, Target, TargetFile, TaskFile, TaskKind,
    TaskKindFile, TaskNode,
};
use crate::system::filesystem::FileSystem;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a project file.
#[derive(Error, Debug)]
pub enum ProjectLoadError {
    #[error("Could not read project file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML file at '{path}': {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid expression in '{path}' ({location}): \"{text}\": {source}")]
    Expression {
        path: PathBuf,
        location: String,
        text: String,
        #[source]
        source: ParseError,
    },
    #[error("Invalid item in '{path}' ({location}): {message}")]
    InvalidItem {
        path: PathBuf,
        location: String,
        message: String,
    },
}

/// Parses and optimizes the strings of one file, tagging errors with where they came from.
struct ExpressionCompiler<'a> {
    path: &'a Path,
}

impl ExpressionCompiler<'_> {
    fn fail(&self, location: &str, text: &str, source: ParseError) -> ProjectLoadError {
        ProjectLoadError::Expression {
            path: self.path.to_path_buf(),
            location: location.to_string(),
            text: text.to_string(),
            source,
        }
    }

    /// A value: literal text with `$()`, `@()` and `%()` references and `;` lists.
    fn value(&self, location: &str, text: &str) -> Result<Expression, ProjectLoadError> {
        parser::parse_value(text)
            .map(|e| optimize(&e))
            .map_err(|e| self.fail(location, text, e))
    }

    /// A condition: the full operator grammar.
    fn condition(&self, location: &str, text: &str) -> Result<Expression, ProjectLoadError> {
        parser::parse(text)
            .map(|e| optimize(&e))
            .map_err(|e| self.fail(location, text, e))
    }

    fn optional_value(
        &self,
        location: &str,
        text: Option<&str>,
    ) -> Result<Option<Expression>, ProjectLoadError> {
        text.map(|t| self.value(location, t)).transpose()
    }

    /// Blank conditions are treated as absent.
    fn optional_condition(
        &self,
        location: &str,
        text: Option<&str>,
    ) -> Result<Option<Expression>, ProjectLoadError> {
        text.filter(|t| !t.trim().is_empty())
            .map(|t| self.condition(location, t))
            .transpose()
    }
}

// --- PUBLIC COMPILER API ---

/// Compiles the TOML `content` of the project file at `path`.
pub fn compile_project(path: &Path, content: &str) -> Result<Project, ProjectLoadError> {
    let file: ProjectFile = toml::from_str(content).map_err(|e| ProjectLoadError::TomlParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    let exprs = ExpressionCompiler { path };

    let property_groups = file
        .property_groups
        .into_iter()
        .enumerate()
        .map(|(i, group)| compile_property_group(&exprs, i, group))
        .collect::<Result<Vec<_>, _>>()?;

    let item_groups = file
        .item_groups
        .into_iter()
        .enumerate()
        .map(|(i, group)| compile_item_group(&exprs, i, group))
        .collect::<Result<Vec<_>, _>>()?;

    let targets = file
        .targets
        .into_iter()
        .map(|target| compile_target(&exprs, target))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Project {
        filename: path.to_path_buf(),
        default_targets: exprs.optional_value("default_targets", file.default_targets.as_deref())?,
        property_groups,
        item_groups,
        targets,
    })
}

/// Reads and compiles a project, going through `cache` when one is given.
/// Cache problems never fail the load; the file is simply recompiled.
pub fn load_project(
    path: &Path,
    fs: &dyn FileSystem,
    cache: Option<&ProjectCache>,
) -> Result<Project, ProjectLoadError> {
    let path = paths::normalize_path(path);
    let content = fs
        .read_to_string(&path)
        .map_err(|source| ProjectLoadError::Io {
            path: path.clone(),
            source,
        })?;

    let key = cache.map(|c| c.key_for(&path, content.as_bytes()));
    if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
        match cache.read(key) {
            Ok(Some(project)) if project.filename == path => {
                log::debug!("Cache hit for '{}'.", path.display());
                return Ok(project);
            }
            Ok(_) => log::debug!("Cache miss for '{}'.", path.display()),
            Err(e) => log::warn!("Ignoring unreadable cache entry for '{}': {:#}", path.display(), e),
        }
    }

    log::debug!("Compiling '{}'.", path.display());
    let project = compile_project(&path, &content)?;

    if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
        if let Err(e) = cache.write(key, &project) {
            log::warn!("Could not cache '{}': {:#}", path.display(), e);
        }
    }
    Ok(project)
}

// --- Section compilers ---

fn compile_properties(
    exprs: &ExpressionCompiler<'_>,
    location: &str,
    properties: Vec<PropertyFile>,
) -> Result<Vec<Property>, ProjectLoadError> {
    properties
        .into_iter()
        .map(|p| {
            let here = format!("{location} property '{}'", p.name);
            Ok(Property {
                value: exprs.value(&here, &p.value)?,
                condition: exprs.optional_condition(&here, p.condition.as_deref())?,
                name: p.name,
            })
        })
        .collect()
}

fn compile_property_group(
    exprs: &ExpressionCompiler<'_>,
    index: usize,
    group: PropertyGroupFile,
) -> Result<PropertyGroup, ProjectLoadError> {
    let location = format!("property_group #{}", index + 1);
    Ok(PropertyGroup {
        condition: exprs.optional_condition(&location, group.condition.as_deref())?,
        properties: compile_properties(exprs, &location, group.properties)?,
    })
}

fn compile_items(
    exprs: &ExpressionCompiler<'_>,
    location: &str,
    items: Vec<ItemFile>,
) -> Result<Vec<ItemDefinition>, ProjectLoadError> {
    items
        .into_iter()
        .map(|item| {
            let here = format!("{location} item '{}'", item.item_type);
            let invalid = |message: &str| ProjectLoadError::InvalidItem {
                path: exprs.path.to_path_buf(),
                location: here.clone(),
                message: message.to_string(),
            };
            if item.item_type.trim().is_empty() {
                return Err(invalid("the item type is empty"));
            }
            match (&item.include, &item.remove) {
                (Some(_), Some(_)) => return Err(invalid("'include' and 'remove' are exclusive")),
                (None, None) => return Err(invalid("one of 'include' or 'remove' is required")),
                _ => {}
            }
            if item.remove.is_some() && (item.exclude.is_some() || !item.metadata.is_empty()) {
                return Err(invalid("'remove' cannot be combined with 'exclude' or metadata"));
            }

            let metadata = item
                .metadata
                .iter()
                .map(|(name, value)| {
                    let at = format!("{here} metadata '{name}'");
                    Ok((name.clone(), exprs.value(&at, value)?))
                })
                .collect::<Result<Vec<_>, ProjectLoadError>>()?;

            Ok(ItemDefinition {
                include: exprs.optional_value(&here, item.include.as_deref())?,
                exclude: exprs.optional_value(&here, item.exclude.as_deref())?,
                remove: exprs.optional_value(&here, item.remove.as_deref())?,
                condition: exprs.optional_condition(&here, item.condition.as_deref())?,
                item_type: item.item_type,
                metadata,
            })
        })
        .collect()
}

fn compile_item_group(
    exprs: &ExpressionCompiler<'_>,
    index: usize,
    group: ItemGroupFile,
) -> Result<ItemGroup, ProjectLoadError> {
    let location = format!("item_group #{}", index + 1);
    Ok(ItemGroup {
        condition: exprs.optional_condition(&location, group.condition.as_deref())?,
        items: compile_items(exprs, &location, group.items)?,
    })
}

fn compile_target(
    exprs: &ExpressionCompiler<'_>,
    target: TargetFile,
) -> Result<Target, ProjectLoadError> {
    let location = format!("target '{}'", target.name);
    let tasks = target
        .tasks
        .into_iter()
        .enumerate()
        .map(|(i, task)| compile_task(exprs, &format!("{location} task #{}", i + 1), task))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Target {
        condition: exprs.optional_condition(&location, target.condition.as_deref())?,
        depends_on_targets: exprs.optional_value(&location, target.depends_on.as_deref())?,
        inputs: exprs.optional_value(&location, target.inputs.as_deref())?,
        outputs: exprs.optional_value(&location, target.outputs.as_deref())?,
        name: target.name,
        tasks,
    })
}

fn compile_task(
    exprs: &ExpressionCompiler<'_>,
    location: &str,
    task: TaskFile,
) -> Result<TaskNode, ProjectLoadError> {
    let value = |text: &str| exprs.value(location, text);
    let optional = |text: Option<String>| exprs.optional_value(location, text.as_deref());

    let kind = match task.kind {
        TaskKindFile::Message { text, importance } => TaskKind::Message {
            text: value(&text)?,
            importance,
        },
        TaskKindFile::Error { text } => TaskKind::Error { text: value(&text)? },
        TaskKindFile::Warning { text } => TaskKind::Warning { text: value(&text)? },
        TaskKindFile::PropertyGroup { properties } => {
            TaskKind::PropertyGroup(compile_properties(exprs, location, properties)?)
        }
        TaskKindFile::ItemGroup { items } => {
            TaskKind::ItemGroup(compile_items(exprs, location, items)?)
        }
        TaskKindFile::Copy {
            source_files,
            destination_files,
            destination_folder,
            skip_unchanged_files,
        } => TaskKind::Copy {
            source_files: value(&source_files)?,
            destination_files: optional(destination_files)?,
            destination_folder: optional(destination_folder)?,
            skip_unchanged_files,
        },
        TaskKindFile::Delete { files } => TaskKind::Delete { files: value(&files)? },
        TaskKindFile::Exec {
            command,
            working_directory,
            ignore_exit_code,
        } => TaskKind::Exec {
            command: value(&command)?,
            working_directory: optional(working_directory)?,
            ignore_exit_code,
        },
        TaskKindFile::Compile {
            sources,
            references,
            resources,
            output_assembly,
            target_type,
            define_constants,
            additional_flags,
        } => TaskKind::Compile {
            sources: value(&sources)?,
            references: optional(references)?,
            resources: optional(resources)?,
            output_assembly: value(&output_assembly)?,
            target_type: optional(target_type)?,
            define_constants: optional(define_constants)?,
            additional_flags: optional(additional_flags)?,
        },
        TaskKindFile::ResolveReferences {
            references,
            search_paths,
            output_item,
        } => TaskKind::ResolveReferences {
            references: value(&references)?,
            search_paths: optional(search_paths)?,
            output_item,
        },
        TaskKindFile::Output {
            task_parameter,
            property_name,
            item_name,
        } => TaskKind::Output {
            task_parameter,
            property_name,
            item_name,
        },
    };

    Ok(TaskNode {
        condition: exprs.optional_condition(location, task.condition.as_deref())?,
        kind,
    })
}
