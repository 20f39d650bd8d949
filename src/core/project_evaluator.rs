// src/core/project_evaluator.rs

//! Turns a loaded [`Project`] into its per-project [`BuildEnvironment`].
//!
//! Property groups are applied first, then item groups, each in declared
//! order. Later elements see the effects of earlier ones. The same element
//! semantics are used by the `PropertyGroup`/`ItemGroup` tasks at build time.

use crate::constants::{
    META_RECURSIVE_DIR, PROP_PROJECT_DIRECTORY, PROP_PROJECT_FILE, PROP_PROJECT_FULL_PATH,
    PROP_PROJECT_NAME,
};
use crate::core::{
    environment::BuildEnvironment,
    evaluator::{EvaluationError, Evaluator},
    wildcards,
};
use crate::models::{ItemDefinition, Project, ProjectItem, Property};
use crate::system::filesystem::FileSystem;
use std::path::Path;
use std::sync::Arc;

/// Evaluates `project` into a child environment of `parent`.
pub fn evaluate_project(
    project: &Project,
    parent: Arc<BuildEnvironment>,
    fs: &dyn FileSystem,
) -> Result<BuildEnvironment, EvaluationError> {
    log::debug!("Evaluating project '{}'.", project.filename.display());
    let base_dir = project.directory();
    let mut env = BuildEnvironment::with_parent(parent);
    seed_reserved_properties(&mut env, project);

    for group in &project.property_groups {
        let enabled = Evaluator::new(&env, fs, base_dir)
            .evaluate_optional_condition(group.condition.as_ref())?;
        if enabled {
            apply_properties(&mut env, &group.properties, fs, base_dir)?;
        }
    }

    for group in &project.item_groups {
        let enabled = Evaluator::new(&env, fs, base_dir)
            .evaluate_optional_condition(group.condition.as_ref())?;
        if enabled {
            apply_item_definitions(&mut env, &group.items, fs, base_dir)?;
        }
    }

    Ok(env)
}

fn seed_reserved_properties(env: &mut BuildEnvironment, project: &Project) {
    let file_name = project
        .filename
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    env.set_property(PROP_PROJECT_FILE, file_name);
    env.set_property(PROP_PROJECT_NAME, project.name());
    env.set_property(
        PROP_PROJECT_DIRECTORY,
        project.directory().display().to_string(),
    );
    env.set_property(
        PROP_PROJECT_FULL_PATH,
        project.filename.display().to_string(),
    );
}

/// Applies property elements in order, honoring each element's condition.
pub fn apply_properties(
    env: &mut BuildEnvironment,
    properties: &[Property],
    fs: &dyn FileSystem,
    base_dir: &Path,
) -> Result<(), EvaluationError> {
    for property in properties {
        let evaluator = Evaluator::new(env, fs, base_dir);
        if !evaluator.evaluate_optional_condition(property.condition.as_ref())? {
            log::trace!("Property '{}' skipped by its condition.", property.name);
            continue;
        }
        let value = evaluator.evaluate_string(&property.value)?;
        log::trace!("Property '{}' = '{}'.", property.name, value);
        env.set_property(property.name.clone(), value);
    }
    Ok(())
}

/// Applies item elements in order: includes (with wildcards, excludes and
/// metadata) add items, removes delete visible items of the same type.
pub fn apply_item_definitions(
    env: &mut BuildEnvironment,
    definitions: &[ItemDefinition],
    fs: &dyn FileSystem,
    base_dir: &Path,
) -> Result<(), EvaluationError> {
    for definition in definitions {
        let evaluator = Evaluator::new(env, fs, base_dir);
        if !evaluator.evaluate_optional_condition(definition.condition.as_ref())? {
            continue;
        }

        if let Some(remove) = &definition.remove {
            let patterns = evaluator.evaluate_list(remove)?;
            let doomed: Vec<String> = env
                .items(&definition.item_type)
                .into_iter()
                .filter(|item| {
                    patterns
                        .iter()
                        .any(|p| wildcards::matches(base_dir, p, &item.include))
                })
                .map(|item| item.include)
                .collect();
            for include in doomed {
                env.remove_item(&definition.item_type, &include);
            }
            continue;
        }

        let Some(include) = &definition.include else {
            continue;
        };
        let items = materialize_items(&evaluator, definition, include, fs, base_dir)?;
        for item in items {
            env.add_item(item);
        }
    }
    Ok(())
}

fn materialize_items(
    evaluator: &Evaluator<'_>,
    definition: &ItemDefinition,
    include: &crate::core::ast::Expression,
    fs: &dyn FileSystem,
    base_dir: &Path,
) -> Result<Vec<ProjectItem>, EvaluationError> {
    let excludes = match &definition.exclude {
        Some(exclude) => evaluator.evaluate_list(exclude)?,
        None => Vec::new(),
    };

    let mut expanded = Vec::new();
    for item in evaluator.evaluate_items(include, &definition.item_type)? {
        if wildcards::has_wildcards(&item.include) {
            for found in wildcards::expand(fs, base_dir, &item.include) {
                let mut file_item = ProjectItem::new(&definition.item_type, found.include);
                file_item.metadata = item.metadata.clone();
                file_item
                    .metadata
                    .insert(META_RECURSIVE_DIR.to_string(), found.recursive_dir);
                expanded.push(file_item);
            }
        } else {
            expanded.push(item);
        }
    }

    expanded.retain(|item| {
        !excludes
            .iter()
            .any(|pattern| wildcards::matches(base_dir, pattern, &item.include))
    });

    for item in &mut expanded {
        let mut values = Vec::with_capacity(definition.metadata.len());
        {
            let item_evaluator = evaluator.with_item(item);
            for (name, value) in &definition.metadata {
                values.push((name.clone(), item_evaluator.evaluate_string(value)?));
            }
        }
        item.metadata.extend(values);
    }
    Ok(expanded)
}
