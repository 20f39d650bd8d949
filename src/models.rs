// src/models.rs

use crate::core::ast::Expression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::constants::PROJECT_FILE_SUFFIX;

// --- DOMAIN MODEL ---
// Produced by the project loader with every expression already parsed and
// optimized. These structs are also what the binary cache stores, so they
// must stay bincode-safe: no untagged or internally tagged enums here.

/// A loaded, not-yet-evaluated project.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Project {
    /// Absolute, normalized path of the project file.
    pub filename: PathBuf,
    pub default_targets: Option<Expression>,
    pub property_groups: Vec<PropertyGroup>,
    pub item_groups: Vec<ItemGroup>,
    pub targets: Vec<Target>,
}

impl Project {
    /// The project name: the file name without the project suffix.
    pub fn name(&self) -> String {
        let file_name = self
            .filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match file_name.strip_suffix(PROJECT_FILE_SUFFIX) {
            Some(stem) => stem.to_string(),
            None => self
                .filename
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or(file_name),
        }
    }

    /// Directory containing the project file; relative paths resolve against it.
    pub fn directory(&self) -> &Path {
        self.filename.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Finds a target by name (case-insensitive).
    pub fn target_index(&self, name: &str) -> Option<usize> {
        self.targets
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PropertyGroup {
    pub condition: Option<Expression>,
    pub properties: Vec<Property>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Expression,
    pub condition: Option<Expression>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ItemGroup {
    pub condition: Option<Expression>,
    pub items: Vec<ItemDefinition>,
}

/// An unevaluated item element. Exactly one of `include`/`remove` is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ItemDefinition {
    pub item_type: String,
    pub include: Option<Expression>,
    pub exclude: Option<Expression>,
    pub remove: Option<Expression>,
    pub condition: Option<Expression>,
    /// Ordered `(name, value)` metadata definitions.
    pub metadata: Vec<(String, Expression)>,
}

/// An evaluated item: a typed identity plus key/value metadata.
///
/// Equality compares metadata by content; the map keeps it ordered so
/// declaration order never matters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectItem {
    pub item_type: String,
    pub include: String,
    pub metadata: BTreeMap<String, String>,
}

impl ProjectItem {
    pub fn new(item_type: impl Into<String>, include: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            include: include.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// The same identity and metadata under a different item type.
    pub fn retyped(&self, item_type: &str) -> Self {
        Self {
            item_type: item_type.to_string(),
            include: self.include.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub condition: Option<Expression>,
    pub depends_on_targets: Option<Expression>,
    pub inputs: Option<Expression>,
    pub outputs: Option<Expression>,
    pub tasks: Vec<TaskNode>,
}

/// One task element inside a target.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub condition: Option<Expression>,
    pub kind: TaskKind,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

/// The closed set of built-in tasks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum TaskKind {
    Message {
        text: Expression,
        importance: Importance,
    },
    Error {
        text: Expression,
    },
    Warning {
        text: Expression,
    },
    PropertyGroup(Vec<Property>),
    ItemGroup(Vec<ItemDefinition>),
    Copy {
        source_files: Expression,
        destination_files: Option<Expression>,
        destination_folder: Option<Expression>,
        skip_unchanged_files: bool,
    },
    Delete {
        files: Expression,
    },
    Exec {
        command: Expression,
        working_directory: Option<Expression>,
        ignore_exit_code: bool,
    },
    Compile {
        sources: Expression,
        references: Option<Expression>,
        resources: Option<Expression>,
        output_assembly: Expression,
        target_type: Option<Expression>,
        define_constants: Option<Expression>,
        additional_flags: Option<Expression>,
    },
    ResolveReferences {
        references: Expression,
        search_paths: Option<Expression>,
        output_item: String,
    },
    Output {
        task_parameter: String,
        property_name: Option<String>,
        item_name: Option<String>,
    },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message { .. } => "Message",
            Self::Error { .. } => "Error",
            Self::Warning { .. } => "Warning",
            Self::PropertyGroup(_) => "PropertyGroup",
            Self::ItemGroup(_) => "ItemGroup",
            Self::Copy { .. } => "Copy",
            Self::Delete { .. } => "Delete",
            Self::Exec { .. } => "Exec",
            Self::Compile { .. } => "Compile",
            Self::ResolveReferences { .. } => "ResolveReferences",
            Self::Output { .. } => "Output",
        }
    }
}

// --- PROJECT FILE MODELS (FOR TOML) ---
// These are what users write in `*.keel.toml`. They are only deserialized,
// then converted into the domain model above by the project loader.

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    #[serde(default)]
    pub default_targets: Option<String>,
    #[serde(default, rename = "property_group")]
    pub property_groups: Vec<PropertyGroupFile>,
    #[serde(default, rename = "item_group")]
    pub item_groups: Vec<ItemGroupFile>,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetFile>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct PropertyGroupFile {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default, rename = "property")]
    pub properties: Vec<PropertyFile>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct PropertyFile {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ItemGroupFile {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default, rename = "item")]
    pub items: Vec<ItemFile>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ItemFile {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub remove: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TargetFile {
    pub name: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub depends_on: Option<String>,
    #[serde(default)]
    pub inputs: Option<String>,
    #[serde(default)]
    pub outputs: Option<String>,
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskFile>,
}

/// A `[[target.task]]` table: the shared `condition` plus the kind-specific fields.
#[derive(Deserialize, Debug, Clone)]
pub struct TaskFile {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(flatten)]
    pub kind: TaskKindFile,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind")]
pub enum TaskKindFile {
    Message {
        text: String,
        #[serde(default)]
        importance: Importance,
    },
    Error {
        text: String,
    },
    Warning {
        text: String,
    },
    PropertyGroup {
        #[serde(default, rename = "property")]
        properties: Vec<PropertyFile>,
    },
    ItemGroup {
        #[serde(default, rename = "item")]
        items: Vec<ItemFile>,
    },
    Copy {
        source_files: String,
        #[serde(default)]
        destination_files: Option<String>,
        #[serde(default)]
        destination_folder: Option<String>,
        #[serde(default)]
        skip_unchanged_files: bool,
    },
    Delete {
        files: String,
    },
    Exec {
        command: String,
        #[serde(default)]
        working_directory: Option<String>,
        #[serde(default)]
        ignore_exit_code: bool,
    },
    Compile {
        sources: String,
        #[serde(default)]
        references: Option<String>,
        #[serde(default)]
        resources: Option<String>,
        output_assembly: String,
        #[serde(default)]
        target_type: Option<String>,
        #[serde(default)]
        define_constants: Option<String>,
        #[serde(default)]
        additional_flags: Option<String>,
    },
    ResolveReferences {
        references: String,
        #[serde(default)]
        search_paths: Option<String>,
        output_item: String,
    },
    Output {
        task_parameter: String,
        #[serde(default)]
        property_name: Option<String>,
        #[serde(default)]
        item_name: Option<String>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn project_at(path: &str) -> Project {
        Project {
            filename: PathBuf::from(path),
            default_targets: None,
            property_groups: vec![],
            item_groups: vec![],
            targets: vec![Target {
                name: "Build".to_string(),
                condition: None,
                depends_on_targets: None,
                inputs: None,
                outputs: None,
                tasks: vec![],
            }],
        }
    }

    #[test]
    fn test_project_name_strips_suffix() {
        assert_eq!(project_at("/src/app/app.keel.toml").name(), "app");
        assert_eq!(project_at("/src/app/other.toml").name(), "other");
        assert_eq!(project_at("/src/app/app.keel.toml").directory(), Path::new("/src/app"));
    }

    #[test]
    fn test_target_lookup_is_case_insensitive() {
        let project = project_at("/a.keel.toml");
        assert_eq!(project.target_index("build"), Some(0));
        assert_eq!(project.target_index("Clean"), None);
    }

    #[test]
    fn test_item_equality_ignores_metadata_order() {
        let a = ProjectItem::new("Compile", "a.cs")
            .with_metadata("Link", "x")
            .with_metadata("Visible", "false");
        let b = ProjectItem::new("Compile", "a.cs")
            .with_metadata("Visible", "false")
            .with_metadata("Link", "x");
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_metadata("Link", "y"));
    }

    #[test]
    fn test_task_file_deserializes_tagged_kind() {
        let toml_text = r#"
            name = "Build"
            [[task]]
            kind = "Message"
            text = "Hello"
            importance = "high"
            condition = "true"

            [[task]]
            kind = "Copy"
            source_files = "@(Content)"
            destination_folder = "out"
        "#;
        let target: TargetFile = toml::from_str(toml_text).unwrap();
        assert_eq!(target.tasks.len(), 2);
        assert_eq!(target.tasks[0].condition.as_deref(), Some("true"));
        assert!(matches!(
            target.tasks[0].kind,
            TaskKindFile::Message { importance: Importance::High, .. }
        ));
        assert!(matches!(
            &target.tasks[1].kind,
            TaskKindFile::Copy { destination_folder: Some(d), skip_unchanged_files: false, .. } if d == "out"
        ));
    }
}
