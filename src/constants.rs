// src/constants.rs

/// The file suffix used to discover project files in a directory.
pub const PROJECT_FILE_SUFFIX: &str = ".keel.toml";

/// The name of the user settings file (in ~/.config/keel/).
pub const SETTINGS_FILENAME: &str = "settings.toml";

/// The name of the application directory used under the config and cache roots.
pub const APP_DIR_NAME: &str = "keel";

/// The sub-directory of the cache root that holds compiled project files.
pub const PROJECT_CACHE_DIRNAME: &str = "projects";

/// Item type whose includes are turned into project graph edges.
pub const PROJECT_REFERENCE_ITEM: &str = "ProjectReference";

// --- Reserved properties seeded into every project environment ---

pub const PROP_PROJECT_FILE: &str = "ProjectFile";
pub const PROP_PROJECT_NAME: &str = "ProjectName";
pub const PROP_PROJECT_DIRECTORY: &str = "ProjectDirectory";
pub const PROP_PROJECT_FULL_PATH: &str = "ProjectFullPath";

// --- Well-known item metadata ---

pub const META_IDENTITY: &str = "Identity";
pub const META_FULL_PATH: &str = "FullPath";
pub const META_FILENAME: &str = "Filename";
pub const META_EXTENSION: &str = "Extension";
pub const META_RELATIVE_DIR: &str = "RelativeDir";
pub const META_DIRECTORY: &str = "Directory";
pub const META_ROOT_DIR: &str = "RootDir";
pub const META_RECURSIVE_DIR: &str = "RecursiveDir";
pub const META_HINT_PATH: &str = "HintPath";

// --- Output store keys written by built-in tasks ---

pub const OUTPUT_COPIED_FILES: &str = "CopiedFiles";
pub const OUTPUT_DELETED_FILES: &str = "DeletedFiles";
pub const OUTPUT_EXIT_CODE: &str = "ExitCode";
pub const OUTPUT_ASSEMBLY: &str = "OutputAssembly";
pub const OUTPUT_RESOLVED_FILES: &str = "ResolvedFiles";
