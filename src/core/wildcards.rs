// src/core/wildcards.rs

//! File wildcards in item includes: `*` (within one directory), `?` (one
//! character) and `**` (any number of directories).

use crate::core::paths;
use crate::system::filesystem::FileSystem;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    // One glob token: a recursive segment, a star, a question mark, or a literal run.
    static ref GLOB_TOKEN_RE: Regex = Regex::new(r"\*\*/?|\*|\?|[^*?]+").unwrap_or_else(|_| unreachable!());
}

/// A file matched by a wildcard include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardMatch {
    /// The include as it should appear on the item: relative to the base
    /// directory when the pattern was relative, absolute otherwise.
    pub include: String,
    /// The directories matched below the fixed part of the pattern, with a
    /// trailing `/`, or empty.
    pub recursive_dir: String,
}

pub fn has_wildcards(text: &str) -> bool {
    text.contains(['*', '?'])
}

fn to_forward_slashes(text: &str) -> String {
    text.replace('\\', "/")
}

/// Translates a glob into an anchored regex over `/`-separated paths.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut source = String::from("^");
    for token in GLOB_TOKEN_RE.find_iter(pattern) {
        match token.as_str() {
            "**/" => source.push_str("(?:[^/]*/)*"),
            "**" => source.push_str(".*"),
            "*" => source.push_str("[^/]*"),
            "?" => source.push_str("[^/]"),
            literal => source.push_str(&regex::escape(literal)),
        }
    }
    source.push('$');
    Regex::new(&source).ok()
}

/// True if `candidate` matches `pattern` (both compared with `/` separators).
/// Patterns without wildcards compare as normalized paths.
pub fn matches(base_dir: &Path, pattern: &str, candidate: &str) -> bool {
    let candidate_full = to_forward_slashes(&paths::absolutize(base_dir, candidate).to_string_lossy());
    let pattern_full = to_forward_slashes(&paths::absolutize(base_dir, pattern).to_string_lossy());
    if !has_wildcards(pattern) {
        return candidate_full == pattern_full;
    }
    glob_to_regex(&pattern_full).is_some_and(|re| re.is_match(&candidate_full))
}

/// The directory prefix of a pattern before its first wildcard segment.
fn fixed_prefix(pattern: &str) -> String {
    to_forward_slashes(pattern)
        .split('/')
        .take_while(|segment| !has_wildcards(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Expands a wildcard include against the filesystem, in a stable order.
/// Directories that cannot be enumerated yield no matches.
pub fn expand(fs: &dyn FileSystem, base_dir: &Path, pattern: &str) -> Vec<WildcardMatch> {
    let fixed = fixed_prefix(pattern);
    let is_absolute = Path::new(pattern).is_absolute();
    let root = paths::absolutize(base_dir, &fixed);
    let pattern_full = to_forward_slashes(&paths::absolutize(base_dir, pattern).to_string_lossy());
    let Some(regex) = glob_to_regex(&pattern_full) else {
        log::warn!("Ignoring malformed wildcard '{}'.", pattern);
        return Vec::new();
    };

    let files = match fs.enumerate_files(&root) {
        Ok(files) => files,
        Err(e) => {
            log::warn!("Could not enumerate '{}' for '{}': {}", root.display(), pattern, e);
            return Vec::new();
        }
    };

    let mut matches = Vec::new();
    for file in files {
        let full = to_forward_slashes(&file.to_string_lossy());
        if !regex.is_match(&full) {
            continue;
        }
        let include = if is_absolute {
            full.clone()
        } else {
            relative_to(&file, base_dir)
        };
        let recursive_dir = file
            .parent()
            .and_then(|parent| parent.strip_prefix(&root).ok())
            .map(|dir| to_forward_slashes(&dir.to_string_lossy()))
            .filter(|dir| !dir.is_empty())
            .map(|dir| format!("{}/", dir))
            .unwrap_or_default();
        matches.push(WildcardMatch {
            include,
            recursive_dir,
        });
    }
    log::trace!("Wildcard '{}' matched {} file(s).", pattern, matches.len());
    matches
}

fn relative_to(file: &Path, base_dir: &Path) -> String {
    let relative: PathBuf = match file.strip_prefix(base_dir) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => file.to_path_buf(),
    };
    to_forward_slashes(&relative.to_string_lossy())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::system::filesystem::MemoryFileSystem;

    fn fixture() -> MemoryFileSystem {
        MemoryFileSystem::new("/p")
            .with_file("/p/src/main.cs", "")
            .with_file("/p/src/util/strings.cs", "")
            .with_file("/p/src/util/deep/x.cs", "")
            .with_file("/p/src/readme.md", "")
            .with_file("/p/tests/t.cs", "")
    }

    #[test]
    fn test_single_star_stays_in_directory() {
        let found = expand(&fixture(), Path::new("/p"), "src/*.cs");
        let includes: Vec<&str> = found.iter().map(|m| m.include.as_str()).collect();
        assert_eq!(includes, vec!["src/main.cs"]);
    }

    #[test]
    fn test_recursive_wildcard_sets_recursive_dir() {
        let found = expand(&fixture(), Path::new("/p"), "src/**/*.cs");
        let pairs: Vec<(&str, &str)> = found
            .iter()
            .map(|m| (m.include.as_str(), m.recursive_dir.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("src/main.cs", ""),
                ("src/util/deep/x.cs", "util/deep/"),
                ("src/util/strings.cs", "util/"),
            ]
        );
    }

    #[test]
    fn test_question_mark_and_missing_root() {
        let found = expand(&fixture(), Path::new("/p"), "tests/?.cs");
        assert_eq!(found.len(), 1);
        assert!(expand(&fixture(), Path::new("/p"), "nowhere/*.cs").is_empty());
    }

    #[test]
    fn test_matches_literal_and_wildcard() {
        let base = Path::new("/p");
        assert!(matches(base, "src/./main.cs", "src/main.cs"));
        assert!(matches(base, "src/**/*.md", "src/readme.md"));
        assert!(!matches(base, "src/*.cs", "src/util/strings.cs"));
        assert!(has_wildcards("a/*.cs"));
        assert!(!has_wildcards("a/b.cs"));
    }
}
