// src/core/graph_display.rs

//! ASCII rendering of a project dependency graph.
//!
//! Roots are the projects nothing else references; each node lists the
//! projects it depends on below it. A project reached a second time is marked
//! with `(*)` and its dependencies are not repeated.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Renders `edges` (as returned by `ProjectGraph::edges`) as a tree.
pub fn render_dependency_tree(edges: &[(PathBuf, Vec<PathBuf>)]) -> String {
    let mut out = String::new();
    if edges.is_empty() {
        out.push_str("No projects to display.\n");
        return out;
    }

    let children_map: HashMap<&Path, &[PathBuf]> = edges
        .iter()
        .map(|(path, deps)| (path.as_path(), deps.as_slice()))
        .collect();
    let referenced: HashSet<&Path> = edges
        .iter()
        .flat_map(|(_, deps)| deps.iter().map(PathBuf::as_path))
        .collect();

    let mut roots: Vec<&Path> = edges
        .iter()
        .map(|(path, _)| path.as_path())
        .filter(|path| !referenced.contains(path))
        .collect();
    // A cyclic input has no roots.
    if roots.is_empty() {
        roots = edges.iter().map(|(path, _)| path.as_path()).collect();
    }

    let mut expanded: HashSet<&Path> = HashSet::new();
    for (i, root) in roots.iter().copied().enumerate() {
        let is_last = i + 1 == roots.len();
        render_node(root, &children_map, &mut expanded, "", is_last, &mut out);
    }
    out
}

fn render_node<'a>(
    path: &'a Path,
    children_map: &HashMap<&'a Path, &'a [PathBuf]>,
    expanded: &mut HashSet<&'a Path>,
    prefix: &str,
    is_last: bool,
    out: &mut String,
) {
    let connector = if is_last { "└─" } else { "├─" };
    let first_visit = expanded.insert(path);
    let repeat_marker = if first_visit { "" } else { " (*)" };
    let _ = writeln!(
        out,
        "{}{}{} [{}]{}",
        prefix,
        connector,
        display_name(path),
        path.display(),
        repeat_marker
    );
    if !first_visit {
        return;
    }

    let child_prefix = format!("{}{}", prefix, if is_last { "   " } else { "│  " });
    if let Some(&children) = children_map.get(path) {
        for (i, child) in children.iter().enumerate() {
            let is_last_child = i + 1 == children.len();
            render_node(child, children_map, expanded, &child_prefix, is_last_child, out);
        }
    }
}

fn display_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.strip_suffix(crate::constants::PROJECT_FILE_SUFFIX) {
        Some(stem) => stem.to_string(),
        None => file_name,
    }
}
