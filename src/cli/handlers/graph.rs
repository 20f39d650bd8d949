// src/cli/handlers/graph.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    CancellationToken,
    cli::{args::GraphArgs, handlers::commons},
    core::{graph_display, graph_loader::GraphLoader},
    system::{filesystem::RealFileSystem, settings},
};

#[derive(Serialize, Debug, PartialEq, Eq)]
struct GraphNode {
    project: PathBuf,
    dependencies: Vec<PathBuf>,
}

/// Loads the project graph and prints it as a dependency tree (or JSON).
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let graph_args = GraphArgs::try_parse_from(&args)?;
    let settings = settings::load_settings().context("Failed to load keel settings")?;
    let entries = commons::resolve_entry_projects(&graph_args.projects)?;

    let fs = RealFileSystem;
    let cache = commons::open_cache(&settings, graph_args.no_cache);
    let global = Arc::new(commons::global_environment(
        &settings,
        &graph_args.properties,
    ));
    let mut loader = GraphLoader::new(&fs, global);
    if let Some(cache) = &cache {
        loader = loader.with_cache(cache);
    }
    let graph = loader.load(&entries)?;
    let edges = graph.edges();

    if graph_args.json {
        println!("{}", graph_json(&edges)?);
        return Ok(());
    }
    println!(
        "\n{} ({} project(s))",
        "Project dependency graph".bold(),
        graph.len()
    );
    print!("{}", graph_display::render_dependency_tree(&edges));
    Ok(())
}

fn graph_json(edges: &[(PathBuf, Vec<PathBuf>)]) -> Result<String> {
    let nodes: Vec<GraphNode> = edges
        .iter()
        .map(|(project, dependencies)| GraphNode {
            project: project.clone(),
            dependencies: dependencies.clone(),
        })
        .collect();
    serde_json::to_string_pretty(&nodes).context("Failed to serialize the project graph")
}
