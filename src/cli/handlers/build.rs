// src/cli/handlers/build.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    CancellationToken,
    cli::{CliError, args::BuildArgs, handlers::commons},
    core::{
        graph_loader::GraphLoader,
        scheduler::{BuildSummary, Scheduler, SchedulerOptions},
        tasks::BuildServices,
    },
    system::{
        filesystem::{FileSystem, RealFileSystem},
        logger::{BuildLog, ConsoleSink},
        settings::{self, is_executable_in_path},
        toolchain::ProcessCompiler,
    },
};

/// The main handler for `keel build` (also the default command).
pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    let build_args = BuildArgs::try_parse_from(&args)?;
    let started = Instant::now();

    // 1. Settings and inputs.
    let settings = settings::load_settings().context("Failed to load keel settings")?;
    let entries = commons::resolve_entry_projects(&build_args.projects)?;
    let max_parallelism = match build_args.max_parallelism {
        Some(0) | None => settings.effective_parallelism(),
        Some(n) => n,
    };
    if !is_executable_in_path(&settings.compiler.executable) {
        log::debug!(
            "Compiler '{}' not found in PATH; Compile tasks will fail.",
            settings.compiler.executable
        );
    }

    // 2. Discover the project graph.
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let cache = commons::open_cache(&settings, build_args.no_cache);
    let global = Arc::new(commons::global_environment(
        &settings,
        &build_args.properties,
    ));
    let mut loader = GraphLoader::new(fs.as_ref(), global);
    if let Some(cache) = &cache {
        loader = loader.with_cache(cache);
    }
    let graph = Arc::new(loader.load(&entries)?);
    log::info!(
        "Building {} project(s) with {} worker(s).",
        graph.len(),
        max_parallelism
    );

    // 3. Run the workers.
    let log = Arc::new(
        BuildLog::new().with_sink(Arc::new(ConsoleSink::new(
            build_args.verbosity,
            max_parallelism > 1,
        ))),
    );
    let services = BuildServices {
        fs,
        compiler: Arc::new(ProcessCompiler::new(&settings.compiler)),
        cancellation_token: Arc::clone(cancellation_token),
    };
    let builder = Arc::new(commons::EngineBuilder::new(
        services,
        Arc::clone(&log),
        build_args.targets,
    ));
    let options = SchedulerOptions {
        max_parallelism,
        poll_interval: settings.poll_interval(),
    };
    let summary = Scheduler::run(graph, builder, options, Arc::clone(cancellation_token))?;

    // 4. Report.
    let succeeded = summary.is_success() && log.total_errors() == 0;
    let header = if succeeded {
        "Build succeeded.".green().bold()
    } else {
        "Build FAILED.".red().bold()
    };
    println!("\n{}", header);
    for line in summary_lines(
        &summary,
        log.total_warnings(),
        log.total_errors(),
        started.elapsed(),
    ) {
        println!("{}", line);
    }

    if summary.cancelled {
        return Err(CliError::Cancelled.into());
    }
    if !succeeded {
        return Err(CliError::BuildFailed.into());
    }
    Ok(())
}

/// The lines printed under the build result header.
fn summary_lines(
    summary: &BuildSummary,
    warnings: usize,
    errors: usize,
    elapsed: Duration,
) -> Vec<String> {
    let mut lines = vec![
        format!("    {} Warning(s)", warnings),
        format!("    {} Error(s)", errors),
        format!(
            "    {} project(s) succeeded, {} failed, {} skipped",
            summary.succeeded.len(),
            summary.failed.len(),
            summary.skipped.len()
        ),
    ];
    if summary.cancelled {
        lines.push(format!(
            "    Cancelled; {} project(s) not started",
            summary.not_started.len()
        ));
    }
    lines.push(format!("Time Elapsed {}", format_elapsed(elapsed)));
    lines
}

/// `hh:mm:ss.cc`
fn format_elapsed(elapsed: Duration) -> String {
    let total_seconds = elapsed.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let centis = elapsed.subsec_millis() / 10;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{centis:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(1234)), "00:00:01.23");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "01:02:03.00");
    }

    #[test]
    fn test_summary_lines() {
        let summary = BuildSummary {
            succeeded: vec![PathBuf::from("/a"), PathBuf::from("/b")],
            failed: vec![PathBuf::from("/c")],
            skipped: vec![PathBuf::from("/d")],
            not_started: vec![],
            cancelled: false,
        };
        let lines = summary_lines(&summary, 2, 1, Duration::from_millis(50));
        assert_eq!(
            lines,
            vec![
                "    2 Warning(s)",
                "    1 Error(s)",
                "    2 project(s) succeeded, 1 failed, 1 skipped",
                "Time Elapsed 00:00:00.05",
            ]
        );
    }

    #[test]
    fn test_cancelled_summary_mentions_unstarted_projects() {
        let summary = BuildSummary {
            not_started: vec![PathBuf::from("/x")],
            cancelled: true,
            ..BuildSummary::default()
        };
        let lines = summary_lines(&summary, 0, 0, Duration::ZERO);
        assert!(lines.contains(&"    Cancelled; 1 project(s) not started".to_string()));
    }
}
