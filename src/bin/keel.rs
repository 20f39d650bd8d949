// src/bin/keel.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use keel::{
    CancellationToken,
    cli::{self, Cli, handlers},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// --- Command Definition and Registry ---

/// A command name, its aliases and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &CancellationToken) -> Result<()>,
}

/// Every `keel` command. Arguments that do not start with one of these are
/// passed to `build`.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "build",
        aliases: &["b"],
        handler: handlers::build::handle,
    },
    CommandDefinition {
        name: "cache",
        aliases: &[],
        handler: handlers::cache::handle,
    },
    CommandDefinition {
        name: "graph",
        aliases: &["tree"],
        handler: handlers::graph::handle,
    },
    CommandDefinition {
        name: "targets",
        aliases: &["ls"],
        handler: handlers::targets::handle,
    },
];

fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

fn main() {
    let cancellation_token = Arc::new(AtomicBool::new(false));
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // First Ctrl+C cancels the build cooperatively, the second one exits.
    let token = Arc::clone(&cancellation_token);
    let handler = ctrlc::set_handler(move || {
        if token.swap(true, Ordering::SeqCst) {
            std::process::exit(cli::EXIT_CANCELLED);
        }
        eprintln!("\n{}", "Cancelling build...".yellow());
    });
    if let Err(e) = handler {
        log::warn!("Could not install the Ctrl+C handler: {}", e);
    }

    if let Err(e) = run_cli(Cli::parse(), &cancellation_token) {
        if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
            // Help and version requests land here too; clap picks the stream and code.
            clap_err.exit();
        }

        let code = cli::exit_code_for(&e);
        match code {
            cli::EXIT_CANCELLED => eprintln!("\n{}", "Build cancelled.".yellow()),
            // The build log and summary already explained the failure.
            cli::EXIT_BUILD_FAILED => {}
            _ => eprintln!("\n{}: {:#}", "Error".red().bold(), e),
        }
        std::process::exit(code);
    }
}

/// Routes `keel <command> [args...]`, defaulting to `build`.
fn run_cli(cli: Cli, cancellation_token: &CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let mut args = cli.args;
    let command = match args.first().and_then(|first| find_command(first)) {
        Some(command) => {
            args.remove(0);
            command
        }
        None => find_command("build").ok_or_else(|| anyhow::anyhow!("'build' is not registered"))?,
    };
    log::debug!("Dispatching '{}' with {:?}", command.name, args);
    (command.handler)(args, cancellation_token)
}
