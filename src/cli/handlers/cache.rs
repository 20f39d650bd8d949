// src/cli/handlers/cache.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use crate::{
    CancellationToken,
    cli::args::{CacheArgs, CacheCommand},
    core::cache::ProjectCache,
    system::settings,
};

/// The main handler for `keel cache`.
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let cache_args = CacheArgs::try_parse_from(&args)?;
    let settings = settings::load_settings().context("Failed to load keel settings")?;
    let cache = ProjectCache::new(
        settings
            .cache_dir()
            .context("Could not determine the cache directory")?,
    );

    match cache_args.command {
        CacheCommand::Clean => {
            let removed = cache.clear()?;
            println!(
                "{} Removed {} cached project(s) from '{}'.",
                "✔".green(),
                removed,
                cache.dir().display()
            );
        }
        CacheCommand::Path => println!("{}", cache.dir().display()),
    }
    Ok(())
}
