//! `folio` command-line entrypoint.

mod commands;
mod error;
mod handlers;

use crate::commands::{CacheCommands, Cli, Commands};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use folio_cache::VisualConfig;
use folio_config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("FOLIO_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Commands::Cache { command } => {
            let path = config.database_path().or_raise(|| ErrorKind::Config)?;
            let cache = handlers::open_cache(config.cache, &path).await?;
            match command {
                CacheCommands::Stats { json } => handlers::stats(&cache, json, &mut stdout).await?,
                CacheCommands::Clear => handlers::clear(&cache, &mut stdout).await?,
                CacheCommands::Get { key } => handlers::get(&cache, &key, &mut stdout).await?,
                CacheCommands::Delete { key } => handlers::delete(&cache, &key, &mut stdout).await?,
                CacheCommands::Prune => handlers::prune(&cache, &mut stdout).await?,
            }
            cache.wait_for_cleanup().await;
        },
        Commands::Digest {
            kind,
            font_family,
            font_size,
            json,
            file,
        } => {
            let visual = match (font_family, font_size) {
                (None, None) => config.pipeline.visual,
                (font_family, font_size) => Some(VisualConfig { font_family, font_size }),
            };
            let input = read_input(file).await?;
            handlers::digest_input(&kind, &input, json, visual.as_ref(), &mut stdout)?;
        },
    }
    Ok(())
}

async fn read_input(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(&path).await.or_raise(|| ErrorKind::Io),
        None => {
            let mut input = String::new();
            tokio::io::stdin().read_to_string(&mut input).await.or_raise(|| ErrorKind::Io)?;
            Ok(input)
        },
    }
}
