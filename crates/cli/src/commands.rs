//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about = "Render cache administration and digest inspection", long_about = None)]
pub struct Cli {
    /// Configuration file to use instead of the platform default
    #[arg(short, long, global = true, env = "FOLIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (repeatable); `FOLIO_LOG` takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the render cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Print the cache key of a content block
    Digest {
        /// Renderer kind (e.g. mermaid, math)
        #[arg(short, long)]
        kind: String,

        /// Font family folded into the digest
        #[arg(long)]
        font_family: Option<String>,

        /// Font size folded into the digest
        #[arg(long)]
        font_size: Option<f32>,

        /// Treat the input as a JSON task payload and digest its canonical form
        #[arg(long)]
        json: bool,

        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show entry counts, sizes and capacities
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every cached artifact
    Clear,

    /// Write a cached artifact to stdout
    Get {
        /// Cache key
        key: String,
    },

    /// Remove a single cached artifact
    Delete {
        /// Cache key
        key: String,
    },

    /// Evict the oldest entries until the durable tier is within capacity
    Prune,
}
