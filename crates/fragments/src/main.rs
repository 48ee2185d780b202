//! Fragments CLI - compile, preview and cache tooling for MDX posts.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "fragments")]
#[command(about = "MDX compilation and caching pipeline for fragments posts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to fragments.toml config file
    #[arg(short, long, default_value = "fragments.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an MDX file into a document bundle
    Compile {
        /// MDX source file
        file: PathBuf,

        /// Post title (part of the cache key)
        #[arg(short, long)]
        title: Option<String>,

        /// Write the bundle JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch the link preview for a URL
    Preview {
        /// http(s) or data: URL
        url: String,
    },

    /// Compile every post in the content directory
    Prewarm {
        /// Content directory (defaults to config or "content")
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Compiles in flight
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Evict caches made stale by a post edit
    Invalidate {
        /// File with the previous content
        #[arg(long)]
        old: Option<PathBuf>,

        /// File with the new content
        #[arg(long)]
        new: Option<PathBuf>,

        #[arg(long)]
        old_title: Option<String>,

        #[arg(long)]
        new_title: Option<String>,

        /// Recompile the new content afterwards
        #[arg(long)]
        warm: bool,
    },

    /// Start the HTTP server
    Serve {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Compile {
            file,
            title,
            output,
        } => {
            commands::compile::run(&config, file, title, output).await?;
        }
        Commands::Preview { url } => {
            commands::preview::run(&config, &url).await?;
        }
        Commands::Prewarm { dir, concurrency } => {
            commands::prewarm::run(&config, dir, concurrency).await?;
        }
        Commands::Invalidate {
            old,
            new,
            old_title,
            new_title,
            warm,
        } => {
            let args = commands::invalidate::InvalidateArgs {
                old,
                new,
                old_title,
                new_title,
                warm,
            };
            commands::invalidate::run(&config, args).await?;
        }
        Commands::Serve { port } => {
            commands::serve::run(&config, port).await?;
        }
    }

    Ok(())
}
