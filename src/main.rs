use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use legalindex::{
    server_config::{ConfigurationError, ServerConfig},
    service::{DocumentManager, Statistics},
};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Args)]
struct GlobalArgs {
    /// how verbose the logging should be
    #[arg(
        global = true,
        short = 'v',
        long = None,
        action = clap::ArgAction::Count,
    )]
    verbosity: u8,

    /// Path to config file; environment variables override its values
    #[arg(global = true, short, long, value_name = "config file")]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a sample config file
    InitConfig {
        #[arg(value_name = "path")]
        config_path: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[command(name = "legalindex")]
#[command(about = "Upload, index and search legal documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    global_args: GlobalArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global_args.verbosity);

    if let Some(Commands::InitConfig { config_path }) = cli.command {
        println!("Initializing config file at: {}", config_path.display());
        if let Err(e) = ServerConfig::generate(&config_path) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let config = match load_config(cli.global_args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("Set STORAGE_CONNECTION_STRING, SEARCH_SERVICE_ENDPOINT and SEARCH_API_KEY, or pass --config.");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigurationError> {
    match path {
        Some(path) => ServerConfig::from_path(path),
        None => ServerConfig::from_env(),
    }
}

async fn run(config: ServerConfig) -> Result<()> {
    println!("Legal Document Search");
    println!("========================================");

    let manager = DocumentManager::new(&config).await?;

    let stats = manager.get_statistics().await?;
    print_statistics(&stats);

    let sample_dir = PathBuf::from(&config.sample_documents_path);
    if sample_dir.is_dir() {
        println!("Ingesting sample documents from {}", sample_dir.display());
        let outcome = manager.upload_and_index_directory(&sample_dir).await?;
        println!(
            "  indexed: {}, failed: {}, skipped: {}",
            outcome.successful.len(),
            outcome.failed.len(),
            outcome.skipped
        );
        println!();
    }

    println!("Example search for 'contract':");
    let results = manager.search("contract", 5).await?;
    for (i, result) in results.iter().enumerate() {
        println!(
            "  {}. {} (score: {:.2})",
            i + 1,
            result.document.filename,
            result.score
        );
    }
    if results.is_empty() {
        println!("  No documents found. Upload some documents first!");
    }
    println!();

    let stats = manager.get_statistics().await?;
    print_statistics(&stats);
    Ok(())
}

fn print_statistics(stats: &Statistics) {
    println!("Current statistics:");
    println!(
        "  documents in storage: {} ({} bytes)",
        stats.storage.document_count, stats.storage.total_size_bytes
    );
    println!(
        "  documents in search index: {}",
        stats.search_index.document_count
    );
    println!();
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
