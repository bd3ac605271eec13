//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod collect;
mod resolve;
mod settings;
mod threads;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use matome::config::Config;
use matome::http_client::{HttpClient, PageFetcher};
use matome::pipeline::Pipeline;
use matome::rate_limit::{RateLimitConfig, RateLimiter};
use matome::scrape::BoardScraper;
use matome::storage::{SettingsRepository, ThreadRepository};

#[derive(Parser)]
#[command(name = "matome")]
#[command(about = "Collect popular forum threads and their posts for matome curation")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "MATOME_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config file)
    #[arg(long, global = true, env = "MATOME_DATABASE")]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Collect popular threads from the target boards
    Collect {
        /// Boards to collect (defaults to the stored target boards)
        boards: Vec<String>,
        /// Minimum post count for a thread to qualify
        #[arg(short, long)]
        min_posts: Option<u32>,
        /// Maximum threads kept per board
        #[arg(short = 'n', long)]
        max_threads: Option<usize>,
        /// Maximum threads kept across all boards
        #[arg(long)]
        max_total: Option<usize>,
        /// Only run when the collection interval has elapsed
        #[arg(long)]
        if_due: bool,
        /// Also extract posts for every collected thread
        #[arg(short = 'p', long)]
        with_posts: bool,
    },

    /// List stored threads
    Threads {
        /// Only threads from this board
        #[arg(short, long)]
        board: Option<String>,
        /// Number of threads to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show posts for a thread (by stored ID or URL), extracting on first use
    Posts {
        /// Thread ID or thread URL
        thread: String,
        /// Re-extract even if posts are already stored
        #[arg(short, long)]
        refresh: bool,
        /// Print posts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve the server for boards (or list the board directory)
    Resolve {
        /// Boards to resolve; lists the directory when empty
        boards: Vec<String>,
        /// Probe the resolved server and fall back if it does not answer
        #[arg(short, long)]
        probe: bool,
    },

    /// Manage stored collection settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show the effective collection settings
    Show,
    /// Update stored collection settings
    Set {
        /// Comma-separated target boards
        #[arg(long)]
        boards: Option<String>,
        /// Minimum post count
        #[arg(long)]
        min_posts: Option<u32>,
        /// Hours between automatic collections
        #[arg(long)]
        interval: Option<u32>,
        /// Enable or disable automatic collection
        #[arg(long)]
        auto: Option<bool>,
        /// Maximum threads kept per board
        #[arg(long)]
        max_threads: Option<usize>,
    },
}

/// Build the pipeline from configuration.
fn build_pipeline(config: &Config, database: Option<&std::path::Path>) -> anyhow::Result<Pipeline> {
    let db_path = config.database_path(database);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let scraper_settings = &config.scraper;
    let rate_limiter = RateLimiter::with_config(RateLimitConfig::with_base_delay(
        scraper_settings.request_delay(),
    ));
    let client = HttpClient::new(
        scraper_settings.user_agent.as_deref(),
        rate_limiter,
    )?;
    let fetcher: Arc<dyn PageFetcher> = Arc::new(client);

    Ok(Pipeline::new(
        BoardScraper::new(fetcher, scraper_settings),
        ThreadRepository::new(&db_path)?,
        SettingsRepository::new(&db_path)?,
        config.collection.clone(),
    ))
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };
    let pipeline = build_pipeline(&config, cli.database.as_deref())?;

    match cli.command {
        Commands::Collect {
            boards,
            min_posts,
            max_threads,
            max_total,
            if_due,
            with_posts,
        } => {
            let overrides = matome::pipeline::CollectionOverrides {
                boards,
                min_post_count: min_posts,
                max_threads,
                max_total_threads: max_total,
            };
            collect::cmd_collect(&pipeline, &overrides, if_due, with_posts).await
        }
        Commands::Threads { board, limit } => {
            threads::cmd_threads(&pipeline, board.as_deref(), limit)
        }
        Commands::Posts {
            thread,
            refresh,
            json,
        } => threads::cmd_posts(&pipeline, &thread, refresh, json).await,
        Commands::Resolve { boards, probe } => {
            resolve::cmd_resolve(&pipeline, &boards, probe).await
        }
        Commands::Settings { command } => match command {
            SettingsCommands::Show => settings::cmd_settings_show(&pipeline),
            SettingsCommands::Set {
                boards,
                min_posts,
                interval,
                auto,
                max_threads,
            } => settings::cmd_settings_set(
                &pipeline,
                settings::SettingsUpdate {
                    boards,
                    min_posts,
                    interval,
                    auto,
                    max_threads,
                },
            ),
        },
    }
}
