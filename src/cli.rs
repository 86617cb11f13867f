use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::SettingsLayer;

#[derive(Parser, Debug)]
#[command(name = "sorrydb", version, about = "Incremental crawler for sorry placeholders in Lean repositories")]
pub struct Cli {
    /// TOML settings file (defaults to $SORRYDB_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a database from a list of repositories
    Init(InitArgs),
    /// Crawl new commits and add their sorries to the database
    Update(UpdateArgs),
    /// Write one sorry per distinct goal
    Deduplicate(DeduplicateArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// JSON file of the form {"repos": [{"remote": url}, ...]}
    #[arg(long)]
    pub repos_file: PathBuf,

    #[arg(long)]
    pub database_file: PathBuf,

    /// Only commits after this date (YYYY-MM-DD) are crawled; defaults to now
    #[arg(long)]
    pub starting_date: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[arg(long)]
    pub database_file: PathBuf,

    /// Write the updated database here instead of over the input
    #[arg(long)]
    pub write_database_file: Option<PathBuf>,

    /// Write per-repository statistics as JSON
    #[arg(long)]
    pub stats_file: Option<PathBuf>,

    /// Repositories crawled concurrently
    #[arg(long)]
    pub workers: Option<usize>,

    /// Seconds allowed for building one commit
    #[arg(long)]
    pub build_timeout: Option<u64>,

    /// Directory for checkouts and REPL builds
    #[arg(long)]
    pub lean_data: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct DeduplicateArgs {
    #[arg(long)]
    pub database_file: PathBuf,

    /// Output file; stdout when absent
    #[arg(long)]
    pub results_file: Option<PathBuf>,

    /// Sample at most this many sorries, spread across repositories (0 keeps all)
    #[arg(long)]
    pub max_sorries: Option<usize>,
}

impl Cli {
    /// Settings given on the command line, the highest-precedence layer
    pub fn settings_layer(&self) -> SettingsLayer {
        let mut layer = SettingsLayer {
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
            ..SettingsLayer::default()
        };
        if let Command::Update(update) = &self.command {
            layer.workers = update.workers;
            layer.build_timeout_secs = update.build_timeout;
            layer.lean_data = update.lean_data.clone();
        }
        layer
    }
}
