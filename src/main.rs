use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use time::OffsetDateTime;

use sorrydb::cli::{Cli, Command};
use sorrydb::commands;
use sorrydb::config::Settings;
use sorrydb::logging::init_logging;
use sorrydb::store::DatabaseStore;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref(), cli.settings_layer()).context("Failed to load settings")?;
    init_logging(&settings.log_level, settings.log_file.as_deref())?;

    match cli.command {
        Command::Init(args) => {
            let remotes = commands::read_repo_list(&args.repos_file)
                .with_context(|| format!("Could not read repository list {}", args.repos_file.display()))?;
            let cutoff = match &args.starting_date {
                Some(date) => commands::parse_starting_date(date)?,
                None => OffsetDateTime::now_utc(),
            };
            let store = DatabaseStore::new(&args.database_file);
            commands::init_database(&store, &remotes, cutoff).context("Failed to initialize database")?;
            eprintln!("Initialized {} with {} repositories", args.database_file.display(), remotes.len());
        }
        Command::Update(args) => {
            let source = DatabaseStore::new(&args.database_file);
            let target = DatabaseStore::new(args.write_database_file.as_ref().unwrap_or(&args.database_file));
            // Log lines on stderr would tear the bar
            let show_progress = !args.quiet && settings.log_file.is_some() && std::io::stderr().is_terminal();
            let crawler = commands::live_crawler(&settings, show_progress);

            let shutdown = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let report = commands::update_database(&crawler, &source, &target, args.stats_file.as_deref(), shutdown)
                .await
                .context("Database update failed")?;
            match report {
                Some(report) => println!("{}", report.summary),
                None => anyhow::bail!("Interrupted; {} was not written", target.path().display()),
            }
        }
        Command::Deduplicate(args) => {
            let store = DatabaseStore::new(&args.database_file);
            let mut stdout = std::io::stdout().lock();
            commands::deduplicate_database(&store, args.results_file.as_deref(), args.max_sorries, &mut stdout)
                .context("Deduplication failed")?;
        }
    }
    Ok(())
}
