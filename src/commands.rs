//! The three operations behind the CLI: `init`, `update`, `deduplicate`

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::config::Settings;
use crate::crawler::{CrawlContext, Crawler};
use crate::dedup::{self, DedupExport};
use crate::error::{ConfigError, StoreError, StoreResult};
use crate::extract::{ReplInstaller, ReplSettings};
use crate::progress;
use crate::record::SorryRecordFactory;
use crate::repository::{ChangeDetector, GitRemote, RepoRegistry};
use crate::stats::{RunSummary, StatsCollector};
use crate::store::{CatalogStore, Database, DatabaseStore, write_json_atomic};
use crate::workspace::LakeWorkspaceBuilder;

#[derive(Deserialize)]
struct RepoListFile {
    repos: Vec<RepoListItem>,
}

#[derive(Deserialize)]
struct RepoListItem {
    remote: String,
}

/// Remote URLs from a `{"repos": [{"remote": url}, ...]}` file. An empty list is an error.
pub fn read_repo_list(path: &Path) -> StoreResult<Vec<String>> {
    let bytes = std::fs::read(path)?;
    let list: RepoListFile = serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidRepoList {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if list.repos.is_empty() {
        return Err(StoreError::EmptyRepoList(path.to_path_buf()));
    }
    Ok(list.repos.into_iter().map(|r| r.remote).collect())
}

/// `YYYY-MM-DD`, taken as midnight UTC
pub fn parse_starting_date(text: &str) -> Result<OffsetDateTime, ConfigError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text.trim(), &format)
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| ConfigError::Invalid {
            key: "starting_date".to_string(),
            value: text.to_string(),
        })
}

/// Create a fresh catalog tracking `remotes`, each with `cutoff` as its last visit.
///
/// Only commits after the cutoff are ever crawled.
pub fn init_database(store: &DatabaseStore, remotes: &[String], cutoff: OffsetDateTime) -> StoreResult<Database> {
    if remotes.is_empty() {
        return Err(StoreError::EmptyRepoList(store.path().to_path_buf()));
    }
    let mut registry = RepoRegistry::new();
    for remote in remotes {
        registry.add_repo(remote, cutoff)?;
    }
    if store.exists() {
        tracing::warn!(path = %store.path().display(), "overwriting existing database");
    }
    let db = Database::new(registry);
    store.save_sync(&db)?;
    tracing::info!(repos = remotes.len(), path = %store.path().display(), "initialized database");
    Ok(db)
}

/// A crawler wired to the real git remote, `lake` builds and the REPL
pub fn live_crawler(settings: &Settings, show_progress: bool) -> Crawler {
    let cache_root = settings
        .lean_data
        .clone()
        .unwrap_or_else(ReplInstaller::default_root);
    let repl = ReplSettings {
        repl_binary: settings.repl_binary.clone(),
        installer: Arc::new(ReplInstaller::new(cache_root, settings.build_timeout)),
        timeout: settings.extract_timeout,
    };
    let mut builder = LakeWorkspaceBuilder::new(settings.network_timeout, settings.build_timeout, repl);
    if let Some(root) = &settings.lean_data {
        builder = builder.with_scratch_root(root.join("checkouts"));
    }

    let ctx = CrawlContext {
        detector: ChangeDetector::new(Arc::new(GitRemote::new(settings.network_timeout))),
        builder: Arc::new(builder),
    };
    Crawler::new(ctx, settings.workers)
        .with_checkpoints(settings.checkpoint_every)
        .with_progress(progress::reporter(show_progress))
}

/// Result of an update that ran to completion
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub summary: RunSummary,
    pub stats: StatsCollector,
}

/// Crawl every repository of the catalog in `source` and write the result to `target`.
///
/// If `shutdown` resolves first the run is abandoned: nothing is written
/// beyond checkpoints already taken, and `Ok(None)` is returned.
pub async fn update_database<S, F>(
    crawler: &Crawler,
    source: &S,
    target: &S,
    stats_path: Option<&Path>,
    shutdown: F,
) -> StoreResult<Option<UpdateReport>>
where
    S: CatalogStore,
    F: Future<Output = ()>,
{
    let mut db = source.load().await?;
    let factory = SorryRecordFactory::new(OffsetDateTime::now_utc());

    let report = tokio::select! {
        report = crawler.run(&mut db, factory, Some(target)) => report?,
        _ = shutdown => {
            tracing::warn!("interrupted, database not written");
            return Ok(None);
        }
    };

    target.save(&db).await?;
    if let Some(path) = stats_path {
        report.stats.write(path)?;
        tracing::info!(path = %path.display(), "wrote statistics");
    }
    let summary = report.stats.summary(report.appended);
    tracing::info!(%summary, "update finished");
    Ok(Some(UpdateReport {
        summary,
        stats: report.stats,
    }))
}

/// Write the deduplicated (and optionally sampled) catalog to `results`, or to `out`.
pub fn deduplicate_database(
    store: &DatabaseStore,
    results: Option<&Path>,
    max_sorries: Option<usize>,
    out: &mut dyn Write,
) -> StoreResult<DedupExport> {
    let db = store.load_sync()?;
    let export = dedup::export(db.sorries(), max_sorries);
    tracing::info!(
        total = db.sorries().len(),
        kept = export.sorries.len(),
        "deduplicated catalog"
    );
    match results {
        Some(path) => write_json_atomic(path, &export)?,
        None => {
            serde_json::to_writer_pretty(&mut *out, &export)?;
            writeln!(out)?;
        }
    }
    Ok(export)
}
