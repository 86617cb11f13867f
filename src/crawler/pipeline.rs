use std::sync::Arc;

use rustc_hash::FxHashSet;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::state::{RepoState, RepoStateMachine};
use crate::dedup::goal_signature;
use crate::error::{CrawlError, StoreError};
use crate::model::{RepoEntry, SorryRecord};
use crate::progress::{NoopProgress, ProgressReporter};
use crate::record::SorryRecordFactory;
use crate::repository::{ChangeDetector, LeafCommit, enumerate_new_leaf_commits};
use crate::stats::{CommitStats, RepoStats, StatsCollector};
use crate::store::{CatalogStore, Database};
use crate::workspace::WorkspaceBuilder;

/// Capabilities a crawl needs
pub struct CrawlContext {
    pub detector: ChangeDetector,
    pub builder: Arc<dyn WorkspaceBuilder>,
}

/// Everything one repository produced in this run
#[derive(Debug, Clone)]
pub struct RepoOutcome {
    pub remote_url: String,
    pub state: RepoState,
    /// New `(remote_heads_hash, last_time_visited)`, when the visit counts
    pub visit: Option<(String, OffsetDateTime)>,
    pub records: Vec<SorryRecord>,
    pub stats: RepoStats,
}

struct RepoCrawl<'a> {
    ctx: &'a CrawlContext,
    entry: &'a RepoEntry,
    factory: SorryRecordFactory,
    known: &'a FxHashSet<String>,
    machine: RepoStateMachine,
    stats: RepoStats,
    records: Vec<SorryRecord>,
}

impl RepoCrawl<'_> {
    fn step(&mut self, next: RepoState) {
        if let Err(e) = self.machine.advance(next) {
            tracing::error!(remote = %self.entry.remote_url, error = %e, "crawler state machine");
        }
    }

    fn finish(mut self, state: RepoState, digest: Option<String>, visited_at: OffsetDateTime) -> RepoOutcome {
        self.step(state);
        self.stats.finish(state, OffsetDateTime::now_utc());
        let visit = match digest {
            Some(digest) if state.advances_visit() => Some((digest, visited_at)),
            _ => None,
        };
        RepoOutcome {
            remote_url: self.entry.remote_url.clone(),
            state,
            visit,
            records: self.records,
            stats: self.stats,
        }
    }

    async fn crawl_leaf(&mut self, leaf: &LeafCommit) -> Result<(), CrawlError> {
        let entry = self.entry;
        let remote_url = entry.remote_url.as_str();
        self.stats.counts.entry(leaf.sha.clone()).or_default();
        self.step(RepoState::Cloning);
        let mut workspace = self.ctx.builder.checkout(remote_url, leaf).await?;

        self.step(RepoState::Building);
        workspace.build().await?;
        self.stats.build_timeout.get_or_insert(false);

        self.step(RepoState::Extracting);
        let files = workspace.source_files().await?;
        let mut extractor = workspace.goal_extractor().await?;
        let commit = workspace.commit().clone();
        tracing::info!(remote = remote_url, branch = %leaf.branch, files = files.len(), "extracting goals");

        let mut counts = CommitStats::default();
        for file in &files {
            let goals = match extractor.extract(file).await {
                Ok(goals) => goals,
                Err(e) => {
                    tracing::warn!(remote = remote_url, file = %file.display(), error = %e, "extraction failed");
                    counts.extraction_failures += 1;
                    continue;
                }
            };
            for found in goals {
                let blame = match workspace.blame(file, found.location.start_line).await {
                    Ok(blame) => blame,
                    Err(e) => {
                        tracing::warn!(remote = remote_url, file = %file.display(), error = %e, "blame failed");
                        counts.extraction_failures += 1;
                        continue;
                    }
                };
                counts.count += 1;
                if !self.known.contains(&goal_signature(&found.goal)) {
                    counts.count_new_proof += 1;
                }
                self.records.push(self.factory.build(&commit, found.location, found.goal, blame));
            }
        }

        self.stats.counts.insert(leaf.sha.clone(), counts);
        Ok(())
    }

    fn leaf_failed(&mut self, leaf: &LeafCommit, state: RepoState) {
        self.stats.counts.entry(leaf.sha.clone()).or_default().mark_failed(state);
        if state == RepoState::BuildTimedOut {
            self.stats.build_timeout = Some(true);
        }
    }
}

/// Rank of a failed leaf's state; the repository ends in the highest one.
///
/// A timeout or an unreachable clone outranks a plain build failure because
/// neither advances the visit, so the repository is retried next run.
fn failure_rank(state: RepoState) -> u8 {
    match state {
        RepoState::BuildTimedOut => 3,
        RepoState::Unreachable => 2,
        _ => 1,
    }
}

/// Crawl one repository from probe to records. Never fails: every error
/// becomes a terminal state in the outcome.
///
/// Every new leaf commit is attempted even when an earlier one fails; the
/// repository ends in the most severe leaf failure, or `Recorded`.
pub async fn crawl_repo(
    ctx: &CrawlContext,
    entry: &RepoEntry,
    factory: SorryRecordFactory,
    known: &FxHashSet<String>,
) -> RepoOutcome {
    let visited_at = OffsetDateTime::now_utc();
    let mut crawl = RepoCrawl {
        ctx,
        entry,
        factory,
        known,
        machine: RepoStateMachine::new(),
        stats: RepoStats::started(visited_at),
        records: Vec::new(),
    };
    let remote_url = entry.remote_url.as_str();

    crawl.step(RepoState::ProbingRemote);
    let probe = match ctx.detector.needs_deep_crawl(entry).await {
        Ok(probe) => probe,
        Err(e) => {
            tracing::warn!(remote = remote_url, error = %e, "remote probe failed");
            return crawl.finish(RepoState::Unreachable, None, visited_at);
        }
    };
    if !probe.changed {
        tracing::info!(remote = remote_url, "no changes since last visit");
        crawl.stats.new_leaf_commit = Some(false);
        return crawl.finish(RepoState::Skipped, Some(probe.digest), visited_at);
    }

    let leaves = match ctx.detector.probe().leaf_commits(remote_url).await {
        Ok(leaves) => enumerate_new_leaf_commits(entry, leaves),
        Err(e) => {
            tracing::warn!(remote = remote_url, error = %e, "listing leaf commits failed");
            return crawl.finish(RepoState::Unreachable, None, visited_at);
        }
    };
    crawl.stats.new_leaf_commit = Some(!leaves.is_empty());
    tracing::info!(remote = remote_url, leaves = leaves.len(), "new leaf commits");

    // A failed leaf never stops its siblings
    let mut worst: Option<RepoState> = None;
    for leaf in &leaves {
        if let Err(e) = crawl.crawl_leaf(leaf).await {
            let state = e.terminal_state();
            tracing::warn!(remote = remote_url, branch = %leaf.branch, sha = %leaf.sha, error = %e, %state, "leaf commit failed");
            crawl.leaf_failed(leaf, state);
            if worst.is_none_or(|w| failure_rank(state) > failure_rank(w)) {
                worst = Some(state);
            }
        }
    }
    crawl.finish(worst.unwrap_or(RepoState::Recorded), Some(probe.digest), visited_at)
}

/// Outcome for a task that died without reporting
fn lost_outcome(entry: &RepoEntry) -> RepoOutcome {
    let now = OffsetDateTime::now_utc();
    let mut stats = RepoStats::started(now);
    stats.finish(RepoState::BuildFailed, now);
    RepoOutcome {
        remote_url: entry.remote_url.clone(),
        state: RepoState::BuildFailed,
        visit: None,
        records: Vec::new(),
        stats,
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stats: StatsCollector,
    /// Records actually added to the catalog
    pub appended: usize,
}

/// Crawls every tracked repository with a bounded number of concurrent workers.
pub struct Crawler {
    ctx: Arc<CrawlContext>,
    workers: usize,
    checkpoint_every: Option<usize>,
    progress: Box<dyn ProgressReporter>,
}

impl Crawler {
    pub fn new(ctx: CrawlContext, workers: usize) -> Self {
        Self {
            ctx: Arc::new(ctx),
            workers: workers.max(1),
            checkpoint_every: None,
            progress: Box::new(NoopProgress),
        }
    }

    /// Save to the checkpoint store after every `n` merged repositories
    pub fn with_checkpoints(mut self, n: Option<usize>) -> Self {
        self.checkpoint_every = n.filter(|&n| n > 0);
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Crawl every repository in `db` and merge the outcomes back into it,
    /// in repository order.
    pub async fn run<S: CatalogStore>(
        &self,
        db: &mut Database,
        factory: SorryRecordFactory,
        checkpoint: Option<&S>,
    ) -> Result<RunReport, StoreError> {
        let entries: Vec<RepoEntry> = db.repos().entries().to_vec();
        let known = Arc::new(db.goal_signatures());
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let progress = self.progress.start("Crawling", entries.len() as u64);
        tracing::info!(repos = entries.len(), workers = self.workers, "starting crawl");

        let mut tasks = JoinSet::new();
        for (index, entry) in entries.iter().cloned().enumerate() {
            let ctx = Arc::clone(&self.ctx);
            let known = Arc::clone(&known);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = crawl_repo(&ctx, &entry, factory, &known).await;
                (index, outcome)
            });
        }

        let mut report = RunReport::default();
        let mut slots: Vec<Option<RepoOutcome>> = vec![None; entries.len()];
        let mut next = 0;
        let mut merged_since_checkpoint = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => tracing::error!(error = %e, "crawl task failed"),
            }
            while let Some(outcome) = slots.get_mut(next).and_then(Option::take) {
                progress.advance(&outcome.remote_url);
                report.appended += merge(db, &mut report.stats, outcome);
                next += 1;
                merged_since_checkpoint += 1;
                if let (Some(every), Some(store)) = (self.checkpoint_every, checkpoint) {
                    if merged_since_checkpoint >= every {
                        store.save(db).await?;
                        merged_since_checkpoint = 0;
                        tracing::debug!(merged = next, "checkpoint saved");
                    }
                }
            }
        }

        // Slots left empty belong to tasks that panicked
        for (entry, slot) in entries.iter().zip(slots.iter_mut()).skip(next) {
            let outcome = slot.take().unwrap_or_else(|| lost_outcome(entry));
            progress.advance(&outcome.remote_url);
            report.appended += merge(db, &mut report.stats, outcome);
        }

        progress.finish();
        Ok(report)
    }
}

/// Apply one repository's outcome to the catalog. Returns the number of records appended.
fn merge(db: &mut Database, stats: &mut StatsCollector, outcome: RepoOutcome) -> usize {
    if let Some((digest, visited_at)) = &outcome.visit {
        db.repos_mut().record_visit(&outcome.remote_url, digest, *visited_at);
    }
    let appended = db.append_records(outcome.records);
    tracing::info!(
        remote = %outcome.remote_url,
        state = %outcome.state,
        appended,
        "repository done"
    );
    stats.insert(&outcome.remote_url, outcome.stats);
    appended
}
