// Crawler integration tests
// Drive the full per-repository pipeline against scripted remotes and workspaces

mod common;

use common::{BuildScript, CommitScript, Harness, goal, leaf};
use sorrydb::commands::update_database;
use sorrydb::crawler::RepoState;
use sorrydb::record::SorryRecordFactory;
use sorrydb::repository::{RemoteHead, RepoRegistry, combined_head_digest};
use sorrydb::store::{Database, DatabaseStore};
use sorrydb::workspace::WorkspaceBuilder;
use time::OffsetDateTime;
use time::macros::datetime;

const REPO_A: &str = "https://github.com/lean/alpha";
const REPO_B: &str = "https://github.com/lean/beta";
const CUTOFF: OffsetDateTime = datetime!(2025-01-01 00:00:00 UTC);

fn database(remotes: &[&str]) -> Database {
    let mut registry = RepoRegistry::new();
    for remote in remotes {
        registry.add_repo(remote, CUTOFF).unwrap();
    }
    Database::new(registry)
}

fn factory() -> SorryRecordFactory {
    SorryRecordFactory::new(datetime!(2025-03-01 12:00:00 UTC))
}

fn digest_of(shas: &[&str]) -> String {
    let heads: Vec<RemoteHead> = shas
        .iter()
        .map(|sha| RemoteHead {
            branch: format!("b-{}", sha),
            sha: sha.to_string(),
        })
        .collect();
    combined_head_digest(&heads).unwrap()
}

async fn run(harness: &Harness, db: &mut Database, workers: usize) -> sorrydb::crawler::RunReport {
    harness
        .crawler(workers)
        .run::<DatabaseStore>(db, factory(), None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_new_repository_is_crawled_and_recorded() {
    let harness = Harness::new();
    harness
        .remote
        .set_leaves(REPO_A, vec![leaf("main", "aaa111", datetime!(2025-02-01 00:00:00 UTC))]);
    harness.builder.set_commit(
        "aaa111",
        CommitScript::with_files(vec![
            ("Alpha/Basic.lean", vec![goal("Alpha/Basic.lean", 4, "⊢ 1 + 1 = 2")]),
            ("Alpha/More.lean", vec![goal("Alpha/More.lean", 9, "n : ℕ\n⊢ n = n"), goal("Alpha/More.lean", 12, "⊢ False")]),
        ]),
    );

    let mut db = database(&[REPO_A]);
    let report = run(&harness, &mut db, 2).await;

    assert_eq!(report.appended, 3);
    assert_eq!(db.sorries().len(), 3);
    let files: Vec<_> = db.sorries().iter().map(|r| r.location.file.as_str()).collect();
    assert_eq!(files, ["Alpha/Basic.lean", "Alpha/More.lean", "Alpha/More.lean"]);

    let record = &db.sorries()[0];
    assert_eq!(record.repo.commit, "aaa111");
    assert_eq!(record.repo.branch, "main");
    assert_eq!(record.repo.lean_version, "v4.9.0");
    assert_eq!(record.metadata.blame_commit, "aaa111-blame-4");
    assert_eq!(record.metadata.inclusion_date, datetime!(2025-03-01 12:00:00 UTC));
    assert_eq!(record.id.len(), 64);

    let entry = db.repos().get(REPO_A).unwrap();
    assert_eq!(entry.remote_heads_hash, Some(digest_of(&["aaa111"])));
    assert!(entry.last_time_visited > CUTOFF);

    let stats = report.stats.get(REPO_A).unwrap();
    assert_eq!(stats.state, Some(RepoState::Recorded));
    assert_eq!(stats.new_leaf_commit, Some(true));
    assert_eq!(stats.counts["aaa111"].count, 3);
    assert_eq!(stats.counts["aaa111"].count_new_proof, 3);
    assert!(!stats.counts["aaa111"].build_failed);
    assert_eq!(stats.build_timeout, Some(false));
    assert!(stats.total_processing_time.is_some());
}

#[tokio::test]
async fn test_unchanged_repository_is_skipped() {
    let harness = Harness::new();
    harness
        .remote
        .set_leaves(REPO_A, vec![leaf("main", "aaa111", datetime!(2025-02-01 00:00:00 UTC))]);
    harness
        .builder
        .set_commit("aaa111", CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ True")])]));

    let mut db = database(&[REPO_A]);
    run(&harness, &mut db, 1).await;
    let after_first = serde_json::to_value(&db).unwrap();
    assert_eq!(harness.checkouts(), 1);

    let report = run(&harness, &mut db, 1).await;
    assert_eq!(report.appended, 0);
    assert_eq!(harness.checkouts(), 1, "no clone when heads are unchanged");

    let stats = report.stats.get(REPO_A).unwrap();
    assert_eq!(stats.state, Some(RepoState::Skipped));
    assert_eq!(stats.new_leaf_commit, Some(false));
    assert_eq!(stats.build_timeout, None);
    assert_eq!(db.sorries().len(), 1);
    assert_eq!(
        serde_json::to_value(db.sorries()).unwrap(),
        after_first["sorries"],
        "records are never touched by a second run"
    );
}

#[tokio::test]
async fn test_changed_heads_without_new_commits() {
    let harness = Harness::new();
    // Branch tip moved back to a commit older than the last visit
    harness
        .remote
        .set_leaves(REPO_A, vec![leaf("main", "old000", datetime!(2024-06-01 00:00:00 UTC))]);

    let mut db = database(&[REPO_A]);
    let report = run(&harness, &mut db, 1).await;

    assert_eq!(harness.checkouts(), 0);
    assert_eq!(report.appended, 0);
    let stats = report.stats.get(REPO_A).unwrap();
    assert_eq!(stats.state, Some(RepoState::Recorded));
    assert_eq!(stats.new_leaf_commit, Some(false));

    let entry = db.repos().get(REPO_A).unwrap();
    assert_eq!(entry.remote_heads_hash, Some(digest_of(&["old000"])));
    assert!(entry.last_time_visited > CUTOFF);
}

#[tokio::test]
async fn test_build_timeout_keeps_visit_for_retry() {
    let harness = Harness::new();
    harness
        .remote
        .set_leaves(REPO_A, vec![leaf("main", "slow01", datetime!(2025-02-01 00:00:00 UTC))]);
    harness.remote.set_leaves(REPO_B, vec![leaf("main", "fast01", datetime!(2025-02-02 00:00:00 UTC))]);
    harness.builder.set_commit(
        "slow01",
        CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ a")])]).build(BuildScript::TimesOut),
    );
    harness
        .builder
        .set_commit("fast01", CommitScript::with_files(vec![("B.lean", vec![goal("B.lean", 2, "⊢ b")])]));

    let mut db = database(&[REPO_A, REPO_B]);
    let report = run(&harness, &mut db, 2).await;

    let stats_a = report.stats.get(REPO_A).unwrap();
    assert_eq!(stats_a.state, Some(RepoState::BuildTimedOut));
    assert_eq!(stats_a.build_timeout, Some(true));
    let entry_a = db.repos().get(REPO_A).unwrap();
    assert_eq!(entry_a.remote_heads_hash, None);
    assert_eq!(entry_a.last_time_visited, CUTOFF);

    // The other repository is unaffected
    assert_eq!(report.stats.get(REPO_B).unwrap().state, Some(RepoState::Recorded));
    assert_eq!(db.sorries().len(), 1);
    assert_eq!(db.sorries()[0].remote(), REPO_B);
}

#[tokio::test]
async fn test_build_failure_advances_visit() {
    let harness = Harness::new();
    harness
        .remote
        .set_leaves(REPO_A, vec![leaf("main", "bad001", datetime!(2025-02-01 00:00:00 UTC))]);
    harness
        .builder
        .set_commit("bad001", CommitScript::with_files(vec![]).build(BuildScript::Fails));

    let mut db = database(&[REPO_A]);
    let report = run(&harness, &mut db, 1).await;

    assert_eq!(report.stats.get(REPO_A).unwrap().state, Some(RepoState::BuildFailed));
    assert_eq!(db.repos().get(REPO_A).unwrap().remote_heads_hash, Some(digest_of(&["bad001"])));
    assert!(db.sorries().is_empty());
}

#[tokio::test]
async fn test_failed_leaf_does_not_stop_its_siblings() {
    let harness = Harness::new();
    harness.remote.set_leaves(
        REPO_A,
        vec![
            leaf("experimental", "bad001", datetime!(2025-02-03 00:00:00 UTC)),
            leaf("main", "good01", datetime!(2025-02-01 00:00:00 UTC)),
        ],
    );
    harness
        .builder
        .set_commit("bad001", CommitScript::with_files(vec![]).build(BuildScript::Fails));
    harness
        .builder
        .set_commit("good01", CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ a")])]));

    let mut db = database(&[REPO_A]);
    let report = run(&harness, &mut db, 1).await;

    assert_eq!(harness.checkouts(), 2);
    let stats = report.stats.get(REPO_A).unwrap();
    assert_eq!(stats.state, Some(RepoState::BuildFailed));
    assert!(stats.counts["bad001"].build_failed);
    assert_eq!(stats.counts["bad001"].count, 0);
    assert!(!stats.counts["good01"].build_failed);
    assert_eq!(stats.counts["good01"].count, 1);
    assert_eq!(db.sorries().len(), 1);
    assert_eq!(db.sorries()[0].repo.commit, "good01");

    // Every leaf was attempted, so the visit moves on
    let entry = db.repos().get(REPO_A).unwrap();
    assert_eq!(entry.remote_heads_hash, Some(digest_of(&["bad001", "good01"])));

    let report = run(&harness, &mut db, 1).await;
    assert_eq!(report.stats.get(REPO_A).unwrap().state, Some(RepoState::Skipped));
    assert_eq!(harness.checkouts(), 2);
    assert_eq!(db.sorries().len(), 1);
}

#[tokio::test]
async fn test_timed_out_leaf_keeps_sibling_records() {
    let harness = Harness::new();
    harness.remote.set_leaves(
        REPO_A,
        vec![
            leaf("main", "good01", datetime!(2025-02-01 00:00:00 UTC)),
            leaf("slow", "slow01", datetime!(2025-02-02 00:00:00 UTC)),
            leaf("broken", "bad001", datetime!(2025-02-03 00:00:00 UTC)),
        ],
    );
    harness
        .builder
        .set_commit("good01", CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ a")])]));
    harness
        .builder
        .set_commit("slow01", CommitScript::with_files(vec![]).build(BuildScript::TimesOut));
    harness
        .builder
        .set_commit("bad001", CommitScript::with_files(vec![]).build(BuildScript::Fails));

    let mut db = database(&[REPO_A]);
    let report = run(&harness, &mut db, 1).await;

    assert_eq!(harness.checkouts(), 3);
    let stats = report.stats.get(REPO_A).unwrap();
    // The timeout outranks the later build failure
    assert_eq!(stats.state, Some(RepoState::BuildTimedOut));
    assert_eq!(stats.build_timeout, Some(true));
    assert!(stats.counts["slow01"].build_timeout);
    assert!(stats.counts["bad001"].build_failed);
    assert_eq!(stats.counts["good01"].count, 1);
    assert_eq!(db.sorries().len(), 1);

    let entry = db.repos().get(REPO_A).unwrap();
    assert_eq!(entry.remote_heads_hash, None);
    assert_eq!(entry.last_time_visited, CUTOFF);

    // The retry crawls every leaf again without duplicating records
    let report = run(&harness, &mut db, 1).await;
    assert_eq!(report.appended, 0);
    assert_eq!(harness.checkouts(), 6);
    assert_eq!(db.sorries().len(), 1);
}

#[tokio::test]
async fn test_unreachable_remote_changes_nothing() {
    let harness = Harness::new();
    harness.remote.set_unreachable(REPO_A);

    let mut db = database(&[REPO_A]);
    let before = db.repos().clone();
    let report = run(&harness, &mut db, 1).await;

    assert_eq!(report.stats.get(REPO_A).unwrap().state, Some(RepoState::Unreachable));
    assert_eq!(db.repos(), &before);
    assert_eq!(harness.checkouts(), 0);
}

#[tokio::test]
async fn test_failed_file_does_not_stop_the_commit() {
    let harness = Harness::new();
    harness
        .remote
        .set_leaves(REPO_A, vec![leaf("main", "mix001", datetime!(2025-02-01 00:00:00 UTC))]);
    harness.builder.set_commit(
        "mix001",
        CommitScript::with_files(vec![
            ("A.lean", vec![goal("A.lean", 1, "⊢ a")]),
            ("C.lean", vec![goal("C.lean", 7, "⊢ c")]),
        ])
        .failing_file("B.lean"),
    );

    let mut db = database(&[REPO_A]);
    let report = run(&harness, &mut db, 1).await;

    let stats = report.stats.get(REPO_A).unwrap();
    assert_eq!(stats.state, Some(RepoState::Recorded));
    assert_eq!(stats.counts["mix001"].extraction_failures, 1);
    assert_eq!(stats.counts["mix001"].count, 2);
    assert_eq!(db.sorries().len(), 2);
}

#[tokio::test]
async fn test_every_new_leaf_commit_is_crawled() {
    let harness = Harness::new();
    harness.remote.set_leaves(
        REPO_A,
        vec![
            leaf("feature", "feat01", datetime!(2025-02-05 00:00:00 UTC)),
            leaf("main", "main01", datetime!(2025-02-01 00:00:00 UTC)),
            leaf("stale", "stale1", datetime!(2024-11-01 00:00:00 UTC)),
        ],
    );
    harness
        .builder
        .set_commit("feat01", CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ a")])]));
    harness
        .builder
        .set_commit("main01", CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ a")])]));

    let mut db = database(&[REPO_A]);
    let report = run(&harness, &mut db, 1).await;

    assert_eq!(harness.checkouts(), 2);
    let stats = report.stats.get(REPO_A).unwrap();
    assert!(stats.counts.contains_key("feat01"));
    assert!(stats.counts.contains_key("main01"));
    assert!(!stats.counts.contains_key("stale1"));
    // Same span on two branches: two distinct records
    assert_eq!(db.sorries().len(), 2);
    assert_ne!(db.sorries()[0].id, db.sorries()[1].id);
    // The second occurrence of the goal is not new relative to the catalog before the run
    assert_eq!(stats.counts["feat01"].count_new_proof, 1);
    assert_eq!(stats.counts["main01"].count_new_proof, 1);
}

#[tokio::test]
async fn test_known_goals_are_not_new() {
    let harness = Harness::new();
    harness
        .remote
        .set_leaves(REPO_A, vec![leaf("main", "aaa111", datetime!(2025-02-01 00:00:00 UTC))]);
    harness
        .builder
        .set_commit("aaa111", CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ shared")])]));
    let mut db = database(&[REPO_A, REPO_B]);
    run(&harness, &mut db, 1).await;

    harness
        .remote
        .set_leaves(REPO_B, vec![leaf("main", "bbb222", datetime!(2025-02-10 00:00:00 UTC))]);
    harness.builder.set_commit(
        "bbb222",
        CommitScript::with_files(vec![("B.lean", vec![goal("B.lean", 3, "⊢   shared"), goal("B.lean", 5, "⊢ fresh")])]),
    );
    let report = run(&harness, &mut db, 1).await;

    let counts = &report.stats.get(REPO_B).unwrap().counts["bbb222"];
    assert_eq!(counts.count, 2);
    assert_eq!(counts.count_new_proof, 1);
}

#[tokio::test]
async fn test_merge_order_follows_repository_order() {
    let remotes: Vec<String> = (0..6).map(|i| format!("https://github.com/lean/r{}", i)).collect();
    let harness = Harness::new();
    for (i, remote) in remotes.iter().enumerate() {
        let sha = format!("sha{:03}", i);
        harness
            .remote
            .set_leaves(remote, vec![leaf("main", &sha, datetime!(2025-02-01 00:00:00 UTC))]);
        harness.builder.set_commit(
            &sha,
            CommitScript::with_files(vec![("X.lean", vec![goal("X.lean", 1, &format!("⊢ goal {}", i))])]),
        );
    }
    let refs: Vec<&str> = remotes.iter().map(String::as_str).collect();

    let mut db = database(&refs);
    run(&harness, &mut db, 4).await;

    let order: Vec<_> = db.sorries().iter().map(|r| r.remote().to_string()).collect();
    assert_eq!(order, remotes);
}

#[tokio::test]
async fn test_checkpoints_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let store = DatabaseStore::new(dir.path().join("checkpoint.json"));
    let harness = Harness::new();
    harness
        .remote
        .set_leaves(REPO_A, vec![leaf("main", "aaa111", datetime!(2025-02-01 00:00:00 UTC))]);
    harness
        .builder
        .set_commit("aaa111", CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ a")])]));

    let mut db = database(&[REPO_A, REPO_B]);
    harness
        .crawler(1)
        .with_checkpoints(Some(1))
        .run(&mut db, factory(), Some(&store))
        .await
        .unwrap();

    let saved = store.load_sync().unwrap();
    assert_eq!(saved.sorries().len(), 1);
    assert_eq!(saved.repos().len(), 2);
}

#[tokio::test]
async fn test_update_writes_target_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let source = DatabaseStore::new(dir.path().join("in.json"));
    let target = DatabaseStore::new(dir.path().join("out.json"));
    let stats_path = dir.path().join("stats.json");
    source.save_sync(&database(&[REPO_A])).unwrap();

    let harness = Harness::new();
    harness
        .remote
        .set_leaves(REPO_A, vec![leaf("main", "aaa111", datetime!(2025-02-01 00:00:00 UTC))]);
    harness
        .builder
        .set_commit("aaa111", CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ a")])]));

    let crawler = harness.crawler(1);
    let report = update_database(&crawler, &source, &target, Some(stats_path.as_path()), std::future::pending())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.summary.updated, 1);
    assert_eq!(report.summary.new_records, 1);
    assert_eq!(target.load_sync().unwrap().sorries().len(), 1);
    assert!(source.load_sync().unwrap().sorries().is_empty());

    let stats: serde_json::Value = serde_json::from_slice(&std::fs::read(&stats_path).unwrap()).unwrap();
    assert_eq!(stats[REPO_A]["state"], "recorded");
    assert_eq!(stats[REPO_A]["counts"]["aaa111"]["count"], 1);
}

#[tokio::test]
async fn test_interrupted_update_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = DatabaseStore::new(dir.path().join("in.json"));
    let target = DatabaseStore::new(dir.path().join("out.json"));
    source.save_sync(&database(&[REPO_A])).unwrap();

    let harness = Harness::new();
    let crawler = harness.crawler(1);
    let report = update_database(&crawler, &source, &target, None, std::future::ready(()))
        .await
        .unwrap();

    assert!(report.is_none());
    assert!(!target.exists());
}

#[tokio::test]
async fn test_materialize_checks_out_and_builds() {
    let harness = Harness::new();
    let at = datetime!(2025-02-01 00:00:00 UTC);
    harness
        .builder
        .set_commit("ok0001", CommitScript::with_files(vec![("A.lean", vec![goal("A.lean", 1, "⊢ a")])]));
    harness
        .builder
        .set_commit("slow01", CommitScript::with_files(vec![]).build(BuildScript::TimesOut));

    let workspace = harness.builder.materialize(REPO_A, &leaf("main", "ok0001", at)).await.unwrap();
    assert_eq!(workspace.commit().commit, "ok0001");
    assert_eq!(workspace.source_files().await.unwrap().len(), 1);

    let err = harness
        .builder
        .materialize(REPO_A, &leaf("main", "slow01", at))
        .await
        .err()
        .unwrap();
    assert_eq!(err.terminal_state(), RepoState::BuildTimedOut);
    assert_eq!(harness.checkouts(), 2);
}
