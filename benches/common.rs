// Shared benchmark helpers
// Functions here are used across different benchmark files
#![allow(dead_code)]

use sorrydb::model::{BlameInfo, CommitRef, Location, SorryRecord};
use sorrydb::record::SorryRecordFactory;
use sorrydb::repository::RepoRegistry;
use sorrydb::store::Database;
use time::OffsetDateTime;

/// Generate `num_records` records over `num_repos` remotes.
///
/// Roughly one goal in four repeats an earlier one (up to whitespace), so
/// deduplication has real work to do.
pub fn generate_records(num_records: usize, num_repos: usize) -> Vec<SorryRecord> {
    let base = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    (0..num_records)
        .map(|i| {
            let commit = CommitRef {
                remote: format!("https://github.com/bench/repo{}", i % num_repos),
                branch: "main".to_string(),
                commit: format!("{:040x}", i / 50),
                lean_version: "v4.15.0".to_string(),
            };
            let location = Location {
                start_line: (i % 400) as u32 + 1,
                start_column: 3,
                end_line: (i % 400) as u32 + 1,
                end_column: 8,
                file: format!("Bench/File{}.lean", i % 37),
            };
            let goal = if i % 4 == 3 {
                format!("n : ℕ\n⊢  n + {} = {} + n", i / 4, i / 4)
            } else {
                format!("n : ℕ\n⊢ n + {} = {} + n", i, i)
            };
            let blame = BlameInfo {
                commit_sha: format!("{:040x}", i),
                author_email_hash: "0123456789ab".to_string(),
                date: base + time::Duration::minutes(i as i64),
            };
            let factory = SorryRecordFactory::new(base + time::Duration::hours((i % 90) as i64));
            factory.build(&commit, location, goal, blame)
        })
        .collect()
}

/// A catalog holding `records`, with every remote registered
pub fn generate_database(records: Vec<SorryRecord>) -> Database {
    let mut registry = RepoRegistry::new();
    for record in &records {
        if registry.get(record.remote()).is_none() {
            registry
                .add_repo(record.remote(), OffsetDateTime::UNIX_EPOCH)
                .unwrap();
        }
    }
    let mut db = Database::new(registry);
    db.append_records(records);
    db
}
