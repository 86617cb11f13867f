use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize, Serializer};

use crate::dedup::goal_signature;
use crate::model::{RepoEntry, SorryRecord};
use crate::repository::RepoRegistry;

/// On-disk shape: exactly `repos` and `sorries`
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabaseDocument {
    repos: RepoRegistry,
    sorries: Vec<SorryRecord>,
}

#[derive(Serialize)]
struct DatabaseView<'a> {
    repos: &'a RepoRegistry,
    sorries: &'a [SorryRecord],
}

/// The whole catalog held in memory: tracked repositories plus the
/// append-only record list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "DatabaseDocument")]
pub struct Database {
    repos: RepoRegistry,
    sorries: Vec<SorryRecord>,
    ids: FxHashSet<String>,
}

/// Rejects documents whose `remote_url`s or record ids repeat
impl TryFrom<DatabaseDocument> for Database {
    type Error = String;

    fn try_from(doc: DatabaseDocument) -> Result<Self, Self::Error> {
        let mut remotes: FxHashSet<&str> = FxHashSet::default();
        for entry in doc.repos.entries() {
            if !remotes.insert(entry.remote_url.as_str()) {
                return Err(format!("duplicate remote_url {}", entry.remote_url));
            }
        }

        let mut ids: FxHashSet<String> = FxHashSet::default();
        for record in &doc.sorries {
            if !ids.insert(record.id.clone()) {
                return Err(format!("duplicate sorry id {}", record.id));
            }
        }
        Ok(Self {
            repos: doc.repos,
            sorries: doc.sorries,
            ids,
        })
    }
}

impl Serialize for Database {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DatabaseView {
            repos: &self.repos,
            sorries: &self.sorries,
        }
        .serialize(serializer)
    }
}

impl Database {
    pub fn new(repos: RepoRegistry) -> Self {
        Self {
            repos,
            ..Self::default()
        }
    }

    pub fn repos(&self) -> &RepoRegistry {
        &self.repos
    }

    pub fn repos_mut(&mut self) -> &mut RepoRegistry {
        &mut self.repos
    }

    pub fn sorries(&self) -> &[SorryRecord] {
        &self.sorries
    }

    pub fn upsert_repo(&mut self, entry: RepoEntry) {
        self.repos.upsert(entry);
    }

    /// Append records whose id is not yet present. Returns how many were added.
    pub fn append_records<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = SorryRecord>,
    {
        let before = self.sorries.len();
        for record in records {
            if self.ids.insert(record.id.clone()) {
                self.sorries.push(record);
            }
        }
        self.sorries.len() - before
    }

    /// Signatures of every goal currently in the catalog
    pub fn goal_signatures(&self) -> FxHashSet<String> {
        self.sorries.iter().map(|r| goal_signature(r.goal())).collect()
    }
}
