mod repo;
mod sorry;

pub use repo::RepoEntry;
pub use sorry::{BlameInfo, CommitRef, DebugInfo, Location, Metadata, SorryRecord};
