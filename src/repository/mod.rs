mod registry;
mod remote;

pub use registry::RepoRegistry;
pub use remote::{
    ChangeDetector, GitRemote, LeafCommit, Probe, RemoteHead, RemoteProbe, combined_head_digest,
    enumerate_new_leaf_commits,
};
