//! Incremental crawl of every tracked repository
//!
//! Each repository runs through a validated state machine on its own task;
//! a semaphore bounds how many run at once. Outcomes are merged back into
//! the catalog in repository order so runs are reproducible.

mod pipeline;
mod state;

pub use pipeline::{CrawlContext, Crawler, RepoOutcome, RunReport, crawl_repo};
pub use state::{IllegalTransition, RepoState, RepoStateMachine};
