//! Read-only views over the catalog: one record per distinct goal, and a
//! repository-diverse sample of those.

mod sample;
mod signature;

pub use sample::sample;
pub use signature::goal_signature;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::model::SorryRecord;

pub const EXPORT_DOCUMENTATION: &str =
    "deduplicated list of sorries, for each unique goal string the most recent inclusion date is chosen";

/// The document written by `deduplicate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DedupExport {
    pub documentation: String,
    pub sorries: Vec<SorryRecord>,
}

impl DedupExport {
    pub fn new(sorries: Vec<SorryRecord>) -> Self {
        Self {
            documentation: EXPORT_DOCUMENTATION.to_string(),
            sorries,
        }
    }
}

/// One record per goal signature: the most recently included, larger id on ties.
///
/// Output is ordered by inclusion date (newest first), then id.
pub fn deduplicate(records: &[SorryRecord]) -> Vec<SorryRecord> {
    let mut best: FxHashMap<String, &SorryRecord> = FxHashMap::default();
    for record in records {
        let key = goal_signature(record.goal());
        match best.get_mut(&key) {
            Some(current) => {
                let candidate = (record.metadata.inclusion_date, &record.id);
                if candidate > (current.metadata.inclusion_date, &current.id) {
                    *current = record;
                }
            }
            None => {
                best.insert(key, record);
            }
        }
    }

    let mut unique: Vec<SorryRecord> = best.into_values().cloned().collect();
    unique.sort_by(|a, b| {
        b.metadata
            .inclusion_date
            .cmp(&a.metadata.inclusion_date)
            .then_with(|| a.id.cmp(&b.id))
    });
    unique
}

/// Deduplicate, then optionally sample down to `max_count`. A cap of zero
/// means no cap.
pub fn export(records: &[SorryRecord], max_count: Option<usize>) -> DedupExport {
    let unique = deduplicate(records);
    let sorries = match max_count.filter(|&n| n > 0) {
        Some(n) => sample(&unique, n),
        None => unique,
    };
    DedupExport::new(sorries)
}
