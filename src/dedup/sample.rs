use rustc_hash::FxHashMap;

use crate::model::SorryRecord;

/// Up to `max_count` records spread across repositories.
///
/// Records are grouped by remote in order of first appearance; each group
/// is ordered by most recent blame date (ties by id) and groups are taken
/// round-robin until `max_count` is reached or every group is exhausted.
pub fn sample(records: &[SorryRecord], max_count: usize) -> Vec<SorryRecord> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: FxHashMap<&str, Vec<&SorryRecord>> = FxHashMap::default();
    for record in records {
        let remote = record.remote();
        groups
            .entry(remote)
            .or_insert_with(|| {
                order.push(remote);
                Vec::new()
            })
            .push(record);
    }

    let mut queues: Vec<std::vec::IntoIter<&SorryRecord>> = order
        .iter()
        .filter_map(|remote| groups.remove(remote))
        .map(|mut group| {
            group.sort_by(|a, b| {
                b.metadata
                    .blame_date
                    .cmp(&a.metadata.blame_date)
                    .then_with(|| a.id.cmp(&b.id))
            });
            group.into_iter()
        })
        .collect();

    let mut picked = Vec::with_capacity(max_count.min(records.len()));
    while picked.len() < max_count {
        let mut progressed = false;
        for queue in queues.iter_mut() {
            if picked.len() == max_count {
                break;
            }
            if let Some(record) = queue.next() {
                picked.push(record.clone());
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    picked
}
