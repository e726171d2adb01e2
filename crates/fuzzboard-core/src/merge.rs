use std::collections::HashMap;

use crate::{BugId, BugRecord, Corpus};

/// Combines the persisted baseline with freshly fetched records.
///
/// Duplicate-resolution records are dropped from both inputs before they are
/// concatenated and once more afterwards. Exact row duplicates collapse to the
/// first occurrence; when two rows share an id but differ, the later (fetched)
/// row replaces the earlier one in place, so first-seen order is kept.
pub fn merge(baseline: &Corpus, fresh: &Corpus) -> Corpus {
    let mut merged: Vec<BugRecord> = Vec::with_capacity(baseline.len() + fresh.len());
    let mut positions: HashMap<BugId, usize> = HashMap::new();

    let candidates = baseline
        .iter()
        .chain(fresh.iter())
        .filter(|record| !record.is_duplicate());

    for record in candidates {
        match positions.get(&record.id) {
            Some(&index) => {
                if merged[index] != *record {
                    merged[index] = record.clone();
                }
            }
            None => {
                positions.insert(record.id, merged.len());
                merged.push(record.clone());
            }
        }
    }

    merged
        .into_iter()
        .filter(|record| !record.is_duplicate())
        .collect()
}
