use std::collections::HashSet;

use tracing::info;

use crate::normalize::fingerprint;
use crate::types::NewsRecord;

/// Keep the first record of every (source, url, headline) fingerprint, in input order.
///
/// Only exact identity collapses. Rewrites of the same story under a different
/// headline or URL survive as separate records.
pub fn dedupe(records: Vec<NewsRecord>) -> Vec<NewsRecord> {
    let total = records.len();
    let mut seen = HashSet::with_capacity(total);
    let mut unique = Vec::with_capacity(total);

    for record in records {
        let key = fingerprint(&record.source, &record.url, &record.headline);
        if seen.insert(key) {
            unique.push(record);
        }
    }

    let removed = total - unique.len();
    if removed > 0 {
        info!("Removed {} duplicate records", removed);
    }
    unique
}
