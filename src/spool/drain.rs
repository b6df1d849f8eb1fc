//! Draining pending items from the queue directory.

use std::path::Path;

use tracing::trace;

use crate::types::EventId;

use super::item::{QueueItem, Result};

/// Number of directory entries read per listing batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Lists the queue directory and returns all pending items, sorted by id.
///
/// The directory is read in batches of `batch_size` entries until a batch
/// comes back empty. Entries whose names are not `<decimal-id>.json` are
/// skipped. The ordering holds for this drain only: items created while the
/// caller works through the result show up in a later drain.
///
/// # Errors
///
/// Returns an error if the queue directory cannot be read.
pub fn drain_pending(queue_dir: &Path, batch_size: usize) -> Result<Vec<QueueItem>> {
    let batch_size = batch_size.max(1);
    let mut entries = std::fs::read_dir(queue_dir)?;
    let mut ids = Vec::new();

    loop {
        let mut listed = 0usize;
        for entry in entries.by_ref().take(batch_size) {
            let entry = entry?;
            listed += 1;
            if let Some(name) = entry.file_name().to_str()
                && let Some(id) = parse_item_name(name)
            {
                ids.push(id);
            }
        }
        if listed == 0 {
            break;
        }
        trace!(listed, "Listed queue batch");
    }

    ids.sort_unstable();
    ids.dedup();

    Ok(ids
        .into_iter()
        .map(|id| QueueItem::new(queue_dir, id))
        .collect())
}

/// Extracts the event id from a queue file name.
///
/// Only the canonical form `<decimal-id>.json` is accepted, so `007.json`,
/// `7.json.fail` and `7.1234.tmp` are all rejected.
pub fn parse_item_name(name: &str) -> Option<EventId> {
    let stem = name.strip_suffix(".json")?;
    let id = EventId::parse(stem).ok()?;
    (id.to_string() == stem).then_some(id)
}
