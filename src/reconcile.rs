use std::collections::HashSet;

use crate::state::new_item_record;
use crate::types::{CollectionRecord, SourceItem};

/// Outcome of merging a freshly fetched item list into tracked state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconcileOutcome {
    /// Ids appended by this call, in source order.
    pub added: Vec<String>,
    /// True when the record differs from before and must be persisted.
    pub changed: bool,
}

/// Append every item in `current` that the record does not track yet.
///
/// Tracked items are never touched, even when their title or position in the
/// source changed. New items get indices continuing from the highest existing
/// index, so slots are never reused or renumbered. Items that disappeared from
/// the source stay tracked.
pub fn reconcile(record: &mut CollectionRecord, current: &[SourceItem]) -> ReconcileOutcome {
    let mut known: HashSet<String> = record.items.iter().map(|i| i.id.clone()).collect();
    let mut next_index = record.items.iter().map(|i| i.index).max().unwrap_or(0) + 1;
    let mut added = Vec::new();

    for source in current {
        if !known.insert(source.id.clone()) {
            continue;
        }
        record.items.push(new_item_record(next_index, source));
        added.push(source.id.clone());
        next_index += 1;
    }

    let declared_changed = record.total_items != record.items.len();
    record.total_items = record.items.len();

    ReconcileOutcome {
        changed: !added.is_empty() || declared_changed,
        added,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunConfig;

    fn empty_record() -> CollectionRecord {
        CollectionRecord {
            playlist_id: "PL1".to_string(),
            title: "Playlist".to_string(),
            config: RunConfig::default(),
            total_items: 0,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
            items: Vec::new(),
        }
    }

    #[test]
    fn empty_record_starts_at_index_one() {
        let mut record = empty_record();
        let outcome = reconcile(&mut record, &[SourceItem::new("a", "First")]);
        assert_eq!(outcome.added, vec!["a"]);
        assert_eq!(record.items[0].index, 1);
        assert_eq!(record.items[0].output_slug, "01-first");
        assert_eq!(record.total_items, 1);
    }

    #[test]
    fn stale_declared_count_is_repaired() {
        let mut record = empty_record();
        reconcile(&mut record, &[SourceItem::new("a", "One")]);
        record.total_items = 7;
        let outcome = reconcile(&mut record, &[SourceItem::new("a", "One")]);
        assert!(outcome.added.is_empty());
        assert!(outcome.changed);
        assert_eq!(record.total_items, 1);
    }
}
