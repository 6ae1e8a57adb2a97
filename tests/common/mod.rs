#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use playlist_digest::collaborators::CatalogPlaylist;
use playlist_digest::state;
use playlist_digest::types::{
    CollectionRecord, ItemRecord, RunConfig, SourceItem, StageStatus, Summary, SummarySection,
};

/// Source items `(id, title)` in order.
pub fn sources(pairs: &[(&str, &str)]) -> Vec<SourceItem> {
    pairs
        .iter()
        .map(|(id, title)| SourceItem::new(id, title))
        .collect()
}

/// Source items titled `"Video {id}"`.
pub fn sources_for(ids: &[&str]) -> Vec<SourceItem> {
    ids.iter()
        .map(|id| SourceItem::new(id, &format!("Video {}", id)))
        .collect()
}

pub fn catalog(id: &str, items: Vec<SourceItem>) -> CatalogPlaylist {
    CatalogPlaylist {
        id: id.to_string(),
        title: format!("Playlist {}", id),
        items,
    }
}

/// A summary with one section per timestamp.
pub fn summary_with(timestamps: &[&str]) -> Summary {
    Summary {
        overview: "Overview".to_string(),
        sections: timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| SummarySection {
                timestamp: ts.to_string(),
                title: format!("Section {}", i + 1),
                content: "Content".to_string(),
            })
            .collect(),
        key_points: vec!["Point".to_string()],
    }
}

/// A temp dir plus the state document path inside it.
pub fn state_env(playlist_id: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = state::state_path(dir.path(), playlist_id);
    (dir, path)
}

/// Initialize and persist a collection with the given item ids.
pub fn init_record(path: &Path, ids: &[&str], screenshots: bool) -> CollectionRecord {
    let config = RunConfig {
        locale: "en".to_string(),
        screenshots,
    };
    state::initialize(path, "PL1", "Playlist", config, &sources_for(ids))
        .expect("initialize state")
}

/// Mutable access to a tracked item; panics if missing.
pub fn item_mut<'a>(record: &'a mut CollectionRecord, id: &str) -> &'a mut ItemRecord {
    record
        .find_item_mut(id)
        .unwrap_or_else(|| panic!("item {} not tracked", id))
}

/// Mark an item fully summarized with `timestamps`.
pub fn mark_summarized(record: &mut CollectionRecord, id: &str, timestamps: &[&str]) {
    let item = item_mut(record, id);
    item.summarize.status = StageStatus::Completed;
    item.summarize.completed_at = Some("2026-01-01T00:00:00+00:00".to_string());
    item.summarize.timestamps = timestamps.iter().map(|s| s.to_string()).collect();
    item.capture.total = timestamps.len();
}

/// Mark an item done through both stages.
pub fn mark_done(record: &mut CollectionRecord, id: &str, timestamps: &[&str]) {
    mark_summarized(record, id, timestamps);
    let item = item_mut(record, id);
    item.capture.status = StageStatus::Completed;
    item.capture.completed = timestamps.len();
    item.capture.files = timestamps
        .iter()
        .map(|ts| playlist_digest::timestamp::filename_for(ts))
        .collect();
}
