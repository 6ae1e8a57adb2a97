use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::types::{
    CollectionRecord, ItemClass, ItemRecord, RunConfig, SourceItem, StageStatus, Stats,
};

const MAX_SLUG_LEN: usize = 60;

/// Location of the state document for a collection.
///
/// Derived only from the collection id so reruns find the same file.
pub fn state_path(state_dir: &Path, playlist_id: &str) -> PathBuf {
    state_dir.join(format!("{}.json", sanitize_file_stem(playlist_id)))
}

fn sanitize_file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "collection".to_string()
    } else {
        stem
    }
}

/// Lowercase, keep ASCII alphanumerics, collapse everything else into single
/// hyphens. Falls back to `untitled`.
pub fn sanitize_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// `1, "My Video Title"` -> `"01-my-video-title"`.
pub fn output_slug(index: u32, title: &str) -> String {
    format!("{:02}-{}", index, sanitize_title(title))
}

pub fn new_item_record(index: u32, source: &SourceItem) -> ItemRecord {
    ItemRecord {
        id: source.id.clone(),
        index,
        title: source.title.clone(),
        output_slug: output_slug(index, &source.title),
        ..Default::default()
    }
}

/// Load the state document at `path`.
///
/// Returns `Ok(None)` when no document exists yet.
pub fn load(path: &Path) -> Result<Option<CollectionRecord>, String> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(format!("Failed to read {}: {}", path.display(), e)),
    };

    let record: CollectionRecord = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse state from {}: {}", path.display(), e))?;

    Ok(Some(record))
}

/// Save the full record to `path` using atomic write.
///
/// Writes to a temporary file in the same directory, syncs it, then renames
/// it over the target, so the file is always a complete snapshot.
pub fn save(path: &Path, record: &CollectionRecord) -> Result<(), String> {
    let parent = path
        .parent()
        .ok_or_else(|| format!("Cannot determine parent directory of {}", path.display()))?;

    fs::create_dir_all(parent)
        .map_err(|e| format!("Failed to create directory {}: {}", parent.display(), e))?;

    let json = serde_json::to_string_pretty(record)
        .map_err(|e| format!("Failed to serialize state: {}", e))?;

    let temp_file = NamedTempFile::new_in(parent)
        .map_err(|e| format!("Failed to create temp file in {}: {}", parent.display(), e))?;

    fs::write(temp_file.path(), json).map_err(|e| format!("Failed to write temp file: {}", e))?;

    let file = fs::File::open(temp_file.path())
        .map_err(|e| format!("Failed to open temp file for sync: {}", e))?;
    file.sync_all()
        .map_err(|e| format!("Failed to sync temp file: {}", e))?;

    temp_file
        .persist(path)
        .map_err(|e| format!("Failed to rename temp file to {}: {}", path.display(), e))?;

    Ok(())
}

/// Stamp `updated_at` and save. Every mutation goes through here.
pub fn touch_and_save(path: &Path, record: &mut CollectionRecord) -> Result<(), String> {
    record.updated_at = chrono::Utc::now().to_rfc3339();
    save(path, record)
}

/// Build a fresh record for a first run and persist it immediately.
///
/// Items get sequential indices starting at 1, both stages `pending`.
/// Duplicate ids in `items` keep their first occurrence.
pub fn initialize(
    path: &Path,
    playlist_id: &str,
    title: &str,
    config: RunConfig,
    items: &[SourceItem],
) -> Result<CollectionRecord, String> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut record = CollectionRecord {
        playlist_id: playlist_id.to_string(),
        title: title.to_string(),
        config,
        total_items: 0,
        created_at: now.clone(),
        updated_at: now,
        items: Vec::with_capacity(items.len()),
    };

    for source in items {
        if record.find_item(&source.id).is_some() {
            continue;
        }
        let index = record.items.len() as u32 + 1;
        record.items.push(new_item_record(index, source));
    }
    record.total_items = record.items.len();

    save(path, &record)?;
    Ok(record)
}

// --- Mutations (in memory; callers persist) ---

/// Set the summarize sub-state. Returns false if the item is untracked.
///
/// On `Completed` with timestamps, seeds the capture total when it has not
/// been set yet, so a later retry never disturbs an in-flight count.
pub fn apply_summary_update(
    record: &mut CollectionRecord,
    item_id: &str,
    status: StageStatus,
    timestamps: Option<Vec<String>>,
    error: Option<String>,
) -> bool {
    let Some(item) = record.find_item_mut(item_id) else {
        return false;
    };

    item.summarize.status = status;
    item.summarize.error = error;
    if status == StageStatus::Completed {
        item.summarize.completed_at = Some(chrono::Utc::now().to_rfc3339());
        if let Some(ts) = timestamps {
            if item.capture.total == 0 {
                item.capture.total = ts.len();
            }
            item.summarize.timestamps = ts;
        }
    }
    true
}

/// Overwrite the capture sub-state with what the caller computed.
///
/// `files` must already contain every previously produced output; merging is
/// the capture executor's job. Returns false if the item is untracked.
pub fn apply_capture_update(
    record: &mut CollectionRecord,
    item_id: &str,
    status: StageStatus,
    completed: usize,
    files: Vec<String>,
    error: Option<String>,
) -> bool {
    let Some(item) = record.find_item_mut(item_id) else {
        return false;
    };

    item.capture.status = status;
    item.capture.completed = completed;
    item.capture.files = files;
    item.capture.error = error;
    true
}

// --- Views ---

pub fn pending_ids(record: &CollectionRecord) -> Vec<String> {
    ids_where(record, |class| class.is_pending())
}

pub fn failed_ids(record: &CollectionRecord) -> Vec<String> {
    ids_where(record, |class| class == ItemClass::Failed)
}

fn ids_where(record: &CollectionRecord, pred: impl Fn(ItemClass) -> bool) -> Vec<String> {
    record
        .items
        .iter()
        .filter(|item| pred(record.classify_item(item)))
        .map(|item| item.id.clone())
        .collect()
}

pub fn stats(record: &CollectionRecord) -> Stats {
    let mut stats = Stats {
        total: record.items.len(),
        ..Default::default()
    };
    for item in &record.items {
        match record.classify_item(item) {
            ItemClass::Done => stats.completed += 1,
            ItemClass::InProgress => stats.in_progress += 1,
            ItemClass::Failed => stats.failed += 1,
            ItemClass::Pending => stats.pending += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_title_collapses_separators() {
        assert_eq!(sanitize_title("My Video Title"), "my-video-title");
        assert_eq!(sanitize_title("  Rust -- Async/Await!! "), "rust-async-await");
        assert_eq!(sanitize_title("日本語"), "untitled");
        assert_eq!(sanitize_title(""), "untitled");
    }

    #[test]
    fn sanitize_title_truncates_without_trailing_hyphen() {
        let long = "word ".repeat(40);
        let slug = sanitize_title(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn output_slug_zero_pads_index() {
        assert_eq!(output_slug(1, "My Video Title"), "01-my-video-title");
        assert_eq!(output_slug(12, "x"), "12-x");
        assert_eq!(output_slug(123, "x"), "123-x");
    }

    #[test]
    fn state_path_is_deterministic_and_safe() {
        let dir = Path::new("/tmp/state");
        assert_eq!(
            state_path(dir, "PL123-abc_X"),
            PathBuf::from("/tmp/state/PL123-abc_X.json")
        );
        assert_eq!(
            state_path(dir, "../evil"),
            PathBuf::from("/tmp/state/___evil.json")
        );
    }
}
