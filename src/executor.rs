use std::collections::HashSet;
use std::path::Path;

use crate::collaborators::{FrameCapturer, Summarizer};
use crate::coordinator::CoordinatorHandle;
use crate::log::item_tag;
use crate::timestamp;
use crate::types::{ItemRecord, StageStatus};
use crate::{log_debug, log_info, log_warn};

pub const SUMMARY_FILE_NAME: &str = "summary.json";
pub const SCREENSHOTS_DIR_NAME: &str = "screenshots";

/// What a stage executor did for one item.
///
/// `Err` from an executor is reserved for state plumbing failures; collaborator
/// failures are recorded into the stage state and reported as `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Already satisfied, nothing written.
    Skipped,
    Completed,
    Failed(String),
}

// --- Capture planning: pure functions ---

/// Timestamps from `declared` not yet covered by a file in `produced`.
///
/// Coverage is recovered by inverting the filename rule, so only files this
/// stage wrote count. Order follows `declared`.
pub fn remaining_timestamps(declared: &[String], produced: &[String]) -> Vec<String> {
    let covered: HashSet<String> = produced
        .iter()
        .filter_map(|f| timestamp::timestamp_from_filename(f))
        .collect();
    let mut seen = HashSet::new();
    declared
        .iter()
        .filter(|ts| !covered.contains(*ts) && seen.insert((*ts).clone()))
        .cloned()
        .collect()
}

/// `existing ++ new`, never dropping an existing entry and never duplicating.
pub fn merge_produced(existing: &[String], new: &[String]) -> Vec<String> {
    let mut merged = existing.to_vec();
    let mut seen: HashSet<&str> = existing.iter().map(String::as_str).collect();
    for name in new {
        if seen.insert(name.as_str()) {
            merged.push(name.clone());
        }
    }
    merged
}

// --- Summarize ---

/// Drive the summarize stage for one item.
///
/// Skips when already completed. Otherwise marks `in_progress`, calls the
/// summarizer, writes `summary.json` under `item_dir`, and records either
/// `completed` with the normalized section timestamps or `failed`.
pub async fn run_summarize_stage<S: Summarizer>(
    coordinator: &CoordinatorHandle,
    summarizer: &S,
    item: &ItemRecord,
    locale: &str,
    item_dir: &Path,
) -> Result<StageOutcome, String> {
    let tag = item_tag(&item.id, Some("summarize"));

    if item.summarize.status == StageStatus::Completed {
        log_debug!("{} Already completed, skipping", tag);
        return Ok(StageOutcome::Skipped);
    }

    coordinator
        .update_summary(&item.id, StageStatus::InProgress, None, None)
        .await?;

    let summary = match summarizer.summarize(&item.id, locale).await {
        Ok(s) => s,
        Err(e) => {
            log_warn!("{} Failed: {}", tag, e);
            coordinator
                .update_summary(&item.id, StageStatus::Failed, None, Some(e.clone()))
                .await?;
            return Ok(StageOutcome::Failed(e));
        }
    };

    let (timestamps, rejected) =
        timestamp::normalize_all(summary.sections.iter().map(|s| s.timestamp.as_str()));
    if !rejected.is_empty() {
        log_warn!(
            "{} Ignoring unparseable section timestamps: {}",
            tag,
            rejected.join(", ")
        );
    }

    if let Err(e) = write_summary(item_dir, &summary).await {
        log_warn!("{} {}", tag, e);
        coordinator
            .update_summary(&item.id, StageStatus::Failed, None, Some(e.clone()))
            .await?;
        return Ok(StageOutcome::Failed(e));
    }

    log_info!(
        "{} Completed ({} sections, {} timestamps)",
        tag,
        summary.sections.len(),
        timestamps.len()
    );
    coordinator
        .update_summary(&item.id, StageStatus::Completed, Some(timestamps), None)
        .await?;
    Ok(StageOutcome::Completed)
}

async fn write_summary(item_dir: &Path, summary: &crate::types::Summary) -> Result<(), String> {
    tokio::fs::create_dir_all(item_dir)
        .await
        .map_err(|e| format!("Failed to create {}: {}", item_dir.display(), e))?;
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| format!("Failed to serialize summary: {}", e))?;
    let path = item_dir.join(SUMMARY_FILE_NAME);
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

// --- Capture ---

/// Drive the capture stage for one item whose summarize stage completed.
///
/// Works on the set difference between the declared timestamps and the
/// screenshots already produced: only the remainder is requested, and newly
/// produced files are appended to the existing list as each one lands. Any capture failure
/// leaves the stage `failed` (with the partial progress kept) so the rest is
/// retried on the next run. `on_frame` is called with each captured timestamp.
pub async fn run_capture_stage<C, F>(
    coordinator: &CoordinatorHandle,
    capturer: &C,
    item: &ItemRecord,
    screenshots_dir: &Path,
    on_frame: &F,
) -> Result<StageOutcome, String>
where
    C: FrameCapturer,
    F: Fn(&str) + Sync,
{
    let tag = item_tag(&item.id, Some("capture"));

    if item.summarize.status != StageStatus::Completed {
        return Err(format!(
            "Cannot capture {}: summarize stage is {}",
            item.id, item.summarize.status
        ));
    }

    let declared = &item.summarize.timestamps;
    let existing = item.capture.files.clone();
    let remaining = remaining_timestamps(declared, &existing);

    if remaining.is_empty() {
        if item.capture.status == StageStatus::Completed && item.capture.total == declared.len()
        {
            log_debug!("{} Already satisfied, skipping", tag);
            return Ok(StageOutcome::Skipped);
        }
        // Everything is on record but the stage was never closed, e.g. the
        // process died right after the last frame
        coordinator
            .update_capture(
                &item.id,
                StageStatus::Completed,
                existing.len(),
                existing,
                None,
            )
            .await?;
        return Ok(StageOutcome::Completed);
    }

    log_info!(
        "{} Capturing {} of {} screenshots",
        tag,
        remaining.len(),
        declared.len()
    );
    coordinator
        .update_capture(
            &item.id,
            StageStatus::InProgress,
            existing.len(),
            existing.clone(),
            None,
        )
        .await?;

    if let Err(e) = tokio::fs::create_dir_all(screenshots_dir).await {
        let msg = format!("Failed to create {}: {}", screenshots_dir.display(), e);
        coordinator
            .update_capture(
                &item.id,
                StageStatus::Failed,
                existing.len(),
                existing,
                Some(msg.clone()),
            )
            .await?;
        return Ok(StageOutcome::Failed(msg));
    }

    let mut produced = Vec::with_capacity(remaining.len());
    let mut failures = Vec::new();
    for ts in &remaining {
        let file_name = timestamp::filename_for(ts);
        let path = screenshots_dir.join(&file_name);
        match capturer.capture(&item.id, ts, &path).await {
            Ok(()) => {
                log_debug!("{} Captured {}", tag, file_name);
                produced.push(file_name);
                // Record each frame as it lands so an interrupted run resumes after it
                let so_far = merge_produced(&existing, &produced);
                coordinator
                    .update_capture(
                        &item.id,
                        StageStatus::InProgress,
                        so_far.len(),
                        so_far,
                        None,
                    )
                    .await?;
                on_frame(ts);
            }
            Err(e) => {
                log_warn!("{} Frame at {} failed: {}", tag, ts, e);
                failures.push(format!("{}: {}", ts, e));
            }
        }
    }

    let merged = merge_produced(&existing, &produced);

    if failures.is_empty() {
        log_info!("{} Completed ({} screenshots)", tag, merged.len());
        coordinator
            .update_capture(
                &item.id,
                StageStatus::Completed,
                merged.len(),
                merged,
                None,
            )
            .await?;
        return Ok(StageOutcome::Completed);
    }

    let msg = format!(
        "{} of {} screenshots failed: {}",
        failures.len(),
        remaining.len(),
        failures.join("; ")
    );
    coordinator
        .update_capture(
            &item.id,
            StageStatus::Failed,
            merged.len(),
            merged,
            Some(msg.clone()),
        )
        .await?;
    Ok(StageOutcome::Failed(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn remaining_is_set_difference_in_declared_order() {
        let declared = strings(&["00:01:00", "00:05:00", "00:10:00"]);
        let produced = strings(&["00-01-00.png", "00-05-00.png"]);
        assert_eq!(remaining_timestamps(&declared, &produced), strings(&["00:10:00"]));
    }

    #[test]
    fn stray_files_do_not_cover_timestamps() {
        let declared = strings(&["00:01:00"]);
        let produced = strings(&["thumbnail.png", "00-01-00.jpg"]);
        assert_eq!(remaining_timestamps(&declared, &produced), declared);
    }

    #[test]
    fn merge_keeps_existing_and_skips_duplicates() {
        let existing = strings(&["a.png", "b.png"]);
        let new = strings(&["b.png", "c.png"]);
        assert_eq!(
            merge_produced(&existing, &new),
            strings(&["a.png", "b.png", "c.png"])
        );
    }
}
