mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use playlist_digest::collaborators::{MockCapturer, MockSummarizer, Summarizer};
use playlist_digest::coordinator::{spawn_coordinator, CoordinatorHandle};
use playlist_digest::scheduler::{run_pipeline, PipelineEvent, PipelineParams};
use playlist_digest::state;
use playlist_digest::types::{StageStatus, Summary};

// --- Test helpers ---

fn params(concurrency: usize, output_dir: PathBuf) -> PipelineParams {
    PipelineParams {
        concurrency,
        output_dir,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn finished_tallies(events: &[PipelineEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::ItemCompleted { finished, .. }
            | PipelineEvent::ItemFailed { finished, .. } => Some(*finished),
            _ => None,
        })
        .collect()
}

async fn start(ids: &[&str], screenshots: bool) -> (tempfile::TempDir, PathBuf, CoordinatorHandle) {
    let (dir, path) = common::state_env("PL1");
    let record = common::init_record(&path, ids, screenshots);
    let (handle, _task) = spawn_coordinator(record, path.clone());
    (dir, path, handle)
}

/// Panics for one video, delegates otherwise.
struct PanickingSummarizer {
    inner: MockSummarizer,
    panic_on: String,
}

impl Summarizer for PanickingSummarizer {
    async fn summarize(&self, video_id: &str, locale: &str) -> Result<Summary, String> {
        if video_id == self.panic_on {
            panic!("summarizer exploded on {}", video_id);
        }
        self.inner.summarize(video_id, locale).await
    }
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn one_failing_item_does_not_affect_siblings() {
    let ids = ["v1", "v2", "v3", "v4", "v5"];
    let (dir, path, handle) = start(&ids, true).await;
    let summarizer = Arc::new(
        MockSummarizer::new(common::summary_with(&["00:00:30", "00:01:30"]))
            .with_failure("v2", "transcript unavailable")
            .with_delay(Duration::from_millis(30)),
    );
    let capturer = Arc::new(MockCapturer::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let pending = handle.pending_ids().await.expect("pending");
    let summary = run_pipeline(
        &handle,
        summarizer.clone(),
        capturer.clone(),
        pending,
        &params(3, dir.path().join("out")),
        Some(tx),
    )
    .await
    .expect("pipeline");

    assert_eq!(summary.attempted, 5);
    assert_eq!(summary.failed, vec!["v2"]);
    assert_eq!(summary.succeeded.len(), 4);
    assert_eq!(summary.stats.completed, 4);
    assert_eq!(summary.stats.failed, 1);

    let mut called = summarizer.calls();
    called.sort();
    assert_eq!(called, ids);
    assert_eq!(summarizer.probe.peak(), 3);

    let stored = state::load(&path).expect("load").expect("exists");
    let v2 = stored.find_item("v2").expect("tracked");
    assert_eq!(v2.summarize.status, StageStatus::Failed);
    assert_eq!(v2.summarize.error.as_deref(), Some("transcript unavailable"));
    assert_eq!(v2.capture.status, StageStatus::Pending);
    for id in ["v1", "v3", "v4", "v5"] {
        let item = stored.find_item(id).expect("tracked");
        assert_eq!(item.summarize.status, StageStatus::Completed, "{}", id);
        assert_eq!(item.capture.status, StageStatus::Completed, "{}", id);
        assert_eq!(item.capture.files.len(), 2, "{}", id);
    }
    // Capture never ran for the failed item
    assert!(capturer.calls().iter().all(|(id, _)| id != "v2"));

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::ItemFailed { item_id, error, .. }
            if item_id == "v2" && error == "transcript unavailable"
    )));
}

#[tokio::test]
async fn panicking_item_is_recorded_as_failed() {
    let (dir, path, handle) = start(&["v1", "v2", "v3"], false).await;
    let summarizer = Arc::new(PanickingSummarizer {
        inner: MockSummarizer::new(Summary::default()),
        panic_on: "v2".to_string(),
    });

    let pending = handle.pending_ids().await.expect("pending");
    let summary = run_pipeline(
        &handle,
        summarizer,
        Arc::new(MockCapturer::new()),
        pending,
        &params(2, dir.path().join("out")),
        None,
    )
    .await
    .expect("pipeline");

    assert_eq!(summary.failed, vec!["v2"]);
    assert_eq!(summary.succeeded.len(), 2);

    let stored = state::load(&path).expect("load").expect("exists");
    let v2 = stored.find_item("v2").expect("tracked");
    assert_eq!(v2.summarize.status, StageStatus::Failed);
    assert!(v2.summarize.error.is_some());
    assert_eq!(state::failed_ids(&stored), vec!["v2"]);
}

// =============================================================================
// Concurrency and progress
// =============================================================================

#[tokio::test]
async fn concurrency_one_runs_items_in_pending_order() {
    let (dir, _path, handle) = start(&["a", "b", "c"], false).await;
    let summarizer = Arc::new(
        MockSummarizer::new(Summary::default()).with_delay(Duration::from_millis(5)),
    );

    let pending = handle.pending_ids().await.expect("pending");
    let summary = run_pipeline(
        &handle,
        summarizer.clone(),
        Arc::new(MockCapturer::new()),
        pending,
        &params(1, dir.path().join("out")),
        None,
    )
    .await
    .expect("pipeline");

    assert_eq!(summarizer.calls(), vec!["a", "b", "c"]);
    assert_eq!(summarizer.probe.peak(), 1);
    assert_eq!(summary.succeeded, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn workers_never_exceed_pending_count() {
    let (dir, _path, handle) = start(&["a", "b"], false).await;
    let summarizer = Arc::new(
        MockSummarizer::new(Summary::default()).with_delay(Duration::from_millis(20)),
    );

    let pending = handle.pending_ids().await.expect("pending");
    run_pipeline(
        &handle,
        summarizer.clone(),
        Arc::new(MockCapturer::new()),
        pending,
        &params(8, dir.path().join("out")),
        None,
    )
    .await
    .expect("pipeline");

    assert_eq!(summarizer.probe.peak(), 2);
}

#[tokio::test]
async fn finished_tally_counts_up_once_per_item() {
    let ids = ["a", "b", "c", "d", "e", "f"];
    let (dir, _path, handle) = start(&ids, true).await;
    let summarizer = Arc::new(
        MockSummarizer::new(common::summary_with(&["00:00:01"]))
            .with_failure("c", "nope")
            .with_delay(Duration::from_millis(5)),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();

    let pending = handle.pending_ids().await.expect("pending");
    run_pipeline(
        &handle,
        summarizer,
        Arc::new(MockCapturer::new()),
        pending,
        &params(3, dir.path().join("out")),
        Some(tx),
    )
    .await
    .expect("pipeline");

    let events = drain(&mut rx);
    assert_eq!(finished_tallies(&events), vec![1, 2, 3, 4, 5, 6]);
    assert!(events.iter().all(|e| match e {
        PipelineEvent::ItemCompleted { total, .. } | PipelineEvent::ItemFailed { total, .. } =>
            *total == 6,
        _ => true,
    }));
    let started = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::ItemStarted { .. }))
        .count();
    assert_eq!(started, 6);
    let shots = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::ScreenshotCaptured { .. }))
        .count();
    assert_eq!(shots, 5);
}

// =============================================================================
// Stage wiring
// =============================================================================

#[tokio::test]
async fn screenshots_disabled_skips_capture() {
    let (dir, path, handle) = start(&["a", "b"], false).await;
    let capturer = Arc::new(MockCapturer::new());

    let pending = handle.pending_ids().await.expect("pending");
    let summary = run_pipeline(
        &handle,
        Arc::new(MockSummarizer::new(common::summary_with(&["00:01:00"]))),
        capturer.clone(),
        pending,
        &params(2, dir.path().join("out")),
        None,
    )
    .await
    .expect("pipeline");

    assert!(capturer.calls().is_empty());
    assert_eq!(summary.stats.completed, 2);
    let stored = state::load(&path).expect("load").expect("exists");
    assert_eq!(
        stored.find_item("a").expect("tracked").capture.status,
        StageStatus::Pending
    );
}

#[tokio::test]
async fn outputs_land_under_item_slug() {
    let (dir, _path, handle) = start(&["a"], true).await;
    let out = dir.path().join("out").join("PL1");

    let pending = handle.pending_ids().await.expect("pending");
    run_pipeline(
        &handle,
        Arc::new(MockSummarizer::new(common::summary_with(&["01:02"]))),
        Arc::new(MockCapturer::new()),
        pending,
        &params(1, out.clone()),
        None,
    )
    .await
    .expect("pipeline");

    let item_dir = out.join("01-video-a");
    assert!(item_dir.join("summary.json").exists());
    assert!(item_dir.join("screenshots").join("00-01-02.png").exists());
}

#[tokio::test]
async fn resumed_item_only_runs_remaining_stage() {
    let (dir, path) = common::state_env("PL1");
    let mut record = common::init_record(&path, &["a"], true);
    common::mark_summarized(&mut record, "a", &["00:00:10"]);
    common::item_mut(&mut record, "a").capture.status = StageStatus::InProgress;
    let (handle, _task) = spawn_coordinator(record, path);
    let summarizer = Arc::new(MockSummarizer::new(Summary::default()));
    let capturer = Arc::new(MockCapturer::new());

    let pending = handle.pending_ids().await.expect("pending");
    assert_eq!(pending, vec!["a"]);
    let summary = run_pipeline(
        &handle,
        summarizer.clone(),
        capturer.clone(),
        pending,
        &params(1, dir.path().join("out")),
        None,
    )
    .await
    .expect("pipeline");

    assert!(summarizer.calls().is_empty());
    assert_eq!(capturer.calls().len(), 1);
    assert_eq!(summary.succeeded, vec!["a"]);
}

#[tokio::test]
async fn empty_pending_list_returns_stats() {
    let (dir, _path, handle) = start(&["a"], true).await;

    let summary = run_pipeline(
        &handle,
        Arc::new(MockSummarizer::new(Summary::default())),
        Arc::new(MockCapturer::new()),
        Vec::new(),
        &params(4, dir.path().join("out")),
        None,
    )
    .await
    .expect("pipeline");

    assert_eq!(summary.attempted, 0);
    assert_eq!(summary.stats.pending, 1);
}
