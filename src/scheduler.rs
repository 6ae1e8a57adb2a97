use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::collaborators::{FrameCapturer, Summarizer};
use crate::coordinator::CoordinatorHandle;
use crate::executor::{self, StageOutcome, SCREENSHOTS_DIR_NAME};
use crate::log::item_tag;
use crate::types::{Stage, StageStatus, Stats};
use crate::{log_debug, log_warn};

// --- Public types ---

/// Progress notifications produced by a pipeline run.
///
/// `finished` on the terminal events is a tally of items finished so far in
/// this run. Under concurrency items finish out of submission order, so it
/// says nothing about an item's position in the pending list.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ItemStarted {
        item_id: String,
        title: String,
    },
    StageStarted {
        item_id: String,
        stage: Stage,
    },
    ScreenshotCaptured {
        item_id: String,
        timestamp: String,
    },
    ItemCompleted {
        item_id: String,
        finished: usize,
        total: usize,
    },
    ItemFailed {
        item_id: String,
        error: String,
        finished: usize,
        total: usize,
    },
}

pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;

/// Terminal state of one item in this run.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Completed,
    Failed(String),
}

/// Result of a pipeline run, returned to the caller for summary display.
#[derive(Debug)]
pub struct RunSummary {
    pub attempted: usize,
    /// Item ids in completion order.
    pub succeeded: Vec<String>,
    /// Item ids in completion order.
    pub failed: Vec<String>,
    pub stats: Stats,
}

/// Parameters for running the pipeline.
pub struct PipelineParams {
    pub concurrency: usize,
    /// Per-collection output directory; item folders are created under it.
    pub output_dir: PathBuf,
}

/// Number of workers for a run: never more than there are items.
pub fn worker_count(concurrency: usize, pending: usize) -> usize {
    concurrency.max(1).min(pending)
}

// --- Worker pool ---

struct WorkerContext<S, C> {
    coordinator: CoordinatorHandle,
    summarizer: Arc<S>,
    capturer: Arc<C>,
    output_dir: PathBuf,
    locale: String,
    capture_enabled: bool,
    ids: Vec<String>,
    cursor: AtomicUsize,
    /// Terminal outcomes in completion order. Also serializes the
    /// finished tally with its event so events arrive in tally order.
    outcomes: Mutex<Vec<(String, ItemOutcome)>>,
    events: Option<EventSender>,
}

impl<S, C> WorkerContext<S, C> {
    fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.events {
            // Receiver gone just means nobody is listening
            let _ = tx.send(event);
        }
    }

    fn next_id(&self) -> Option<String> {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.ids.get(idx).cloned()
    }

    fn finish(&self, item_id: &str, outcome: ItemOutcome) {
        let mut outcomes = self
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        outcomes.push((item_id.to_string(), outcome.clone()));
        let finished = outcomes.len();
        let total = self.ids.len();
        match outcome {
            ItemOutcome::Completed => self.emit(PipelineEvent::ItemCompleted {
                item_id: item_id.to_string(),
                finished,
                total,
            }),
            ItemOutcome::Failed(error) => self.emit(PipelineEvent::ItemFailed {
                item_id: item_id.to_string(),
                error,
                finished,
                total,
            }),
        }
    }
}

/// Run both stages for every pending item on a bounded worker pool.
///
/// Exactly `min(concurrency, pending_ids.len())` workers pull ids from a
/// shared cursor and drive one item to a terminal state before pulling the
/// next. A failure (or panic) while processing one item is recorded into
/// that item's state and reported as `ItemFailed`; it never stops the other
/// workers. Returns once every item has been attempted.
pub async fn run_pipeline<S, C>(
    coordinator: &CoordinatorHandle,
    summarizer: Arc<S>,
    capturer: Arc<C>,
    pending_ids: Vec<String>,
    params: &PipelineParams,
    events: Option<EventSender>,
) -> Result<RunSummary, String>
where
    S: Summarizer + 'static,
    C: FrameCapturer + 'static,
{
    let snapshot = coordinator.get_snapshot().await?;
    let attempted = pending_ids.len();
    let workers = worker_count(params.concurrency, attempted);

    log_debug!(
        "Starting pipeline: {} items, {} workers",
        attempted,
        workers
    );

    let ctx = Arc::new(WorkerContext {
        coordinator: coordinator.clone(),
        summarizer,
        capturer,
        output_dir: params.output_dir.clone(),
        locale: snapshot.config.locale.clone(),
        capture_enabled: snapshot.config.screenshots,
        ids: pending_ids,
        cursor: AtomicUsize::new(0),
        outcomes: Mutex::new(Vec::with_capacity(attempted)),
        events,
    });

    let mut join_set = JoinSet::new();
    for _ in 0..workers {
        let ctx = Arc::clone(&ctx);
        join_set.spawn(async move { run_worker(ctx).await });
    }

    while let Some(result) = join_set.join_next().await {
        if let Err(e) = result {
            // Items are isolated inside the worker, so this is a bug
            log_warn!("Warning: worker task ended abnormally: {}", e);
        }
    }

    let outcomes = std::mem::take(
        &mut *ctx
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()),
    );

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (id, outcome) in outcomes {
        match outcome {
            ItemOutcome::Completed => succeeded.push(id),
            ItemOutcome::Failed(_) => failed.push(id),
        }
    }

    let stats = coordinator.stats().await?;

    Ok(RunSummary {
        attempted,
        succeeded,
        failed,
        stats,
    })
}

async fn run_worker<S, C>(ctx: Arc<WorkerContext<S, C>>)
where
    S: Summarizer + 'static,
    C: FrameCapturer + 'static,
{
    while let Some(item_id) = ctx.next_id() {
        let outcome = run_item_isolated(&ctx, &item_id).await;
        ctx.finish(&item_id, outcome);
    }
}

/// Per-item failure boundary. The item runs on its own task so a panic is
/// caught as a `JoinError` instead of taking the worker down with it.
async fn run_item_isolated<S, C>(ctx: &Arc<WorkerContext<S, C>>, item_id: &str) -> ItemOutcome
where
    S: Summarizer + 'static,
    C: FrameCapturer + 'static,
{
    let task_ctx = Arc::clone(ctx);
    let id = item_id.to_string();
    let result = match tokio::spawn(async move { process_item(&task_ctx, &id).await }).await {
        Ok(result) => result,
        Err(e) => Err(format!("Item task aborted: {}", e)),
    };

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            log_warn!("{} {}", item_tag(item_id, None), e);
            record_item_error(&ctx.coordinator, item_id, &e).await;
            ItemOutcome::Failed(e)
        }
    }
}

async fn process_item<S, C>(
    ctx: &WorkerContext<S, C>,
    item_id: &str,
) -> Result<ItemOutcome, String>
where
    S: Summarizer,
    C: FrameCapturer,
{
    let item = ctx
        .coordinator
        .get_item(item_id)
        .await?
        .ok_or_else(|| format!("Item {} is not tracked", item_id))?;

    ctx.emit(PipelineEvent::ItemStarted {
        item_id: item.id.clone(),
        title: item.title.clone(),
    });

    let item_dir = ctx.output_dir.join(&item.output_slug);

    if item.summarize.status != StageStatus::Completed {
        ctx.emit(PipelineEvent::StageStarted {
            item_id: item.id.clone(),
            stage: Stage::Summarize,
        });
    }
    let summarized = executor::run_summarize_stage(
        &ctx.coordinator,
        ctx.summarizer.as_ref(),
        &item,
        &ctx.locale,
        &item_dir,
    )
    .await?;
    if let StageOutcome::Failed(e) = summarized {
        return Ok(ItemOutcome::Failed(e));
    }

    if !ctx.capture_enabled {
        return Ok(ItemOutcome::Completed);
    }

    // Re-read: the summarize stage may have just seeded timestamps and total
    let item = ctx
        .coordinator
        .get_item(item_id)
        .await?
        .ok_or_else(|| format!("Item {} is not tracked", item_id))?;

    if item.capture.status != StageStatus::Completed {
        ctx.emit(PipelineEvent::StageStarted {
            item_id: item.id.clone(),
            stage: Stage::Capture,
        });
    }
    let on_frame = |ts: &str| {
        ctx.emit(PipelineEvent::ScreenshotCaptured {
            item_id: item_id.to_string(),
            timestamp: ts.to_string(),
        })
    };
    let captured = executor::run_capture_stage(
        &ctx.coordinator,
        ctx.capturer.as_ref(),
        &item,
        &item_dir.join(SCREENSHOTS_DIR_NAME),
        &on_frame,
    )
    .await?;

    match captured {
        StageOutcome::Failed(e) => Ok(ItemOutcome::Failed(e)),
        StageOutcome::Completed | StageOutcome::Skipped => Ok(ItemOutcome::Completed),
    }
}

/// Record an error that escaped the stage executors into whichever stage
/// was active: summarize if it has not completed, capture otherwise.
async fn record_item_error(coordinator: &CoordinatorHandle, item_id: &str, error: &str) {
    let item = match coordinator.get_item(item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => return,
        Err(e) => {
            log_warn!(
                "Warning: could not record failure for {}: {}",
                item_id,
                e
            );
            return;
        }
    };

    let result = if item.summarize.status != StageStatus::Completed {
        coordinator
            .update_summary(
                item_id,
                StageStatus::Failed,
                None,
                Some(error.to_string()),
            )
            .await
    } else {
        coordinator
            .update_capture(
                item_id,
                StageStatus::Failed,
                item.capture.completed,
                item.capture.files,
                Some(error.to_string()),
            )
            .await
    };

    if let Err(e) = result {
        log_warn!(
            "Warning: could not record failure for {}: {}",
            item_id,
            e
        );
    }
}
