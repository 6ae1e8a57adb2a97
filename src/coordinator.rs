use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use crate::reconcile::{reconcile, ReconcileOutcome};
use crate::state;
use crate::types::{CollectionRecord, ItemRecord, SourceItem, StageStatus, Stats};
use crate::log_debug;

// --- Command enum ---

pub enum CoordinatorCommand {
    GetSnapshot {
        reply: oneshot::Sender<CollectionRecord>,
    },
    GetItem {
        id: String,
        reply: oneshot::Sender<Option<ItemRecord>>,
    },
    UpdateSummary {
        id: String,
        status: StageStatus,
        timestamps: Option<Vec<String>>,
        error: Option<String>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    UpdateCapture {
        id: String,
        status: StageStatus,
        completed: usize,
        files: Vec<String>,
        error: Option<String>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Reconcile {
        items: Vec<SourceItem>,
        reply: oneshot::Sender<Result<Vec<String>, String>>,
    },
    PendingIds {
        reply: oneshot::Sender<Vec<String>>,
    },
    FailedIds {
        reply: oneshot::Sender<Vec<String>>,
    },
    GetStats {
        reply: oneshot::Sender<Stats>,
    },
}

// --- CoordinatorHandle ---

/// Cloneable handle to the single task that owns the state document.
///
/// Every mutation and its save run inside that task, one command at a time,
/// so workers can never interleave a read-modify-write of the document.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    async fn send_command<T>(
        &self,
        command: CoordinatorCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, String> {
        self.sender
            .send(command)
            .await
            .map_err(|_| "coordinator shut down".to_string())?;
        rx.await
            .map_err(|_| "coordinator dropped reply".to_string())
    }

    pub async fn get_snapshot(&self) -> Result<CollectionRecord, String> {
        let (reply, rx) = oneshot::channel();
        self.send_command(CoordinatorCommand::GetSnapshot { reply }, rx)
            .await
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>, String> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            CoordinatorCommand::GetItem {
                id: id.to_string(),
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn update_summary(
        &self,
        id: &str,
        status: StageStatus,
        timestamps: Option<Vec<String>>,
        error: Option<String>,
    ) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            CoordinatorCommand::UpdateSummary {
                id: id.to_string(),
                status,
                timestamps,
                error,
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn update_capture(
        &self,
        id: &str,
        status: StageStatus,
        completed: usize,
        files: Vec<String>,
        error: Option<String>,
    ) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            CoordinatorCommand::UpdateCapture {
                id: id.to_string(),
                status,
                completed,
                files,
                error,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Merge `items` into tracked state. Returns the ids newly added.
    pub async fn reconcile(&self, items: Vec<SourceItem>) -> Result<Vec<String>, String> {
        let (reply, rx) = oneshot::channel();
        self.send_command(CoordinatorCommand::Reconcile { items, reply }, rx)
            .await?
    }

    pub async fn pending_ids(&self) -> Result<Vec<String>, String> {
        let (reply, rx) = oneshot::channel();
        self.send_command(CoordinatorCommand::PendingIds { reply }, rx)
            .await
    }

    pub async fn failed_ids(&self) -> Result<Vec<String>, String> {
        let (reply, rx) = oneshot::channel();
        self.send_command(CoordinatorCommand::FailedIds { reply }, rx)
            .await
    }

    pub async fn stats(&self) -> Result<Stats, String> {
        let (reply, rx) = oneshot::channel();
        self.send_command(CoordinatorCommand::GetStats { reply }, rx)
            .await
    }
}

// --- Actor implementation ---

const CHANNEL_CAPACITY: usize = 32;

struct CoordinatorState {
    record: CollectionRecord,
    state_path: PathBuf,
}

impl CoordinatorState {
    fn persist(&mut self) -> Result<(), String> {
        state::touch_and_save(&self.state_path, &mut self.record)
    }
}

fn handle_update_summary(
    state: &mut CoordinatorState,
    id: &str,
    status: StageStatus,
    timestamps: Option<Vec<String>>,
    error: Option<String>,
) -> Result<(), String> {
    if !state::apply_summary_update(&mut state.record, id, status, timestamps, error) {
        log_debug!("Ignoring summarize update for untracked item {}", id);
        return Ok(());
    }
    state.persist()
}

fn handle_update_capture(
    state: &mut CoordinatorState,
    id: &str,
    status: StageStatus,
    completed: usize,
    files: Vec<String>,
    error: Option<String>,
) -> Result<(), String> {
    if !state::apply_capture_update(&mut state.record, id, status, completed, files, error) {
        log_debug!("Ignoring capture update for untracked item {}", id);
        return Ok(());
    }
    state.persist()
}

fn handle_reconcile(
    state: &mut CoordinatorState,
    items: &[SourceItem],
) -> Result<Vec<String>, String> {
    let ReconcileOutcome { added, changed } = reconcile(&mut state.record, items);
    if changed {
        state.persist()?;
    }
    Ok(added)
}

async fn run_coordinator(
    mut rx: mpsc::Receiver<CoordinatorCommand>,
    record: CollectionRecord,
    state_path: PathBuf,
) {
    let mut state = CoordinatorState { record, state_path };

    while let Some(cmd) = rx.recv().await {
        match cmd {
            CoordinatorCommand::GetSnapshot { reply } => {
                let _ = reply.send(state.record.clone());
            }
            CoordinatorCommand::GetItem { id, reply } => {
                let _ = reply.send(state.record.find_item(&id).cloned());
            }
            CoordinatorCommand::UpdateSummary {
                id,
                status,
                timestamps,
                error,
                reply,
            } => {
                let result = handle_update_summary(&mut state, &id, status, timestamps, error);
                let _ = reply.send(result);
            }
            CoordinatorCommand::UpdateCapture {
                id,
                status,
                completed,
                files,
                error,
                reply,
            } => {
                let result =
                    handle_update_capture(&mut state, &id, status, completed, files, error);
                let _ = reply.send(result);
            }
            CoordinatorCommand::Reconcile { items, reply } => {
                let result = handle_reconcile(&mut state, &items);
                let _ = reply.send(result);
            }
            CoordinatorCommand::PendingIds { reply } => {
                let _ = reply.send(state::pending_ids(&state.record));
            }
            CoordinatorCommand::FailedIds { reply } => {
                let _ = reply.send(state::failed_ids(&state.record));
            }
            CoordinatorCommand::GetStats { reply } => {
                let _ = reply.send(state::stats(&state.record));
            }
        }
    }

    // Shutdown: nothing to flush, every mutation was saved as it happened
}

// --- Spawn ---

pub fn spawn_coordinator(
    record: CollectionRecord,
    state_path: PathBuf,
) -> (CoordinatorHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let task_handle = tokio::spawn(run_coordinator(rx, record, state_path));

    (CoordinatorHandle { sender: tx }, task_handle)
}
