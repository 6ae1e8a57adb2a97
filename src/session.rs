use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;

use crate::collaborators::{CatalogFetcher, CatalogPlaylist};
use crate::coordinator::{spawn_coordinator, CoordinatorHandle};
use crate::error::DigestError;
use crate::state;
use crate::types::{CollectionRecord, RunConfig};
use crate::{log_info, log_warn};

/// A collection ready to be driven by the pipeline.
pub struct Session {
    pub coordinator: CoordinatorHandle,
    pub coordinator_task: JoinHandle<()>,
    pub state_path: PathBuf,
    /// True when this run created the state document.
    pub created: bool,
    /// Ids reconciliation appended to an existing document.
    pub added: Vec<String>,
    /// Run config stored in the document, which governs this run.
    pub config: RunConfig,
}

/// Fetch the collection, treating an unreachable or empty one as a
/// precondition failure.
pub async fn fetch_catalog<F: CatalogFetcher>(
    fetcher: &F,
    playlist_id: &str,
) -> Result<CatalogPlaylist, DigestError> {
    let catalog = fetcher
        .fetch_playlist(playlist_id)
        .await
        .map_err(|e| DigestError::CollectionNotFound(format!("{}: {}", playlist_id, e)))?;

    if catalog.items.is_empty() {
        return Err(DigestError::EmptyCollection(playlist_id.to_string()));
    }

    Ok(catalog)
}

/// Run config for this run. An existing document's stored config wins; a
/// differing request is reported and ignored.
pub fn resolve_run_config(stored: Option<&CollectionRecord>, requested: RunConfig) -> RunConfig {
    match stored {
        None => requested,
        Some(record) => {
            if record.config != requested {
                log_warn!(
                    "Warning: {} was started with locale={}, screenshots={}; \
                     ignoring requested locale={}, screenshots={}",
                    record.playlist_id,
                    record.config.locale,
                    record.config.screenshots,
                    requested.locale,
                    requested.screenshots
                );
            }
            record.config.clone()
        }
    }
}

/// Load the stored document for a collection, if any.
pub fn load_existing(
    state_dir: &Path,
    playlist_id: &str,
) -> Result<Option<CollectionRecord>, DigestError> {
    state::load(&state::state_path(state_dir, playlist_id)).map_err(DigestError::State)
}

/// Initialize or reconcile the state document against `catalog` and hand it
/// to a freshly spawned coordinator.
pub async fn open_collection(
    state_dir: &Path,
    playlist_id: &str,
    existing: Option<CollectionRecord>,
    catalog: &CatalogPlaylist,
    requested: RunConfig,
) -> Result<Session, DigestError> {
    let state_path = state::state_path(state_dir, playlist_id);
    std::fs::create_dir_all(state_dir).map_err(|e| {
        DigestError::State(format!("Failed to create {}: {}", state_dir.display(), e))
    })?;

    let created = existing.is_none();
    let record = match existing {
        Some(record) => record,
        None => {
            log_info!(
                "Tracking new collection {} ({} items)",
                playlist_id,
                catalog.items.len()
            );
            state::initialize(
                &state_path,
                playlist_id,
                &catalog.title,
                requested,
                &catalog.items,
            )
            .map_err(DigestError::State)?
        }
    };
    let config = record.config.clone();

    let (coordinator, coordinator_task) = spawn_coordinator(record, state_path.clone());

    let added = coordinator
        .reconcile(catalog.items.clone())
        .await
        .map_err(DigestError::State)?;
    if !added.is_empty() {
        log_info!(
            "Collection {} grew by {} item(s): {}",
            playlist_id,
            added.len(),
            added.join(", ")
        );
    }

    Ok(Session {
        coordinator,
        coordinator_task,
        state_path,
        created,
        added,
        config,
    })
}
