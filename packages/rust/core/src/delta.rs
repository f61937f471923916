//! Marker-driven task resynchronization.
//!
//! A [`DeltaSynchronizer`] regenerates task specs from persisted lexemes and
//! inflections. The first run (or a forced one) covers every lexeme; later
//! runs only touch lexemes changed since the stored marker.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use lexsync_shared::{LexsyncError, Result, TaskSpecSeed};
use lexsync_storage::{BatchOptions, Entity, Storage};

use crate::lexeme::word_from_persisted;
use crate::templates::generate_tasks;

/// `sync_state` key holding the latest touched timestamp.
pub const SYNC_MARKER_KEY: &str = "delta_sync.latest_touched_at";

/// Persistence for the sync marker.
#[allow(async_fn_in_trait)]
pub trait MarkerStore {
    async fn get_marker(&self) -> Result<Option<String>>;
    async fn set_marker(&self, marker: &str) -> Result<()>;
    async fn clear_marker(&self) -> Result<()>;
}

impl MarkerStore for Storage {
    async fn get_marker(&self) -> Result<Option<String>> {
        self.get_state(SYNC_MARKER_KEY).await
    }

    async fn set_marker(&self, marker: &str) -> Result<()> {
        self.set_state(SYNC_MARKER_KEY, marker).await
    }

    async fn clear_marker(&self) -> Result<()> {
        self.clear_state(SYNC_MARKER_KEY).await
    }
}

/// Process-local marker store.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    marker: Mutex<Option<String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkerStore for MemoryMarkerStore {
    async fn get_marker(&self) -> Result<Option<String>> {
        Ok(self
            .marker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn set_marker(&self, marker: &str) -> Result<()> {
        *self.marker.lock().unwrap_or_else(PoisonError::into_inner) = Some(marker.to_string());
        Ok(())
    }

    async fn clear_marker(&self) -> Result<()> {
        *self.marker.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// In-process view of the last successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Synced(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Delta,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Delta => "delta",
        }
    }
}

/// What one sync pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub mode: SyncMode,
    pub lexemes: usize,
    pub tasks_written: u64,
    pub tasks_removed: u64,
    /// Words whose tasks could not be regenerated.
    pub failed: Vec<String>,
    /// Latest touched timestamp; `None` when a delta found nothing to do.
    pub latest_touched_at: Option<String>,
}

pub struct DeltaSynchronizer<'a, M: MarkerStore> {
    storage: &'a Storage,
    markers: &'a M,
    options: BatchOptions,
    state: SyncState,
}

impl<'a, M: MarkerStore> DeltaSynchronizer<'a, M> {
    pub fn new(storage: &'a Storage, markers: &'a M, options: BatchOptions) -> Self {
        Self {
            storage,
            markers,
            options,
            state: SyncState::Idle,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Forget the cached and persisted marker; the next run is a full sync.
    pub async fn reset(&mut self) -> Result<()> {
        self.state = SyncState::Idle;
        self.markers.clear_marker().await?;
        info!("sync marker reset");
        Ok(())
    }

    /// Regenerate tasks for every lexeme.
    #[instrument(skip_all)]
    pub async fn full_sync(&mut self) -> Result<SyncOutcome> {
        let lexeme_ids = self.storage.list_ids(Entity::Lexeme).await?;
        let mut outcome = self.regenerate(&lexeme_ids, false).await?;
        outcome.mode = SyncMode::Full;
        outcome.latest_touched_at = self.storage.max_updated_at().await?;
        if let Some(marker) = &outcome.latest_touched_at {
            self.state = SyncState::Synced(marker.clone());
        }
        info!(
            lexemes = outcome.lexemes,
            written = outcome.tasks_written,
            removed = outcome.tasks_removed,
            "full sync complete"
        );
        Ok(outcome)
    }

    /// Regenerate tasks for lexemes whose row or inflections changed after
    /// `since`. Their tasks are always rewritten so `updated_at` advances.
    #[instrument(skip_all, fields(since = %since))]
    pub async fn delta_sync(&mut self, since: &str) -> Result<SyncOutcome> {
        let changed = self.storage.lexeme_ids_changed_since(since).await?;
        if changed.is_empty() {
            debug!("no lexemes changed");
            return Ok(SyncOutcome {
                mode: SyncMode::Delta,
                lexemes: 0,
                tasks_written: 0,
                tasks_removed: 0,
                failed: Vec::new(),
                latest_touched_at: None,
            });
        }

        let mut outcome = self.regenerate(&changed, true).await?;
        outcome.mode = SyncMode::Delta;
        outcome.latest_touched_at = self.storage.max_updated_at().await?;
        if let Some(marker) = &outcome.latest_touched_at {
            self.state = SyncState::Synced(marker.clone());
        }
        info!(
            lexemes = outcome.lexemes,
            written = outcome.tasks_written,
            removed = outcome.tasks_removed,
            "delta sync complete"
        );
        Ok(outcome)
    }

    /// Read the marker, run a full or delta pass, persist the new marker.
    pub async fn run(&mut self, force_full: bool) -> Result<SyncOutcome> {
        let marker = match &self.state {
            SyncState::Synced(marker) => Some(marker.clone()),
            SyncState::Idle => self.markers.get_marker().await?,
        };

        let outcome = match marker {
            Some(since) if !force_full => self.delta_sync(&since).await?,
            _ => self.full_sync().await?,
        };

        if let Some(marker) = &outcome.latest_touched_at {
            self.markers.set_marker(marker).await?;
        }
        Ok(outcome)
    }

    async fn regenerate(&self, lexeme_ids: &[String], touch: bool) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome {
            mode: SyncMode::Delta,
            lexemes: 0,
            tasks_written: 0,
            tasks_removed: 0,
            failed: Vec::new(),
            latest_touched_at: None,
        };

        for id in lexeme_ids {
            if self.options.cancel.is_cancelled() {
                return Err(LexsyncError::Cancelled);
            }
            let Some(lexeme) = self.storage.get_lexeme(id).await? else {
                continue;
            };
            let inflections = self.storage.inflections_for(id).await?;
            let word = word_from_persisted(&lexeme, &inflections);

            let tasks: Vec<TaskSpecSeed> = match generate_tasks(&word, id) {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(lexeme = %id, error = %e, "task regeneration failed, keeping existing tasks");
                    outcome.failed.push(id.clone());
                    continue;
                }
            };

            let existing: Vec<String> = self
                .storage
                .tasks_for(id)
                .await?
                .into_iter()
                .map(|t| t.id)
                .collect();
            let fresh: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
            let stale: Vec<String> = existing
                .into_iter()
                .filter(|t| !fresh.contains(t.as_str()))
                .collect();

            outcome.tasks_written += self.storage.upsert_tasks(&tasks, touch, &self.options).await?;
            outcome.tasks_removed += self
                .storage
                .delete_ids(Entity::TaskSpec, &stale, &self.options)
                .await?;
            outcome.lexemes += 1;
        }
        Ok(outcome)
    }
}
