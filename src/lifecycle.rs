//! Session retention and garbage collection.
//!
//! Sessions move `Active -> Stale -> removed`. A session is stale once its
//! age exceeds the retention window; a sweep deletes every stale session,
//! one at a time, so no lock is held for the duration of the whole sweep.
//! The periodic loop is an explicit schedulable task with a clean shutdown
//! signal rather than an uncancellable background loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::store::SessionBackend;
use crate::types::{RagError, SessionInfo};

/// Age classification of a live session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Active,
    Stale,
}

/// Summary of one sweep pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepReport {
    pub sessions_checked: usize,
    pub sessions_removed: usize,
    pub removed: Vec<String>,
}

/// Tracks session age and purges sessions past the retention window.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn SessionBackend>,
    retention: TimeDelta,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn SessionBackend>, retention_window: Duration) -> Self {
        let retention = TimeDelta::from_std(retention_window).unwrap_or(TimeDelta::MAX);
        Self { store, retention }
    }

    /// State of a session as of `now`: stale once age strictly exceeds the
    /// retention window.
    pub fn state_of(&self, info: &SessionInfo, now: DateTime<Utc>) -> SessionState {
        if now.signed_duration_since(info.created_at) > self.retention {
            SessionState::Stale
        } else {
            SessionState::Active
        }
    }

    /// Sweeps with the current wall clock.
    pub async fn sweep(&self) -> Result<SweepReport, RagError> {
        self.sweep_at(Utc::now()).await
    }

    /// Deletes every session stale as of `now`. Idempotent and safe to run
    /// concurrently with ingestion and retrieval on unrelated sessions.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, RagError> {
        let sessions = self.store.list().await?;
        let sessions_checked = sessions.len();
        let mut removed = Vec::new();

        for info in sessions {
            if self.state_of(&info, now) == SessionState::Stale {
                // Each delete takes and releases the store's lock on its own.
                if self.store.delete(&info.session_id).await? {
                    removed.push(info.session_id);
                }
            }
        }

        info!(
            sessions_checked,
            sessions_removed = removed.len(),
            "retention sweep complete"
        );
        Ok(SweepReport {
            sessions_checked,
            sessions_removed: removed.len(),
            removed,
        })
    }

    /// Ticking sweep loop. The first tick fires immediately, so starting
    /// the loop doubles as the startup sweep; later sweeps follow
    /// `interval`. Returns once `shutdown` flips to `true` or its sender is
    /// dropped.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        // tokio intervals tick at once on creation; that first tick is the
        // startup sweep, clearing sessions left over from a previous run.
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        warn!(error = %err, "retention sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("lifecycle loop stopped");
    }
}
