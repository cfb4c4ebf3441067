//! Persisted per-target history: notification timestamps and the
//! consecutive start-failure counter.
//!
//! The store is deliberately forgiving: a missing or corrupt file loads
//! as an empty history and a failed save only costs this cycle's
//! updates. A periodic job must never be wedged by its own cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// History entry for a single target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetHistory {
    /// Unix timestamp (seconds) of the last notification, per event key.
    #[serde(default)]
    pub event_timestamps: HashMap<String, i64>,

    /// Consecutive start attempts that timed out without the instance
    /// reaching `Running`. Only reset by a confirmed successful start.
    #[serde(default)]
    pub start_failures: u32,
}

/// All persisted state, keyed by instance id.
///
/// Entries are created lazily on first write and never deleted here;
/// entries for targets that left the configuration are inert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    targets: HashMap<String, TargetHistory>,
}

impl History {
    /// True if the cooldown window for (target, event) has elapsed. A
    /// target or event that was never notified counts as elapsed.
    pub fn cooldown_elapsed(
        &self,
        instance_id: &str,
        event_key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let last = self
            .targets
            .get(instance_id)
            .and_then(|h| h.event_timestamps.get(event_key))
            .copied()
            .unwrap_or(0);
        now.timestamp() - last >= window.as_secs() as i64
    }

    pub fn mark_notified(&mut self, instance_id: &str, event_key: &str, now: DateTime<Utc>) {
        self.entry(instance_id)
            .event_timestamps
            .insert(event_key.to_string(), now.timestamp());
    }

    /// Drops the stored timestamp for an event so its next occurrence
    /// notifies immediately again.
    pub fn clear_event(&mut self, instance_id: &str, event_key: &str) {
        if let Some(history) = self.targets.get_mut(instance_id) {
            history.event_timestamps.remove(event_key);
        }
    }

    pub fn start_failures(&self, instance_id: &str) -> u32 {
        self.targets
            .get(instance_id)
            .map(|h| h.start_failures)
            .unwrap_or(0)
    }

    pub fn set_start_failures(&mut self, instance_id: &str, count: u32) {
        self.entry(instance_id).start_failures = count;
    }

    pub fn reset_start_failures(&mut self, instance_id: &str) {
        self.entry(instance_id).start_failures = 0;
    }

    pub fn target(&self, instance_id: &str) -> Option<&TargetHistory> {
        self.targets.get(instance_id)
    }

    fn entry(&mut self, instance_id: &str) -> &mut TargetHistory {
        self.targets.entry(instance_id.to_string()).or_default()
    }
}

/// File-backed store for [`History`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> StateStore {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted history. Missing file means first run; a
    /// corrupt file is logged and treated as empty.
    pub fn load(&self) -> History {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no state file at {:?}, starting empty", self.path);
                return History::default();
            }
            Err(e) => {
                warn!("failed to read state file {:?}: {e}", self.path);
                return History::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(e) => {
                warn!("state file {:?} is corrupt, starting empty: {e}", self.path);
                History::default()
            }
        }
    }

    /// Writes the history via a sibling temp file and rename, so a crash
    /// mid-write cannot leave a truncated state file behind.
    pub fn save(&self, history: &History) -> anyhow::Result<()> {
        let serialized = serde_json::to_string_pretty(history)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
