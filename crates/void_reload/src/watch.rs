//! File watching for unit sources
//!
//! Maps changed origin files back to unit names and asks a
//! [`DependencyTracker`] to reload them once the debounce window has passed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Instant;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::ReloadConfig;
use crate::error::{Result, WatchError};
use crate::propagate::ReloadReport;
use crate::tracker::DependencyTracker;
use crate::unit::{UnitHandle, UnitName};

/// Watches unit origins and turns file changes into reloads
pub struct UnitWatcher {
    config: ReloadConfig,
    /// Kept alive for as long as events should flow
    _watcher: Option<RecommendedWatcher>,
    receiver: Option<Receiver<notify::Result<Event>>>,
    origins: HashMap<PathBuf, UnitName>,
    pending: HashMap<PathBuf, Instant>,
}

impl UnitWatcher {
    /// Start watching the configured directories
    pub fn new(config: ReloadConfig) -> std::result::Result<Self, WatchError> {
        config.validate()?;

        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| WatchError::Create(e.to_string()))?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        for dir in &config.watch_directories {
            watcher.watch(dir, mode).map_err(|e| WatchError::Watch {
                path: dir.clone(),
                message: e.to_string(),
            })?;
            log::info!("Watching unit sources in {}", dir.display());
        }

        Ok(Self {
            config,
            _watcher: Some(watcher),
            receiver: Some(rx),
            origins: HashMap::new(),
            pending: HashMap::new(),
        })
    }

    /// A watcher fed only through [`mark_changed`](Self::mark_changed),
    /// for hosts that get change notifications from elsewhere
    pub fn manual(config: ReloadConfig) -> Self {
        Self {
            config,
            _watcher: None,
            receiver: None,
            origins: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Start reacting to changes of the unit's origin file.
    ///
    /// Returns `false` for units without an origin or without a name.
    pub fn track(&mut self, unit: &UnitHandle) -> bool {
        let (Some(name), Some(origin)) = (unit.name(), unit.origin()) else {
            return false;
        };
        log::debug!("Tracking {} for unit {}", origin.display(), name);
        self.origins.insert(normalize(origin), name.clone());
        true
    }

    /// Stop reacting to changes of `origin`
    pub fn untrack(&mut self, origin: &Path) -> Option<UnitName> {
        let key = normalize(origin);
        self.pending.remove(&key);
        self.origins.remove(&key)
    }

    /// Record a change by hand
    pub fn mark_changed(&mut self, path: &Path) {
        let key = normalize(path);
        if self.origins.contains_key(&key) && self.config.accepts(&key) {
            self.pending.insert(key, Instant::now());
        }
    }

    /// Number of changes waiting for their debounce window
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drain file events and reload every unit whose change has settled.
    ///
    /// Each settled change is consumed whether or not its reload succeeds.
    pub fn poll(&mut self, tracker: &DependencyTracker) -> Vec<(UnitName, Result<ReloadReport>)> {
        self.drain_events();

        let debounce = self.config.debounce();
        let now = Instant::now();
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, at)| now.duration_since(**at) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();
        due.sort();

        let mut results = Vec::new();
        for path in due {
            self.pending.remove(&path);
            let Some(name) = self.origins.get(&path).cloned() else {
                continue;
            };

            match tracker.reload_by_name(name.as_str()) {
                Ok(Some(report)) => results.push((name, Ok(report))),
                Ok(None) => log::debug!("Changed unit {} is not loaded, skipping", name),
                Err(e) => {
                    log::error!("Failed to reload {}: {}", name, e);
                    results.push((name, Err(e)));
                }
            }
        }
        results
    }

    fn drain_events(&mut self) {
        let Some(rx) = &self.receiver else {
            return;
        };

        let mut changed = Vec::new();
        while let Ok(result) = rx.try_recv() {
            match result {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        changed.extend(event.paths);
                    }
                }
                Err(e) => log::warn!("File watch error: {}", e),
            }
        }

        for path in changed {
            self.mark_changed(&path);
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
