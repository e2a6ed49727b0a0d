use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabrelay_core::{Result, TabRecord};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::coalescer::WriteCoalescer;
use crate::snapshot::{write_snapshot, TabSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedTab {
    pub tab_id: i64,
    pub window_id: i64,
    #[serde(default)]
    pub url: String,
    pub opened_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedWindow {
    pub window_id: i64,
    #[serde(default)]
    pub tab_ids: BTreeSet<i64>,
    pub opened_at: DateTime<Utc>,
}

/// Tabs and windows keyed by id. Every tab in a window's set points back at
/// that window, and no window has an empty set.
#[derive(Debug, Default)]
struct TabState {
    tabs: HashMap<i64, TrackedTab>,
    windows: HashMap<i64, TrackedWindow>,
}

impl TabState {
    fn from_snapshot(snapshot: TabSnapshot) -> Self {
        let window_opened: HashMap<i64, DateTime<Utc>> = snapshot
            .opened_windows
            .iter()
            .map(|w| (w.window_id, w.opened_at))
            .collect();

        let mut state = TabState::default();
        for tab in snapshot.opened_tabs {
            state.tabs.insert(tab.tab_id, tab);
        }
        // Membership is derived from the tabs so a stale window list can't break the invariant.
        for tab in state.tabs.values() {
            let opened_at = window_opened.get(&tab.window_id).copied().unwrap_or(tab.opened_at);
            state
                .windows
                .entry(tab.window_id)
                .or_insert_with(|| TrackedWindow {
                    window_id: tab.window_id,
                    tab_ids: BTreeSet::new(),
                    opened_at,
                })
                .tab_ids
                .insert(tab.tab_id);
        }
        state
    }

    fn snapshot(&self) -> TabSnapshot {
        let mut opened_tabs: Vec<TrackedTab> = self.tabs.values().cloned().collect();
        opened_tabs.sort_by_key(|t| t.tab_id);
        let mut opened_windows: Vec<TrackedWindow> = self.windows.values().cloned().collect();
        opened_windows.sort_by_key(|w| w.window_id);
        TabSnapshot {
            opened_tabs,
            opened_windows,
        }
    }

    fn upsert(&mut self, tab_id: i64, window_id: i64, url: Option<String>, now: DateTime<Utc>) {
        let moved_from = match self.tabs.get_mut(&tab_id) {
            Some(tab) => {
                let previous = tab.window_id;
                tab.window_id = window_id;
                if let Some(url) = url {
                    tab.url = url;
                }
                tab.last_updated = now;
                (previous != window_id).then_some(previous)
            }
            None => {
                self.tabs.insert(
                    tab_id,
                    TrackedTab {
                        tab_id,
                        window_id,
                        url: url.unwrap_or_default(),
                        opened_at: now,
                        last_updated: now,
                    },
                );
                None
            }
        };
        if let Some(previous) = moved_from {
            self.detach(tab_id, previous);
        }
        self.windows
            .entry(window_id)
            .or_insert_with(|| TrackedWindow {
                window_id,
                tab_ids: BTreeSet::new(),
                opened_at: now,
            })
            .tab_ids
            .insert(tab_id);
    }

    fn remove(&mut self, tab_id: i64) -> bool {
        match self.tabs.remove(&tab_id) {
            Some(tab) => {
                self.detach(tab_id, tab.window_id);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, tab_id: i64, window_id: i64) {
        let emptied = match self.windows.get_mut(&window_id) {
            Some(window) => {
                window.tab_ids.remove(&tab_id);
                window.tab_ids.is_empty()
            }
            None => false,
        };
        if emptied {
            self.windows.remove(&window_id);
            debug!(window_id, "Window emptied, removed");
        }
    }

    fn replace_all(&mut self, records: &[TabRecord], now: DateTime<Utc>) {
        self.tabs.clear();
        self.windows.clear();
        for record in records {
            self.upsert(record.tab_id, record.window_id, Some(record.url.clone()), now);
        }
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        for window in self.windows.values() {
            assert!(!window.tab_ids.is_empty(), "empty window {}", window.window_id);
            for tab_id in &window.tab_ids {
                let tab = self.tabs.get(tab_id).expect("window references missing tab");
                assert_eq!(tab.window_id, window.window_id);
            }
        }
        for tab in self.tabs.values() {
            let window = self.windows.get(&tab.window_id).expect("tab references missing window");
            assert!(window.tab_ids.contains(&tab.tab_id));
        }
    }
}

/// Reconciled view of the remote agent's tabs and windows.
///
/// Mutations apply in memory immediately; persistence is a coalesced
/// write-behind of the whole snapshot and never blocks the caller.
#[derive(Clone)]
pub struct TabStore {
    state: Arc<Mutex<TabState>>,
    persist: Option<WriteCoalescer>,
    path: Option<PathBuf>,
}

impl TabStore {
    /// Store without a backing file.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(Mutex::new(TabState::default())),
            persist: None,
            path: None,
        }
    }

    /// Open (or start) a store mirrored to `path`. A corrupt file is logged and ignored.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<TabSnapshot>(&content) {
                Ok(snapshot) => TabState::from_snapshot(snapshot),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Tab snapshot unreadable, starting empty");
                    TabState::default()
                }
            }
        } else {
            TabState::default()
        };
        info!(
            path = %path.display(),
            tabs = state.tabs.len(),
            windows = state.windows.len(),
            "Tab store opened"
        );

        let state = Arc::new(Mutex::new(state));
        let job_state = Arc::clone(&state);
        let job_path = path.clone();
        let persist = WriteCoalescer::new(move || {
            let state = Arc::clone(&job_state);
            let path = job_path.clone();
            async move {
                let snapshot = state.lock().await.snapshot();
                match write_snapshot(&path, &snapshot).await {
                    Ok(()) => debug!(
                        path = %path.display(),
                        tabs = snapshot.opened_tabs.len(),
                        "Tab snapshot saved"
                    ),
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to save tab snapshot"),
                }
            }
        });

        Ok(Self {
            state,
            persist: Some(persist),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert or overwrite a tab, moving it between windows if needed.
    /// `url: None` keeps the stored url (move events carry no url).
    pub async fn upsert_tab(&self, tab_id: i64, window_id: i64, url: Option<String>) {
        {
            let mut state = self.state.lock().await;
            state.upsert(tab_id, window_id, url, Utc::now());
        }
        debug!(tab_id, window_id, "Tab upserted");
        self.schedule_save();
    }

    /// Remove a tab and, if it was the last one, its window. Unknown ids are a logged no-op.
    pub async fn remove_tab(&self, tab_id: i64) -> bool {
        let removed = self.state.lock().await.remove(tab_id);
        if removed {
            debug!(tab_id, "Tab removed");
            self.schedule_save();
        } else {
            warn!(tab_id, "Remove requested for untracked tab");
        }
        removed
    }

    /// Discard everything and rebuild from `records`. No merge with prior state.
    pub async fn replace_all(&self, records: &[TabRecord]) -> usize {
        let (tabs, windows) = {
            let mut state = self.state.lock().await;
            state.replace_all(records, Utc::now());
            (state.tabs.len(), state.windows.len())
        };
        info!(tabs, windows, "Tab state resynchronised");
        self.schedule_save();
        tabs
    }

    /// All tracked tabs, ordered by tab id.
    pub async fn list_tabs(&self) -> Vec<TrackedTab> {
        self.state.lock().await.snapshot().opened_tabs
    }

    /// All tracked windows, ordered by window id.
    pub async fn list_windows(&self) -> Vec<TrackedWindow> {
        self.state.lock().await.snapshot().opened_windows
    }

    pub async fn get_tab(&self, tab_id: i64) -> Option<TrackedTab> {
        self.state.lock().await.tabs.get(&tab_id).cloned()
    }

    /// `(tabs, windows)`
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.tabs.len(), state.windows.len())
    }

    /// Wait for pending write-back to land on disk.
    pub async fn flush(&self) {
        if let Some(persist) = &self.persist {
            persist.flush().await;
        }
    }

    /// Completed snapshot writes since open.
    pub fn writes(&self) -> u64 {
        self.persist.as_ref().map(|p| p.writes()).unwrap_or(0)
    }

    fn schedule_save(&self) {
        if let Some(persist) = &self.persist {
            persist.schedule();
        }
    }
}
