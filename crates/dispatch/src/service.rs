use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tabrelay_core::{DispatchConfig, Error, Result, TabRecord, TabReport, Task, TaskCommand, TaskRequest};
use tabrelay_storage::{TabStore, TrackedTab, TrackedWindow};
use tracing::{debug, info, warn};

use crate::queue::TaskQueue;
use crate::rendezvous::{Rendezvous, WaitHandle};

/// Point-in-time counters for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStats {
    pub queued_tasks: usize,
    pub pending_waits: usize,
    pub tracked_tabs: usize,
    pub tracked_windows: usize,
}

/// Façade over the task queue, the rendezvous table and the tab store.
#[derive(Clone)]
pub struct Dispatcher {
    queue: TaskQueue,
    waits: Rendezvous,
    tabs: TabStore,
    task_timeout: Duration,
}

impl Dispatcher {
    pub fn new(tabs: TabStore, task_timeout: Duration) -> Self {
        Self {
            queue: TaskQueue::new(),
            waits: Rendezvous::new(),
            tabs,
            task_timeout,
        }
    }

    pub fn from_config(config: &DispatchConfig, tabs: TabStore) -> Self {
        Self::new(tabs, config.task_timeout())
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    pub fn tabs(&self) -> &TabStore {
        &self.tabs
    }

    /// Validate, enqueue, and suspend until the executor reports or the deadline passes.
    pub async fn submit_task(&self, request: TaskRequest) -> Result<(Task, Value)> {
        let task = request.into_task()?;
        let handle = self.enqueue(task.clone()).await?;
        info!(task_id = %task.task_id, command = %task.command, "Task queued");

        match handle.wait().await {
            Ok(result) => {
                info!(task_id = %task.task_id, "Task completed");
                Ok((task, result))
            }
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "Task did not complete");
                Err(e)
            }
        }
    }

    /// Register the wait and make the task visible to pollers, without waiting.
    ///
    /// The wait exists before the task can be pulled, so a report can never
    /// arrive ahead of it. A queued `switchTab` for the same tab, or a queued
    /// task with the same id, is a conflict and leaves the queue untouched.
    pub async fn enqueue(&self, task: Task) -> Result<WaitHandle> {
        let handle = self.waits.register_wait(&task.task_id, self.task_timeout).await?;

        let task_id = task.task_id.clone();
        let switch_target = match task.command {
            TaskCommand::SwitchTab => task.tab_id,
            _ => None,
        };
        let accepted = self
            .queue
            .submit_unless(task, |queued| {
                queued.task_id == task_id
                    || (switch_target.is_some()
                        && queued.command == TaskCommand::SwitchTab
                        && queued.tab_id == switch_target)
            })
            .await;

        if accepted {
            return Ok(handle);
        }

        self.waits.cancel(&task_id).await;
        let duplicate_id = self.queue.contains(|t| t.task_id == task_id).await;
        let message = match switch_target {
            Some(tab_id) if !duplicate_id => {
                format!("a switchTab for tab {} is already queued", tab_id)
            }
            _ => format!("task {} is already queued", task_id),
        };
        warn!(task_id = %task_id, reason = %message, "Task rejected");
        Err(Error::Conflict(message))
    }

    /// Non-blocking dequeue for the polling executor.
    pub async fn pull_next_task(&self) -> Option<Task> {
        let task = self.queue.take_next().await;
        if let Some(task) = &task {
            debug!(task_id = %task.task_id, command = %task.command, "Task handed to executor");
        }
        task
    }

    /// Apply any tab state carried by `data`, then resolve the matching wait.
    /// Returns whether a live wait was resolved; ambient events never match one.
    pub async fn report_success(&self, task_id: &str, data: Value) -> bool {
        if let Some(report) = TabReport::from_value(&data) {
            self.apply_tab_report(&report).await;
        }
        let resolved = self.waits.resolve(task_id, data).await;
        if !resolved {
            debug!(task_id, "Result has no waiting submitter, dropped");
        }
        resolved
    }

    /// Reject the matching wait with the executor's message, verbatim.
    pub async fn report_failure(&self, task_id: &str, message: &str) -> bool {
        let rejected = self
            .waits
            .reject(task_id, Error::Execution(message.to_string()))
            .await;
        if !rejected {
            debug!(task_id, error = message, "Failure has no waiting submitter, dropped");
        }
        rejected
    }

    /// Replace the whole tab state with `tabs` (a JSON array of tab records).
    pub async fn resync(&self, tabs: &Value) -> Result<usize> {
        let records = TabRecord::list_from_value(tabs)?;
        Ok(self.tabs.replace_all(&records).await)
    }

    pub async fn list_tabs(&self) -> Vec<TrackedTab> {
        self.tabs.list_tabs().await
    }

    pub async fn list_windows(&self) -> Vec<TrackedWindow> {
        self.tabs.list_windows().await
    }

    pub async fn stats(&self) -> DispatcherStats {
        let (tracked_tabs, tracked_windows) = self.tabs.counts().await;
        DispatcherStats {
            queued_tasks: self.queue.len().await,
            pending_waits: self.waits.len().await,
            tracked_tabs,
            tracked_windows,
        }
    }

    /// Fail every outstanding wait and flush the snapshot.
    pub async fn shutdown(&self) {
        let failed = self.waits.fail_all("dispatcher shutting down").await;
        self.tabs.flush().await;
        info!(failed_waits = failed, "Dispatcher stopped");
    }

    async fn apply_tab_report(&self, report: &TabReport) {
        if let Some(closed) = report.closed_tab_id {
            self.tabs.remove_tab(closed).await;
        }
        if let Some((tab_id, window_id)) = report.upsert() {
            self.tabs.upsert_tab(tab_id, window_id, report.url.clone()).await;
        }
    }
}
