//! Pairs asynchronous completion reports with the callers waiting on them.
//!
//! Each registered task id owns a `oneshot` sender in a mutex-guarded map. Whoever
//! removes the entry (resolve, reject, the deadline timer, or teardown) is the one
//! terminal transition; every later attempt finds nothing and is a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tabrelay_core::{Error, Result};
use tokio::sync::{oneshot, Mutex};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

type Outcome = Result<Value>;

struct PendingWait {
    tx: oneshot::Sender<Outcome>,
    timer: AbortHandle,
}

impl PendingWait {
    fn complete(self, outcome: Outcome) {
        self.timer.abort();
        // The submitter may already be gone; nothing left to tell it.
        let _ = self.tx.send(outcome);
    }
}

/// Caller side of a registered wait.
#[derive(Debug)]
pub struct WaitHandle {
    task_id: String,
    deadline: Instant,
    rx: oneshot::Receiver<Outcome>,
}

impl WaitHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Suspend until the wait is resolved, rejected, or times out.
    pub async fn wait(self) -> Result<Value> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Shutdown(format!(
                "wait for task {} was dropped before completion",
                self.task_id
            ))),
        }
    }
}

#[derive(Clone, Default)]
pub struct Rendezvous {
    waits: Arc<Mutex<HashMap<String, PendingWait>>>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait that is forcibly rejected with a timeout after `timeout`,
    /// whether or not anyone is still holding the handle.
    pub async fn register_wait(&self, task_id: &str, timeout: Duration) -> Result<WaitHandle> {
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;

        let mut waits = self.waits.lock().await;
        if waits.contains_key(task_id) {
            return Err(Error::Conflict(format!("task {} is already awaiting a result", task_id)));
        }

        // The timer needs the lock we are holding, so it cannot fire before the insert below.
        let table = self.clone();
        let id = task_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            table.expire(&id, timeout).await;
        })
        .abort_handle();

        waits.insert(
            task_id.to_string(),
            PendingWait { tx, timer },
        );
        debug!(task_id, timeout_secs = timeout.as_secs(), "Wait registered");

        Ok(WaitHandle {
            task_id: task_id.to_string(),
            deadline,
            rx,
        })
    }

    /// Complete a wait with success. Returns `false` if no live wait exists.
    pub async fn resolve(&self, task_id: &str, value: Value) -> bool {
        match self.take(task_id).await {
            Some(wait) => {
                wait.complete(Ok(value));
                debug!(task_id, "Wait resolved");
                true
            }
            None => {
                debug!(task_id, "Resolve for unknown or finished wait ignored");
                false
            }
        }
    }

    /// Complete a wait with failure. Returns `false` if no live wait exists.
    pub async fn reject(&self, task_id: &str, error: Error) -> bool {
        match self.take(task_id).await {
            Some(wait) => {
                debug!(task_id, error = %error, "Wait rejected");
                wait.complete(Err(error));
                true
            }
            None => {
                debug!(task_id, "Reject for unknown or finished wait ignored");
                false
            }
        }
    }

    /// Drop a wait without completing it; its handle sees a shutdown error.
    pub async fn cancel(&self, task_id: &str) -> bool {
        match self.take(task_id).await {
            Some(wait) => {
                wait.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding wait. Used on teardown so no submitter hangs.
    pub async fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<(String, PendingWait)> = self.waits.lock().await.drain().collect();
        let count = drained.len();
        for (task_id, wait) in drained {
            wait.complete(Err(Error::Shutdown(format!("task {}: {}", task_id, reason))));
        }
        if count > 0 {
            warn!(count, reason, "Failed outstanding waits");
        }
        count
    }

    pub async fn contains(&self, task_id: &str) -> bool {
        self.waits.lock().await.contains_key(task_id)
    }

    pub async fn len(&self) -> usize {
        self.waits.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.waits.lock().await.is_empty()
    }

    async fn take(&self, task_id: &str) -> Option<PendingWait> {
        self.waits.lock().await.remove(task_id)
    }

    async fn expire(&self, task_id: &str, timeout: Duration) {
        let Some(wait) = self.take(task_id).await else {
            return;
        };
        warn!(task_id, timeout_secs = timeout.as_secs(), "Task timed out waiting for executor");
        let _ = wait.tx.send(Err(Error::Timeout(format!(
            "task {} was not completed within {}s",
            task_id,
            timeout.as_secs()
        ))));
    }
}
