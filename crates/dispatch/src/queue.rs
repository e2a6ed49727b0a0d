use std::collections::VecDeque;
use std::sync::Arc;

use tabrelay_core::Task;
use tokio::sync::Mutex;

/// Strict FIFO of tasks waiting for the executor to pull them.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail.
    pub async fn submit(&self, task: Task) {
        self.tasks.lock().await.push_back(task);
    }

    /// Append unless a queued task matches `conflicts`. Check and append happen under
    /// one lock, so two racing submissions cannot both pass the check.
    pub async fn submit_unless<F>(&self, task: Task, conflicts: F) -> bool
    where
        F: Fn(&Task) -> bool,
    {
        let mut tasks = self.tasks.lock().await;
        if tasks.iter().any(|queued| conflicts(queued)) {
            return false;
        }
        tasks.push_back(task);
        true
    }

    /// Remove and return the head. `None` is the common case under polling.
    pub async fn take_next(&self) -> Option<Task> {
        self.tasks.lock().await.pop_front()
    }

    pub async fn contains<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Task) -> bool,
    {
        self.tasks.lock().await.iter().any(predicate)
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}
