//! Single-flight write-behind scheduling.
//!
//! A [`WriteCoalescer`] runs one write job at a time. Requests that arrive while a
//! write is in flight collapse into a single follow-up run, and that run reads
//! whatever state is current when it starts. A burst of N mutations therefore
//! costs at most two writes, the last of which reflects the final state.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::trace;

type WriteJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Default)]
struct FlightState {
    in_flight: bool,
    dirty: bool,
}

struct Inner {
    job: WriteJob,
    state: Mutex<FlightState>,
    /// `true` while nothing is running or queued.
    idle_tx: watch::Sender<bool>,
    writes: AtomicU64,
}

#[derive(Clone)]
pub struct WriteCoalescer {
    inner: Arc<Inner>,
}

impl WriteCoalescer {
    /// `job` must read the latest state itself each time it is invoked.
    pub fn new<F, Fut>(job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: WriteJob = Arc::new(move || Box::pin(job()));
        let (idle_tx, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                job,
                state: Mutex::new(FlightState::default()),
                idle_tx,
                writes: AtomicU64::new(0),
            }),
        }
    }

    /// Request a write. Never waits for it; must be called inside a tokio runtime.
    pub fn schedule(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.in_flight {
                state.dirty = true;
                trace!("write in flight, follow-up queued");
                return;
            }
            state.in_flight = true;
            self.inner.idle_tx.send_replace(false);
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.drain().await;
        });
    }

    /// Wait until no write is running or queued.
    pub async fn flush(&self) {
        let mut rx = self.inner.idle_tx.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    /// Number of completed write runs.
    pub fn writes(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn drain(&self) {
        loop {
            (self.job)().await;
            self.writes.fetch_add(1, Ordering::SeqCst);

            let again = {
                let mut state = self.lock_state();
                if state.dirty {
                    state.dirty = false;
                    true
                } else {
                    state.in_flight = false;
                    self.idle_tx.send_replace(true);
                    false
                }
            };
            if !again {
                break;
            }
        }
    }
}
