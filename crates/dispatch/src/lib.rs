//! Task dispatch for a polling browser agent: a FIFO task queue, a rendezvous
//! table that lets submitters wait for remote completion, and the service that
//! ties both to the tab store.

pub mod queue;
pub mod rendezvous;
pub mod service;

pub use queue::TaskQueue;
pub use rendezvous::{Rendezvous, WaitHandle};
pub use service::{Dispatcher, DispatcherStats};
