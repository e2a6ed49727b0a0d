pub mod config;
pub mod error;
pub mod paths;
pub mod tab;
pub mod task;

pub use config::{Config, DispatchConfig, GatewayConfig, StorageConfig};
pub use error::{Error, Result};
pub use paths::Paths;
pub use tab::{TabRecord, TabReport};
pub use task::{new_task_id, Task, TaskCommand, TaskRequest};
