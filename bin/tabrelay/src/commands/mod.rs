pub mod client;
pub mod config_cmd;
pub mod gateway;
pub mod status;
pub mod tabs_cmd;
pub mod task_cmd;
