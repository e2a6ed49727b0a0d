pub mod coalescer;
pub mod snapshot;
pub mod tabs;

pub use coalescer::WriteCoalescer;
pub use snapshot::{read_snapshot, write_snapshot, TabSnapshot};
pub use tabs::{TabStore, TrackedTab, TrackedWindow};
