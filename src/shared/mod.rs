//! Shared counters and messaging between pipeline threads
//!
//! The capture, frame and recognition workers report into lock-free
//! counters and post display updates over channels to the UI context.

pub mod messages;
pub mod state;

pub use messages::DisplayUpdate;
pub use state::{PipelineStats, StatsSnapshot};
