mod engine;
mod reducer;

use std::time::Duration;

use async_trait::async_trait;

pub use engine::{SnapshotStream, TimerEngine, TICK_INTERVAL};
pub use reducer::{reduce, TimerAction, TimerSnapshot, TimerStatus};

/// The slice of the engine that schedule automation drives.
#[async_trait]
pub trait TimerControl: Send + Sync {
    async fn start(&self, target: Option<Duration>);
    async fn stop(&self);
}
