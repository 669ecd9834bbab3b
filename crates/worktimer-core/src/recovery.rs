//! Dual-clock recovery of elapsed time after a process gap.
//!
//! A running timer persists a [`RecoveryCheckpoint`] holding both a wall-clock
//! and a monotonic anchor. After sleep, backgrounding or relaunch, [`recover`]
//! compares how far each clock moved and picks the more trustworthy delta:
//!
//! - only one anchor present: use it
//! - deltas agree within `delta_tolerance`: monotonic
//! - wall clock ahead by more than `max_forward_skew`: monotonic (clock was edited)
//! - otherwise: wall clock (the monotonic clock stalled during suspend)

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::TimerStatus;

/// Persisted timer state used to rebuild elapsed time.
///
/// Anchors are present only while running. Missing or unknown JSON fields
/// decode to the idle default.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryCheckpoint {
    pub status: TimerStatus,
    #[serde(with = "crate::secs")]
    pub target_duration: Duration,
    pub start_wall_clock: Option<DateTime<Utc>>,
    #[serde(with = "crate::secs::option")]
    pub start_monotonic: Option<Duration>,
    #[serde(with = "crate::secs")]
    pub accumulated_elapsed: Duration,
    pub last_observed_wall_clock: Option<DateTime<Utc>>,
    #[serde(with = "crate::secs::option")]
    pub last_observed_monotonic: Option<Duration>,
}

impl RecoveryCheckpoint {
    /// A fresh running span starting now with nothing accumulated.
    pub fn started(target: Duration, wall: DateTime<Utc>, monotonic: Duration) -> Self {
        Self {
            status: TimerStatus::Running,
            target_duration: target,
            start_wall_clock: Some(wall),
            start_monotonic: Some(monotonic),
            accumulated_elapsed: Duration::ZERO,
            last_observed_wall_clock: Some(wall),
            last_observed_monotonic: Some(monotonic),
        }
    }

    /// Fold the current span into `accumulated` and drop the anchors.
    pub fn frozen(mut self, status: TimerStatus, accumulated: Duration, wall: DateTime<Utc>, monotonic: Duration) -> Self {
        self.status = status;
        self.accumulated_elapsed = accumulated;
        self.start_wall_clock = None;
        self.start_monotonic = None;
        self.observe(wall, monotonic);
        self
    }

    /// Open a new running span on top of `accumulated`.
    pub fn resumed(mut self, accumulated: Duration, wall: DateTime<Utc>, monotonic: Duration) -> Self {
        self.status = TimerStatus::Running;
        self.accumulated_elapsed = accumulated;
        self.start_wall_clock = Some(wall);
        self.start_monotonic = Some(monotonic);
        self.observe(wall, monotonic);
        self
    }

    pub fn has_anchors(&self) -> bool {
        self.start_wall_clock.is_some() || self.start_monotonic.is_some()
    }

    fn observe(&mut self, wall: DateTime<Utc>, monotonic: Duration) {
        self.last_observed_wall_clock = Some(wall);
        self.last_observed_monotonic = Some(monotonic);
    }
}

/// Thresholds for choosing between the wall-clock and monotonic deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub delta_tolerance: Duration,
    pub max_forward_skew: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            delta_tolerance: Duration::from_secs(2),
            max_forward_skew: Duration::from_secs(12 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryOutput {
    /// Normalized checkpoint to persist back.
    pub checkpoint: RecoveryCheckpoint,
    pub elapsed: Duration,
    pub remaining: Duration,
}

/// Reconcile a checkpoint against the current clock readings.
///
/// Pure and idempotent once the checkpoint has finished.
pub fn recover(
    checkpoint: &RecoveryCheckpoint,
    now_wall: DateTime<Utc>,
    now_monotonic: Duration,
    policy: &RecoveryPolicy,
) -> RecoveryOutput {
    let target = checkpoint.target_duration;
    let delta = running_delta(checkpoint, now_wall, now_monotonic, policy);

    let elapsed = checkpoint.accumulated_elapsed.saturating_add(delta).min(target);
    let remaining = target.saturating_sub(elapsed);

    let mut next = *checkpoint;
    if checkpoint.status == TimerStatus::Running && !target.is_zero() && elapsed >= target {
        next.status = TimerStatus::Finished;
        next.accumulated_elapsed = target;
        next.start_wall_clock = None;
        next.start_monotonic = None;
    }
    next.observe(now_wall, now_monotonic);

    RecoveryOutput {
        checkpoint: next,
        elapsed,
        remaining,
    }
}

fn running_delta(
    checkpoint: &RecoveryCheckpoint,
    now_wall: DateTime<Utc>,
    now_monotonic: Duration,
    policy: &RecoveryPolicy,
) -> Duration {
    if checkpoint.status != TimerStatus::Running {
        return Duration::ZERO;
    }

    let mono = checkpoint
        .start_monotonic
        .map(|start| now_monotonic.checked_sub(start).unwrap_or(Duration::ZERO));
    let wall = checkpoint
        .start_wall_clock
        .map(|start| (now_wall - start).to_std().unwrap_or(Duration::ZERO));

    match (mono, wall) {
        (None, None) => Duration::ZERO,
        (Some(m), None) => m,
        (None, Some(w)) => w,
        (Some(m), Some(w)) => {
            if w.abs_diff(m) <= policy.delta_tolerance {
                m
            } else if w > m && w - m > policy.max_forward_skew {
                tracing::debug!(wall = ?w, monotonic = ?m, "wall clock jumped forward, using monotonic delta");
                m
            } else {
                w
            }
        }
    }
}
