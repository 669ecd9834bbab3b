//! Pure timer state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!            |
//!            v
//!         Finished
//! ```
//!
//! `Stop` returns to `Idle` from anywhere; `Start` restarts from anywhere.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Finished,
}

/// The externally visible timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    #[serde(with = "crate::secs")]
    pub elapsed: Duration,
    #[serde(with = "crate::secs::option", default)]
    pub target: Option<Duration>,
}

impl TimerSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }

    /// `target - elapsed`, floored at zero. `None` for an open-ended timer.
    pub fn remaining(&self) -> Option<Duration> {
        self.target.map(|t| t.saturating_sub(self.elapsed))
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Start(Option<Duration>),
    Pause,
    Resume,
    Stop,
    Tick(Duration),
}

/// Apply one action. Total: every (state, action) pair yields a state.
pub fn reduce(state: TimerSnapshot, action: TimerAction) -> TimerSnapshot {
    match action {
        TimerAction::Start(target) => TimerSnapshot {
            status: TimerStatus::Running,
            elapsed: Duration::ZERO,
            target,
        },
        TimerAction::Pause => {
            if state.status != TimerStatus::Running {
                return state;
            }
            TimerSnapshot {
                status: TimerStatus::Paused,
                ..state
            }
        }
        TimerAction::Resume => {
            if state.status != TimerStatus::Paused {
                return state;
            }
            TimerSnapshot {
                status: TimerStatus::Running,
                ..state
            }
        }
        TimerAction::Stop => TimerSnapshot::idle(),
        TimerAction::Tick(delta) => {
            if state.status != TimerStatus::Running {
                return state;
            }
            let elapsed = state.elapsed.saturating_add(delta);
            match state.target {
                Some(target) if elapsed >= target => TimerSnapshot {
                    status: TimerStatus::Finished,
                    elapsed: target,
                    target: Some(target),
                },
                _ => TimerSnapshot {
                    status: TimerStatus::Running,
                    elapsed,
                    target: state.target,
                },
            }
        }
    }
}
