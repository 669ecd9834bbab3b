//! # Worktimer Core Library
//!
//! Core logic for a work-session countdown timer that starts and stops itself
//! on a recurring weekly schedule and survives process restarts and host sleep.
//! Everything is usable from the standalone `worktimer` CLI; any GUI is a thin
//! layer over the same library.
//!
//! ## Architecture
//!
//! - **Schedule**: weekday/time-of-day schedule with time-zone and DST rules,
//!   and a pure calculator for the next start or stop instant
//! - **Timer Engine**: async state machine driven by a monotonic tick loop,
//!   publishing snapshots to subscribers
//! - **Recovery**: checkpoint written on every transition and replayed
//!   against both clocks after launch or wake
//! - **Auto-schedule**: waits for the next schedule event and drives the engine
//! - **Storage**: TOML settings and a JSON checkpoint under the data directory
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: the live timer
//! - [`AutoScheduleCoordinator`]: schedule-driven start/stop
//! - [`RecoveryCoordinator`]: recovery on lifecycle triggers
//! - [`Settings`] and [`SettingsStore`]: persisted configuration

pub mod autoschedule;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod plan;
pub mod recovery;
pub mod schedule;
pub mod secs;
pub mod storage;
pub mod timer;

pub use autoschedule::{AutoScheduleCoordinator, ManualSleeper, Sleeper, TokioSleeper, WaitOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, ValidationError};
pub use lifecycle::{LifecycleTrigger, RecoveryCoordinator, WakeDetector};
pub use notify::{NotificationEvent, NotificationSettings, SnapshotDiffer};
pub use plan::{DayPlan, DayPlanRepository, PlanSegment, SegmentKind};
pub use recovery::{RecoveryCheckpoint, RecoveryOutput, RecoveryPolicy};
pub use schedule::{LocalTime, RecurringSchedule, ScheduleEvent, ScheduleEventKind, TimeZoneMode, Weekday};
pub use storage::{FileSettingsStore, MemorySettingsStore, Settings, SettingsStore};
pub use timer::{TimerControl, TimerEngine, TimerSnapshot, TimerStatus};
