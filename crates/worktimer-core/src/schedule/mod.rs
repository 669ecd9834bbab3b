//! Recurring auto start/stop schedule and its next-event calculator.

pub mod calculator;
mod recurring;
mod time;

pub use calculator::{next_event, next_start, next_stop, ScheduleEvent, ScheduleEventKind};
pub use recurring::{
    DstPolicy, MissingTimePolicy, RecurringSchedule, RepeatedTimePolicy, ResolvedZone, TimeZoneMode,
};
pub use time::{LocalTime, Weekday};
