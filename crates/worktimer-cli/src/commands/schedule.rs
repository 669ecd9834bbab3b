use chrono::{DateTime, Local, Utc};
use clap::Subcommand;
use serde::Serialize;
use worktimer_core::schedule::{next_event, ResolvedZone, ScheduleEvent};
use worktimer_core::{LocalTime, RecurringSchedule, Settings, TimeZoneMode, Weekday};

use super::{print_json, CommandResult};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Show the current schedule
    Show,
    /// Update schedule fields; omitted fields keep their value
    Set {
        /// Start time as HH:MM
        #[arg(long)]
        start: Option<LocalTime>,
        /// Stop time as HH:MM
        #[arg(long)]
        stop: Option<LocalTime>,
        /// Comma-separated weekdays, e.g. mon,tue,wed
        #[arg(long, value_delimiter = ',')]
        days: Option<Vec<Weekday>>,
        /// IANA zone such as Europe/Berlin, or "system"
        #[arg(long)]
        zone: Option<String>,
        /// Turn automatic start/stop on
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        /// Turn automatic start/stop off
        #[arg(long)]
        disable: bool,
    },
    /// Print the next start or stop instant
    Next,
}

#[derive(Serialize)]
struct NextView {
    #[serde(flatten)]
    event: ScheduleEvent,
    local: String,
}

pub fn run(action: ScheduleAction) -> CommandResult {
    match action {
        ScheduleAction::Show => {
            let settings = Settings::load()?;
            print_json(&settings.schedule)?;
        }
        ScheduleAction::Set {
            start,
            stop,
            days,
            zone,
            enable,
            disable,
        } => {
            let mut settings = Settings::load()?;
            apply_changes(&mut settings.schedule, start, stop, days, zone, enable, disable)?;
            settings.save()?;
            print_json(&settings.schedule)?;
        }
        ScheduleAction::Next => {
            let settings = Settings::load()?;
            match next_event(Utc::now(), &settings.schedule) {
                Some(event) => print_json(&NextView {
                    local: local_time(&settings.schedule, event.fire_at),
                    event,
                })?,
                None => println!("null"),
            }
        }
    }
    Ok(())
}

fn apply_changes(
    schedule: &mut RecurringSchedule,
    start: Option<LocalTime>,
    stop: Option<LocalTime>,
    days: Option<Vec<Weekday>>,
    zone: Option<String>,
    enable: bool,
    disable: bool,
) -> CommandResult {
    if let Some(start) = start {
        schedule.start_time = start;
    }
    if let Some(stop) = stop {
        schedule.stop_time = stop;
    }
    if let Some(days) = days {
        schedule.weekdays = days.into_iter().collect();
    }
    if let Some(zone) = zone {
        let mode = TimeZoneMode::from(zone);
        if let TimeZoneMode::Fixed(id) = &mode {
            if mode.resolve() == ResolvedZone::System {
                return Err(format!("unknown time zone: {id}").into());
            }
        }
        schedule.time_zone = mode;
    }
    if enable {
        schedule.enabled = true;
    }
    if disable {
        schedule.enabled = false;
    }
    if schedule.is_zero_length() {
        eprintln!("warning: start equals stop; the schedule will never fire");
    }
    Ok(())
}

fn local_time(schedule: &RecurringSchedule, at: DateTime<Utc>) -> String {
    match schedule.time_zone.resolve() {
        ResolvedZone::Named(tz) => at.with_timezone(&tz).to_rfc3339(),
        ResolvedZone::System => at.with_timezone(&Local).to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_changes_updates_only_given_fields() {
        let mut schedule = RecurringSchedule::default();
        apply_changes(
            &mut schedule,
            Some(LocalTime::new(8, 30).unwrap()),
            None,
            Some(vec![Weekday::Friday, Weekday::Monday]),
            Some("Europe/Berlin".into()),
            true,
            false,
        )
        .unwrap();

        assert_eq!(schedule.start_time, LocalTime::new(8, 30).unwrap());
        assert_eq!(schedule.stop_time, RecurringSchedule::default().stop_time);
        assert_eq!(schedule.weekdays.len(), 2);
        assert!(schedule.enabled);
        assert_eq!(schedule.time_zone, TimeZoneMode::Fixed("Europe/Berlin".into()));
    }

    #[test]
    fn apply_changes_rejects_unknown_zone() {
        let mut schedule = RecurringSchedule::default();
        let result = apply_changes(&mut schedule, None, None, None, Some("Mars/Olympus".into()), false, false);
        assert!(result.is_err());
        assert_eq!(schedule.time_zone, TimeZoneMode::System);
    }

    #[test]
    fn local_time_uses_fixed_zone() {
        let schedule = RecurringSchedule {
            time_zone: TimeZoneMode::Fixed("Asia/Tokyo".into()),
            ..Default::default()
        };
        let at = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        assert_eq!(local_time(&schedule, at), "1970-01-01T09:00:00+09:00");
    }
}
