//! Next start/stop instant for a recurring schedule.
//!
//! All functions are pure in `(now, schedule)`. The search looks at each
//! active weekday separately, walks forward day by day in the schedule's zone
//! and resolves the local wall-clock time into a real instant according to the
//! schedule's DST policy. The earliest candidate across weekdays wins.
//!
//! The search is inclusive of `now` to within one second: a candidate must be
//! strictly after `now - 1s`.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Days, Local, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::recurring::{DstPolicy, MissingTimePolicy, RecurringSchedule, RepeatedTimePolicy, ResolvedZone};
use super::time::{LocalTime, Weekday};

/// Days searched ahead for a single weekday. A strict DST skip pushes an
/// occurrence one week out, so two weeks always suffice; the rest is slack.
const SEARCH_HORIZON_DAYS: u64 = 7 * 8;

/// Upper bound when walking out of a DST gap. Zones have skipped whole days.
const MAX_GAP_MINUTES: i64 = 48 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleEventKind {
    Start,
    Stop,
}

/// A due start or stop, produced fresh on every calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub kind: ScheduleEventKind,
    pub fire_at: DateTime<Utc>,
}

/// Next instant at which the window opens.
pub fn next_start(now: DateTime<Utc>, schedule: &RecurringSchedule) -> Option<DateTime<Utc>> {
    if !schedule.is_actionable() || schedule.is_zero_length() {
        return None;
    }
    next_occurrence(
        now,
        schedule.start_time,
        &schedule.weekdays,
        schedule.time_zone.resolve(),
        schedule.dst_policy,
    )
}

/// Next instant at which the window closes.
///
/// An overnight window closes on the day after each active weekday.
pub fn next_stop(now: DateTime<Utc>, schedule: &RecurringSchedule) -> Option<DateTime<Utc>> {
    if !schedule.is_actionable() || schedule.is_zero_length() {
        return None;
    }
    let weekdays: BTreeSet<Weekday> = if schedule.crosses_midnight() {
        schedule.weekdays.iter().map(|d| d.next()).collect()
    } else {
        schedule.weekdays.clone()
    };
    next_occurrence(
        now,
        schedule.stop_time,
        &weekdays,
        schedule.time_zone.resolve(),
        schedule.dst_policy,
    )
}

/// The earlier of the next start and next stop. Ties go to the start.
pub fn next_event(now: DateTime<Utc>, schedule: &RecurringSchedule) -> Option<ScheduleEvent> {
    let start = next_start(now, schedule).map(|fire_at| ScheduleEvent {
        kind: ScheduleEventKind::Start,
        fire_at,
    });
    let stop = next_stop(now, schedule).map(|fire_at| ScheduleEvent {
        kind: ScheduleEventKind::Stop,
        fire_at,
    });

    match (start, stop) {
        (Some(s), Some(t)) => Some(if s.fire_at <= t.fire_at { s } else { t }),
        (s, t) => s.or(t),
    }
}

// ── Internal ─────────────────────────────────────────────────────────

fn next_occurrence(
    now: DateTime<Utc>,
    time: LocalTime,
    weekdays: &BTreeSet<Weekday>,
    zone: ResolvedZone,
    policy: DstPolicy,
) -> Option<DateTime<Utc>> {
    let after = now - TimeDelta::seconds(1);
    weekdays
        .iter()
        .filter_map(|&weekday| match zone {
            ResolvedZone::System => first_after(&Local, after, weekday, time, policy),
            ResolvedZone::Named(tz) => first_after(&tz, after, weekday, time, policy),
        })
        .min()
}

/// First instant strictly after `after` that reads `time` on `weekday` in `zone`.
fn first_after<Z: TimeZone>(
    zone: &Z,
    after: DateTime<Utc>,
    weekday: Weekday,
    time: LocalTime,
    policy: DstPolicy,
) -> Option<DateTime<Utc>> {
    let first_day = after.with_timezone(zone).date_naive();
    let target = weekday.to_chrono();

    (0..SEARCH_HORIZON_DAYS)
        .filter_map(|offset| first_day.checked_add_days(Days::new(offset)))
        .filter(|date| date.weekday() == target)
        .filter_map(|date| resolve_local(zone, date.and_time(time.to_naive()), policy))
        .find(|instant| *instant > after)
}

/// Map a local wall-clock reading to a real instant, applying the DST policy.
fn resolve_local<Z: TimeZone>(zone: &Z, local: NaiveDateTime, policy: DstPolicy) -> Option<DateTime<Utc>> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, latest) => Some(match policy.repeated_time {
            RepeatedTimePolicy::First => earliest.with_timezone(&Utc),
            RepeatedTimePolicy::Last => latest.with_timezone(&Utc),
        }),
        LocalResult::None => match policy.missing_time {
            MissingTimePolicy::Strict => None,
            MissingTimePolicy::NextTime => end_of_gap(zone, local),
        },
    }
}

/// First existing instant after a skipped local time.
fn end_of_gap<Z: TimeZone>(zone: &Z, missing: NaiveDateTime) -> Option<DateTime<Utc>> {
    (1..=MAX_GAP_MINUTES)
        .map(|m| missing + TimeDelta::minutes(m))
        .find_map(|candidate| zone.from_local_datetime(&candidate).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::recurring::TimeZoneMode;
    use chrono::Timelike;
    use chrono_tz::America::New_York;
    use chrono_tz::Tz;
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> LocalTime {
        LocalTime::new(h, m).unwrap()
    }

    fn ny(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn schedule(start: LocalTime, stop: LocalTime, days: &[Weekday]) -> RecurringSchedule {
        RecurringSchedule {
            start_time: start,
            stop_time: stop,
            weekdays: days.iter().copied().collect(),
            enabled: true,
            time_zone: TimeZoneMode::Fixed("America/New_York".into()),
            dst_policy: DstPolicy::default(),
        }
    }

    fn local(instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&New_York)
    }

    #[test]
    fn disabled_schedule_yields_nothing() {
        let mut s = schedule(t(9, 0), t(18, 0), &[Weekday::Monday]);
        s.enabled = false;
        let now = ny(2024, 1, 1, 8, 0);
        assert!(next_start(now, &s).is_none());
        assert!(next_stop(now, &s).is_none());
        assert!(next_event(now, &s).is_none());
    }

    #[test]
    fn empty_weekdays_yield_nothing() {
        let s = schedule(t(9, 0), t(18, 0), &[]);
        let now = ny(2024, 1, 1, 8, 0);
        assert!(next_start(now, &s).is_none());
        assert!(next_stop(now, &s).is_none());
        assert!(next_event(now, &s).is_none());
    }

    #[test]
    fn zero_length_window_yields_nothing() {
        let s = schedule(t(9, 0), t(9, 0), &Weekday::ALL);
        let now = ny(2024, 1, 1, 8, 0);
        assert!(next_start(now, &s).is_none());
        assert!(next_stop(now, &s).is_none());
    }

    #[test]
    fn start_later_same_day() {
        // 2024-01-01 is a Monday.
        let s = schedule(t(9, 0), t(18, 0), &[Weekday::Monday]);
        let next = next_start(ny(2024, 1, 1, 8, 0), &s).unwrap();
        assert_eq!(next, ny(2024, 1, 1, 9, 0));
    }

    #[test]
    fn start_already_passed_moves_to_next_week() {
        let s = schedule(t(9, 0), t(18, 0), &[Weekday::Monday]);
        let next = next_start(ny(2024, 1, 1, 10, 0), &s).unwrap();
        assert_eq!(next, ny(2024, 1, 8, 9, 0));
    }

    #[test]
    fn start_exactly_now_is_included() {
        let s = schedule(t(9, 0), t(18, 0), &[Weekday::Monday]);
        let now = ny(2024, 1, 1, 9, 0);
        assert_eq!(next_start(now, &s), Some(now));
    }

    #[test]
    fn earliest_weekday_wins() {
        let s = schedule(t(9, 0), t(18, 0), &[Weekday::Friday, Weekday::Wednesday]);
        let next = next_start(ny(2024, 1, 1, 10, 0), &s).unwrap();
        assert_eq!(next, ny(2024, 1, 3, 9, 0));
    }

    #[test]
    fn overnight_stop_lands_next_day() {
        let s = schedule(t(22, 0), t(6, 0), &[Weekday::Monday]);
        let now = ny(2024, 1, 1, 21, 0);

        assert_eq!(next_start(now, &s).unwrap(), ny(2024, 1, 1, 22, 0));
        let stop = local(next_stop(now, &s).unwrap());
        assert_eq!(stop.date_naive().weekday(), chrono::Weekday::Tue);
        assert_eq!((stop.day(), stop.hour(), stop.minute()), (2, 6, 0));
    }

    #[test]
    fn next_event_prefers_earlier() {
        let s = schedule(t(9, 0), t(18, 0), &[Weekday::Monday]);
        let ev = next_event(ny(2024, 1, 1, 12, 0), &s).unwrap();
        assert_eq!(ev.kind, ScheduleEventKind::Stop);
        assert_eq!(ev.fire_at, ny(2024, 1, 1, 18, 0));

        let ev = next_event(ny(2024, 1, 1, 8, 0), &s).unwrap();
        assert_eq!(ev.kind, ScheduleEventKind::Start);

        // Overnight window on Monday and Tuesday: Tuesday 06:00 stop vs Tuesday 22:00 start.
        let s = schedule(t(22, 0), t(6, 0), &[Weekday::Monday, Weekday::Tuesday]);
        let ev = next_event(ny(2024, 1, 2, 5, 0), &s).unwrap();
        assert_eq!(ev.kind, ScheduleEventKind::Stop);
    }

    #[test]
    fn next_event_tie_goes_to_start() {
        // 02:30 does not exist on 2024-03-10 and snaps to 03:00, the stop time.
        let mut s = schedule(t(2, 30), t(3, 0), &[Weekday::Sunday]);
        s.dst_policy = DstPolicy::new(MissingTimePolicy::NextTime, RepeatedTimePolicy::First);
        let now = ny(2024, 3, 10, 0, 0);

        assert_eq!(next_start(now, &s), next_stop(now, &s));
        let ev = next_event(now, &s).unwrap();
        assert_eq!(ev.kind, ScheduleEventKind::Start);
        assert_eq!(ev.fire_at, ny(2024, 3, 10, 3, 0));
        assert_eq!(ev.fire_at.to_rfc3339(), "2024-03-10T07:00:00+00:00");
    }

    #[test]
    fn spring_forward_next_time_snaps_to_gap_end() {
        // 2024-03-10: New York jumps 02:00 -> 03:00.
        let mut s = schedule(t(2, 0), t(6, 0), &[Weekday::Sunday]);
        s.dst_policy = DstPolicy::new(MissingTimePolicy::NextTime, RepeatedTimePolicy::First);
        let next = local(next_start(ny(2024, 3, 10, 0, 0), &s).unwrap());
        assert_eq!((next.month(), next.day(), next.hour(), next.minute()), (3, 10, 3, 0));
    }

    #[test]
    fn spring_forward_strict_skips_to_next_week() {
        let mut s = schedule(t(2, 0), t(6, 0), &[Weekday::Sunday]);
        s.dst_policy = DstPolicy::new(MissingTimePolicy::Strict, RepeatedTimePolicy::First);
        let next = local(next_start(ny(2024, 3, 10, 0, 0), &s).unwrap());
        assert_eq!((next.month(), next.day(), next.hour(), next.minute()), (3, 17, 2, 0));
    }

    #[test]
    fn fall_back_first_and_last_are_an_hour_apart() {
        // 2024-11-03: New York repeats 01:00-02:00.
        let mut s = schedule(t(1, 30), t(6, 0), &[Weekday::Sunday]);
        let now = ny(2024, 11, 3, 0, 0);

        s.dst_policy = DstPolicy::new(MissingTimePolicy::NextTime, RepeatedTimePolicy::First);
        let first = next_start(now, &s).unwrap();
        s.dst_policy = DstPolicy::new(MissingTimePolicy::NextTime, RepeatedTimePolicy::Last);
        let last = next_start(now, &s).unwrap();

        assert!(first < last);
        assert_eq!(last - first, TimeDelta::hours(1));
        for instant in [first, last] {
            let l = local(instant);
            assert_eq!((l.day(), l.hour(), l.minute()), (3, 1, 30));
        }
    }

    #[test]
    fn unknown_fixed_zone_still_produces_events() {
        let mut s = schedule(t(9, 0), t(18, 0), &Weekday::ALL);
        s.time_zone = TimeZoneMode::Fixed("Nowhere/Atlantis".into());
        assert!(next_start(Utc::now(), &s).is_some());
    }

    proptest! {
        #[test]
        fn next_start_is_never_in_the_past(
            secs in 1_600_000_000i64..1_900_000_000i64,
            start in 0u32..(24 * 60),
            stop in 0u32..(24 * 60),
            mask in 1u8..128u8,
            strict in any::<bool>(),
            zone_idx in 0usize..4,
        ) {
            let zones = ["America/New_York", "Europe/London", "Australia/Lord_Howe", "Asia/Kolkata"];
            let days: Vec<Weekday> = Weekday::ALL
                .into_iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, d)| d)
                .collect();
            let mut s = schedule(t(start / 60, start % 60), t(stop / 60, stop % 60), &days);
            s.time_zone = TimeZoneMode::Fixed(zones[zone_idx].into());
            if strict {
                s.dst_policy.missing_time = MissingTimePolicy::Strict;
            }
            let now = DateTime::<Utc>::from_timestamp(secs, 0).unwrap();

            if let Some(next) = next_start(now, &s) {
                prop_assert!(next > now - TimeDelta::seconds(1));
                prop_assert!(next <= now + TimeDelta::days(15));
            } else {
                prop_assert!(start == stop);
            }
            if let Some(ev) = next_event(now, &s) {
                prop_assert!(ev.fire_at > now - TimeDelta::seconds(1));
            }
        }
    }
}
