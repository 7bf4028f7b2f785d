use chrono::{DateTime, Utc};

use crate::types::Schedule;

/// Earliest instant at which a cron last started at `last_run` is due again.
///
/// `None` means the cron has never run and is due immediately.
pub fn next_due(schedule: Schedule, last_run: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    last_run.map(|at| at + schedule.interval())
}

/// Whether a cron with this schedule and last start is due at `now`.
///
/// True when it never ran; otherwise only once the full interval has
/// elapsed since the last attempt.
pub fn needs_to_run(schedule: Schedule, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match next_due(schedule, last_run) {
        None => true,
        Some(due) => now >= due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn never_run_is_due() {
        for schedule in Schedule::ALL {
            assert!(needs_to_run(schedule, None, at(0, 0, 0)));
        }
    }

    #[test]
    fn not_due_right_after_stamp() {
        let now = at(12, 0, 0);
        for schedule in Schedule::ALL {
            assert!(!needs_to_run(schedule, Some(now), now));
        }
    }

    #[test]
    fn minute_becomes_due_exactly_at_interval() {
        let last = at(12, 0, 0);
        assert!(!needs_to_run(Schedule::Minute, Some(last), at(12, 0, 59)));
        assert!(needs_to_run(Schedule::Minute, Some(last), at(12, 1, 0)));
        assert!(needs_to_run(Schedule::Minute, Some(last), at(12, 1, 1)));
    }

    #[test]
    fn intervals_are_fixed_durations() {
        let last = at(0, 0, 0);
        let cases = [
            (Schedule::Hour, Duration::hours(1)),
            (Schedule::Day, Duration::hours(24)),
            (Schedule::Week, Duration::days(7)),
            (Schedule::Month, Duration::days(30)),
            (Schedule::Year, Duration::days(365)),
        ];
        for (schedule, interval) in cases {
            let almost = last + interval - Duration::seconds(1);
            assert!(!needs_to_run(schedule, Some(last), almost), "{schedule}");
            assert!(needs_to_run(schedule, Some(last), last + interval), "{schedule}");
        }
    }

    #[test]
    fn next_due_adds_interval() {
        let last = at(8, 30, 0);
        assert_eq!(next_due(Schedule::Hour, Some(last)), Some(at(9, 30, 0)));
        assert_eq!(next_due(Schedule::Hour, None), None);
    }
}
