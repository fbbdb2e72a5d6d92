//! Monthly upload-volume accounting.
//!
//! The billing period is the current calendar month in UTC. Bytes are
//! attributed to it from the upload log when possible, falling back to
//! the store's own `last_modified` for objects the log never saw (e.g. a
//! crash between the store write and the log write).

use crate::models::{object::ObjectMeta, usage::UsageSnapshot};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;

/// Quota ceiling applied when none is configured: 10 GiB per month.
pub const DEFAULT_QUOTA_LIMIT: u64 = 10 * 1024 * 1024 * 1024;

/// First instant of the month `now` falls in.
fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let first = date.with_day(1).unwrap_or(date);
    first.and_time(NaiveTime::MIN).and_utc()
}

/// First instant of the month after the one `now` falls in; December
/// wraps into January of the following year.
fn next_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(now.date_naive());
    first.and_time(NaiveTime::MIN).and_utc()
}

/// Aggregate usage over a full object listing.
///
/// Attribution per object: an upload-log entry that parses puts the bytes
/// in the current period iff it is at or after the period start; an entry
/// that exists but no longer parses counts against the period
/// unconditionally (conservative toward undercounting headroom); no entry
/// falls back to the object's `last_modified`.
pub fn compute_usage(
    objects: &[ObjectMeta],
    uploads: &HashMap<String, String>,
    now: DateTime<Utc>,
    quota_limit: u64,
) -> UsageSnapshot {
    let period_start = month_start(now);
    let mut total_size = 0u64;
    let mut current_period_size = 0u64;

    for object in objects {
        let size = object.size.max(0) as u64;
        total_size += size;

        let in_period = match uploads.get(&object.key) {
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(at) => at.with_timezone(&Utc) >= period_start,
                Err(_) => true,
            },
            None => object.last_modified >= period_start,
        };
        if in_period {
            current_period_size += size;
        }
    }

    UsageSnapshot {
        total_files: objects.len() as u64,
        total_size,
        current_period_size,
        remaining_quota: quota_limit.saturating_sub(current_period_size),
        days_until_reset: (next_month_start(now) - now).num_days(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn object(key: &str, size: i64, last_modified: DateTime<Utc>) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size,
            last_modified,
            content_type: None,
        }
    }

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn uploads_before_the_period_leave_the_quota_untouched() {
        let now = at(2025, 8, 7);
        let objects = vec![object("old.bin", 4096, at(2025, 6, 1))];
        let uploads = HashMap::from([("old.bin".to_string(), at(2025, 7, 31).to_rfc3339())]);

        let usage = compute_usage(&objects, &uploads, now, DEFAULT_QUOTA_LIMIT);

        assert_eq!(usage.total_files, 1);
        assert_eq!(usage.total_size, 4096);
        assert_eq!(usage.current_period_size, 0);
        assert_eq!(usage.remaining_quota, DEFAULT_QUOTA_LIMIT);
    }

    #[test]
    fn an_in_period_upload_is_charged_against_the_quota() {
        let now = at(2025, 8, 7);
        let objects = vec![
            object("old.bin", 1000, at(2025, 6, 1)),
            object("new.bin", 5000, at(2025, 8, 2)),
        ];
        let uploads = HashMap::from([
            ("old.bin".to_string(), at(2025, 6, 1).to_rfc3339()),
            ("new.bin".to_string(), at(2025, 8, 2).to_rfc3339()),
        ]);

        let usage = compute_usage(&objects, &uploads, now, DEFAULT_QUOTA_LIMIT);

        assert_eq!(usage.total_size, 6000);
        assert_eq!(usage.current_period_size, 5000);
        assert_eq!(usage.remaining_quota, DEFAULT_QUOTA_LIMIT - 5000);
    }

    #[test]
    fn remaining_quota_never_goes_negative() {
        let now = at(2025, 8, 7);
        let objects = vec![object("huge.bin", 900, at(2025, 8, 1))];
        let uploads = HashMap::from([("huge.bin".to_string(), at(2025, 8, 1).to_rfc3339())]);

        let usage = compute_usage(&objects, &uploads, now, 500);

        assert_eq!(usage.current_period_size, 900);
        assert_eq!(usage.remaining_quota, 0);
    }

    #[test]
    fn unparseable_log_entries_count_against_the_period() {
        let now = at(2025, 8, 7);
        let objects = vec![object("odd.bin", 128, at(2024, 1, 1))];
        let uploads = HashMap::from([("odd.bin".to_string(), "last tuesday".to_string())]);

        let usage = compute_usage(&objects, &uploads, now, DEFAULT_QUOTA_LIMIT);

        assert_eq!(usage.current_period_size, 128);
    }

    #[test]
    fn unlogged_objects_fall_back_to_last_modified() {
        let now = at(2025, 8, 7);
        let objects = vec![
            object("in.bin", 10, at(2025, 8, 3)),
            object("out.bin", 20, at(2025, 7, 3)),
        ];

        let usage = compute_usage(&objects, &HashMap::new(), now, DEFAULT_QUOTA_LIMIT);

        assert_eq!(usage.current_period_size, 10);
    }

    #[test]
    fn reset_countdown_rolls_december_into_january() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();
        let usage = compute_usage(&[], &HashMap::new(), now, DEFAULT_QUOTA_LIMIT);
        assert_eq!(usage.days_until_reset, 1);
    }

    #[test]
    fn reset_countdown_mid_month() {
        let now = Utc.with_ymd_and_hms(2025, 7, 15, 0, 0, 0).unwrap();
        let usage = compute_usage(&[], &HashMap::new(), now, DEFAULT_QUOTA_LIMIT);
        assert_eq!(usage.days_until_reset, 17);
    }

    #[test]
    fn empty_store_reports_full_quota() {
        let usage = compute_usage(&[], &HashMap::new(), at(2025, 8, 7), DEFAULT_QUOTA_LIMIT);
        assert_eq!(usage.total_files, 0);
        assert_eq!(usage.total_size, 0);
        assert_eq!(usage.remaining_quota, DEFAULT_QUOTA_LIMIT);
    }
}
