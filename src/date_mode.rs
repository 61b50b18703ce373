// src/date_mode.rs
// Date-Mode Resolver (C2): resolves symbolic date tokens to absolute
// calendar dates.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Deserialize;

/// Accepts either a plain string or `{date_mode_value, date, date_mode}`.
/// Priority: `date_mode_value` > `date` > resolved `date_mode`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DateValue {
    Plain(String),
    Structured {
        #[serde(default)]
        date_mode_value: Option<String>,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        date_mode: Option<String>,
    },
}

/// Resolve a `DateValue` to an ISO `YYYY-MM-DD` string, anchored at `today`.
/// Idempotent: resolving an already-resolved plain date returns it
/// unchanged, and unknown `date_mode` tokens pass through unchanged
/// rather than erroring.
pub fn resolve(value: &DateValue, today: NaiveDate) -> String {
    match value {
        DateValue::Plain(s) => s.clone(),
        DateValue::Structured {
            date_mode_value,
            date,
            date_mode,
        } => {
            if let Some(v) = date_mode_value {
                return v.clone();
            }
            if let Some(d) = date {
                return d.clone();
            }
            match date_mode.as_deref() {
                Some(mode) => resolve_mode(mode, today).unwrap_or_else(|| mode.to_string()),
                None => String::new(),
            }
        }
    }
}

fn resolve_mode(mode: &str, today: NaiveDate) -> Option<String> {
    let resolved = match mode {
        "today" => today,
        "yesterday" => today - Duration::days(1),
        "tomorrow" => today + Duration::days(1),
        "one_week_ago" => today - Duration::weeks(1),
        "one_week_from_now" => today + Duration::weeks(1),
        "one_month_ago" => shift_months(today, -1),
        "one_month_from_now" => shift_months(today, 1),
        "start_of_week" => start_of_week(today),
        "end_of_week" => start_of_week(today) + Duration::days(6),
        "start_of_month" => today.with_day(1).unwrap_or(today),
        "end_of_month" => end_of_month(today),
        "exact_date" => return None, // requires date_mode_value, handled by caller's priority
        _ => return None,
    };
    Some(resolved.format("%Y-%m-%d").to_string())
}

/// Sunday-based start of week.
fn start_of_week(day: NaiveDate) -> NaiveDate {
    let offset = match day.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    };
    day - Duration::days(offset)
}

fn shift_months(day: NaiveDate, delta: i32) -> NaiveDate {
    let total_months = day.year() * 12 + (day.month() as i32 - 1) + delta;
    let year = total_months.div_euclid(12);
    let month = total_months.rem_euclid(12) as u32 + 1;
    let last_day = days_in_month(year, month);
    NaiveDate::from_ymd_opt(year, month, day.day().min(last_day)).unwrap_or(day)
}

fn end_of_month(day: NaiveDate) -> NaiveDate {
    let last_day = days_in_month(day.year(), day.month());
    NaiveDate::from_ymd_opt(day.year(), day.month(), last_day).unwrap_or(day)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
        .day()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
    }

    #[test]
    fn today_mode() {
        let v: DateValue = serde_json::from_value(serde_json::json!({"date_mode": "today"})).unwrap();
        assert_eq!(resolve(&v, today()), "2024-12-01");
    }

    #[test]
    fn date_mode_value_wins_over_date_mode() {
        let v: DateValue = serde_json::from_value(serde_json::json!({
            "date_mode_value": "2030-01-01",
            "date_mode": "today"
        }))
        .unwrap();
        assert_eq!(resolve(&v, today()), "2030-01-01");
    }

    #[test]
    fn start_of_week_is_sunday_based() {
        // 2024-12-01 is a Sunday.
        let v: DateValue =
            serde_json::from_value(serde_json::json!({"date_mode": "start_of_week"})).unwrap();
        assert_eq!(resolve(&v, today()), "2024-12-01");
    }

    #[test]
    fn end_of_month_handles_february() {
        let leap_today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let v: DateValue =
            serde_json::from_value(serde_json::json!({"date_mode": "end_of_month"})).unwrap();
        assert_eq!(resolve(&v, leap_today), "2024-02-29");
    }

    #[test]
    fn unknown_mode_passes_through() {
        let v: DateValue =
            serde_json::from_value(serde_json::json!({"date_mode": "next_eclipse"})).unwrap();
        assert_eq!(resolve(&v, today()), "next_eclipse");
    }

    #[test]
    fn resolve_is_idempotent() {
        let v: DateValue = serde_json::from_value(serde_json::json!({"date_mode": "today"})).unwrap();
        let once = resolve(&v, today());
        let twice = resolve(&DateValue::Plain(once.clone()), today());
        assert_eq!(once, twice);
    }

    #[test]
    fn plain_string_passes_through() {
        let v = DateValue::Plain("2024-06-15".to_string());
        assert_eq!(resolve(&v, today()), "2024-06-15");
    }
}
