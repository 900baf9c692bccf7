// Due-date derivation and status classification
//
// Every calendar computation here works on plain dates that were already
// resolved in the configured timezone, so day differences are whole days.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Days before the due date at which an unpaid card turns yellow
pub const DUE_SOON_DAYS: i64 = 5;

/// Display status of a card for the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DueStatus {
    /// Paid this cycle
    Green,
    /// Due today or overdue
    Red,
    /// Due within the next few days
    Yellow,
    /// Not due yet
    White,
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in the given month (1-12) of `year`
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}

/// Day `day` of the given month, clamped into the month
///
/// Days past the end of the month land on its last day, never in the next
/// month. Day 0 is treated as day 1.
pub fn clamp_to_month(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Due date of `due_day` in the month of `reference`
pub fn derive_due_date(due_day: u32, reference: NaiveDate) -> NaiveDate {
    // `reference` is a valid date, so its own year/month always has a day 1..=len
    clamp_to_month(reference.year(), reference.month(), due_day).unwrap_or(reference)
}

/// Classify a card given its paid flag, due date and today's date
pub fn classify(paid: bool, due_date: NaiveDate, today: NaiveDate) -> DueStatus {
    if paid {
        return DueStatus::Green;
    }

    if today >= due_date {
        return DueStatus::Red;
    }

    if (due_date - today).num_days() <= DUE_SOON_DAYS {
        DueStatus::Yellow
    } else {
        DueStatus::White
    }
}

/// The calendar date of `now` in `tz`
pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}
