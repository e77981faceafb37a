//! Grandfather-father-son retention classification.
//!
//! An artifact is kept as a daily backup while it is younger than the daily
//! depth. Past that, it survives only if it was taken on the weekly anchor
//! weekday (within the weekly depth) or on the monthly anchor day (within
//! the monthly depth). Everything else is expired.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::context::CalendarAnchors;

/// Retention depths for the three tiers. A depth of 0 disables the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionSchedule {
    /// Days
    pub daily: u32,
    /// Weeks
    pub weekly: u32,
    /// Calendar months
    pub monthly: u32,
}

impl RetentionSchedule {
    pub fn new(daily: u32, weekly: u32, monthly: u32) -> Self {
        Self {
            daily,
            weekly,
            monthly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Daily,
    Weekly,
    Monthly,
    Expired,
}

impl Tier {
    pub fn is_retained(self) -> bool {
        self != Tier::Expired
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
            Tier::Monthly => "monthly",
            Tier::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// Cut-off dates derived from a schedule; a date must be strictly after a
/// limit to fall inside the corresponding tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionLimits {
    pub daily: NaiveDate,
    pub weekly: NaiveDate,
    pub monthly: NaiveDate,
}

impl RetentionLimits {
    pub fn compute(today: NaiveDate, schedule: &RetentionSchedule) -> Self {
        let weekly_days = 7 * u64::from(schedule.weekly);
        Self {
            daily: days_back(today, u64::from(schedule.daily)),
            weekly: days_back(today, weekly_days),
            monthly: months_back(today, schedule.monthly),
        }
    }
}

/// Classify an artifact date. Tiers are tested in the order daily, weekly,
/// monthly; the first match wins, so the result is always exactly one tier.
pub fn classify(
    date: NaiveDate,
    today: NaiveDate,
    schedule: &RetentionSchedule,
    anchors: &CalendarAnchors,
) -> Tier {
    let limits = RetentionLimits::compute(today, schedule);
    trace!(
        date = %date,
        daily = %limits.daily,
        weekly = %limits.weekly,
        monthly = %limits.monthly,
        "retention limits"
    );

    if date > limits.daily {
        Tier::Daily
    } else if date.weekday() == anchors.day_of_week && date > limits.weekly {
        Tier::Weekly
    } else if date.day() == anchors.day_of_month && date > limits.monthly {
        Tier::Monthly
    } else {
        Tier::Expired
    }
}

fn days_back(today: NaiveDate, days: u64) -> NaiveDate {
    today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

/// Shift back by calendar months. When the day does not exist in the target
/// month it is clamped to that month's last day (2024-03-31 minus one month
/// is 2024-02-29).
fn months_back(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}
