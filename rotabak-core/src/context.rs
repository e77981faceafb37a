//! Per-run context shared by every entry of a run.
//!
//! Everything that would otherwise be process-wide state (the date the run
//! is anchored to, the calendar anchors, the host name) lives here and is
//! passed explicitly to the pipeline and the classifier.

use chrono::{Local, NaiveDate, Weekday};
use std::time::Duration;
use uuid::Uuid;

/// Day of week and day of month used to pick weekly and monthly candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarAnchors {
    pub day_of_week: Weekday,
    pub day_of_month: u32,
}

impl Default for CalendarAnchors {
    fn default() -> Self {
        Self {
            day_of_week: Weekday::Mon,
            day_of_month: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    /// Date the whole run is anchored to; fixed at startup so a run crossing
    /// midnight keeps classifying against the same day.
    pub today: NaiveDate,

    pub anchors: CalendarAnchors,

    /// Host name reported in the run summary
    pub hostname: String,

    /// Identifier attached to log lines and the summary
    pub run_id: Uuid,

    /// Pause after each processed entry
    pub sleep_between: Duration,
}

impl RunContext {
    pub fn new(today: NaiveDate, anchors: CalendarAnchors) -> Self {
        Self {
            today,
            anchors,
            hostname: detect_hostname(),
            run_id: Uuid::new_v4(),
            sleep_between: Duration::ZERO,
        }
    }

    /// Context anchored to the local calendar date.
    pub fn for_today(anchors: CalendarAnchors) -> Self {
        Self::new(Local::now().date_naive(), anchors)
    }

    pub fn with_sleep_between(mut self, sleep_between: Duration) -> Self {
        self.sleep_between = sleep_between;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }
}

pub fn detect_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
