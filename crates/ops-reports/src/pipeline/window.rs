use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Inclusive reporting period in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ReportWindow {
    /// The calendar month before the one containing `now`, from 00:00:00 on
    /// the first to 23:59:59 on the last day.
    pub fn previous_month(now: NaiveDateTime) -> Self {
        let today = now.date();
        let first_of_current = today - Duration::days(i64::from(today.day0()));
        let last_of_previous = first_of_current - Duration::days(1);
        let first_of_previous = last_of_previous - Duration::days(i64::from(last_of_previous.day0()));

        Self {
            start: first_of_previous.and_time(NaiveTime::MIN),
            end: first_of_current.and_time(NaiveTime::MIN) - Duration::seconds(1),
        }
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// `2024-05`, used in page titles.
    pub fn period_label(&self) -> String {
        self.start.format("%Y-%m").to_string()
    }

    /// `202405`, used in export file names and scrape URLs.
    pub fn month_key(&self) -> String {
        self.start.format("%Y%m").to_string()
    }
}

/// Relative age range `(now - upper, now - lower]` measured in whole weeks.
/// An open upper bound reaches back indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeBucket {
    pub title: String,
    pub lower_weeks: u32,
    pub upper_weeks: Option<u32>,
}

impl AgeBucket {
    pub fn new(title: impl Into<String>, lower_weeks: u32, upper_weeks: Option<u32>) -> Self {
        Self {
            title: title.into(),
            lower_weeks,
            upper_weeks,
        }
    }

    /// Newest timestamp that still falls in the bucket.
    pub fn newest(&self, now: NaiveDateTime) -> NaiveDateTime {
        now - Duration::weeks(i64::from(self.lower_weeks))
    }

    /// Exclusive lower limit, `None` for the open-ended bucket.
    pub fn oldest_exclusive(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.upper_weeks
            .map(|weeks| now - Duration::weeks(i64::from(weeks)))
    }

    pub fn contains(&self, now: NaiveDateTime, timestamp: NaiveDateTime) -> bool {
        let within_newest = timestamp <= self.newest(now);
        let within_oldest = match self.oldest_exclusive(now) {
            Some(limit) => timestamp > limit,
            None => true,
        };
        within_newest && within_oldest
    }

    /// Tracker query clause selecting issues last updated inside the bucket.
    pub fn query_clause(&self) -> String {
        match self.upper_weeks {
            Some(upper) => format!(
                "updated <= -{}w AND updated > -{}w",
                self.lower_weeks, upper
            ),
            None => format!("updated <= -{}w", self.lower_weeks),
        }
    }
}

/// The four consecutive stale-issue buckets: 1-2, 2-3, 3-4 and 4+ weeks.
pub fn stale_issue_buckets() -> Vec<AgeBucket> {
    vec![
        AgeBucket::new("Not updated for 1 to 2 weeks", 1, Some(2)),
        AgeBucket::new("Not updated for 2 to 3 weeks", 2, Some(3)),
        AgeBucket::new("Not updated for 3 to 4 weeks", 3, Some(4)),
        AgeBucket::new("Not updated for over 4 weeks", 4, None),
    ]
}
