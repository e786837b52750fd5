use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::info;

use super::collector::{Collection, RawRecord};
use super::outcome::StageOutcome;
use super::window::ReportWindow;

/// Placeholder for a derived date when there is nothing to derive it from.
pub const NO_DATE: &str = "none";

/// Rows plus the metadata a formatter needs. Built once per report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBundle<R> {
    pub title: String,
    pub rows: Vec<R>,
    pub total_count: usize,
    pub generated_at: NaiveDateTime,
}

impl<R> ReportBundle<R> {
    pub fn new(title: impl Into<String>, rows: Vec<R>, generated_at: NaiveDateTime) -> Self {
        let total_count = rows.len();
        Self {
            title: title.into(),
            rows,
            total_count,
            generated_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Merges every source's records in arrival order and keeps those inside the
/// window. Failed or empty sources simply contribute nothing.
pub fn merge_within_window<P>(
    sources: Vec<StageOutcome<Collection<P>>>,
    window: &ReportWindow,
) -> Vec<RawRecord<P>> {
    let mut merged = Vec::new();
    let mut skipped_sources = 0usize;

    for outcome in sources {
        match outcome {
            StageOutcome::Data(collection) => merged.extend(
                collection
                    .records
                    .into_iter()
                    .filter(|record| window.contains(record.timestamp)),
            ),
            StageOutcome::Empty | StageOutcome::Failed(_) => skipped_sources += 1,
        }
    }

    info!(
        kept = merged.len(),
        skipped_sources,
        start = %window.start,
        end = %window.end,
        "records aggregated"
    );
    merged
}

/// Most recent of the given tracker timestamps as `YYYY-MM-DD`, or
/// [`NO_DATE`] when none of them parse.
pub fn latest_date<'a, I>(timestamps: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    timestamps
        .into_iter()
        .filter_map(parse_instant)
        .max_by_key(|(instant, _)| *instant)
        .map(|(_, local_date)| local_date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| NO_DATE.to_string())
}

/// Parses tracker-style timestamps into a comparable UTC instant plus the
/// calendar date as written in the source.
pub(crate) fn parse_instant(raw: &str) -> Option<(NaiveDateTime, NaiveDate)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, format) {
            return Some((parsed.naive_utc(), parsed.date_naive()));
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some((parsed.naive_utc(), parsed.date_naive()));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some((parsed, parsed.date()));
    }

    let prefix = trimmed.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0).map(|midnight| (midnight, date)))
}

/// Date-only rendering of a tracker timestamp, falling back to its first ten
/// characters when it does not parse.
pub fn date_only(raw: &str) -> String {
    match parse_instant(raw) {
        Some((_, date)) => date.format("%Y-%m-%d").to_string(),
        None => raw.chars().take(10).collect(),
    }
}
