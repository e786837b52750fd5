use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::outcome::StageOutcome;
use crate::gateways::GatewayError;

/// One record as delivered by a source, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord<P> {
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub payload: P,
}

/// A page of records in the source's natural (newest-first) order.
#[derive(Debug, Clone)]
pub struct Page<P, C> {
    pub records: Vec<RawRecord<P>>,
    pub next: Option<C>,
}

/// Paginated data source. `Cursor` is whatever the source continues from:
/// a continuation token, an offset, or a page number.
pub trait PagedSource {
    type Payload;
    type Cursor: Clone;

    fn name(&self) -> &str;
    fn fetch_page(
        &self,
        cursor: Option<&Self::Cursor>,
    ) -> Result<Page<Self::Payload, Self::Cursor>, GatewayError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectLimits {
    pub max_pages: Option<u32>,
    pub max_records: Option<usize>,
}

impl CollectLimits {
    pub const fn unbounded() -> Self {
        Self {
            max_pages: None,
            max_records: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source returned an empty page or no further cursor.
    Exhausted,
    /// A record older than the window start was reached.
    Boundary,
    PageCeiling,
    RecordCeiling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collection<P> {
    pub records: Vec<RawRecord<P>>,
    pub stop: StopReason,
}

impl<P> Collection<P> {
    /// Whether a configured ceiling ended collection before the source did.
    pub fn truncated(&self) -> bool {
        matches!(self.stop, StopReason::PageCeiling | StopReason::RecordCeiling)
    }
}

/// Follows cursors until the source runs dry or a ceiling is hit.
pub fn collect_paginated<S: PagedSource>(
    source: &S,
    limits: CollectLimits,
) -> StageOutcome<Collection<S::Payload>> {
    collect(source, None, limits)
}

/// Collects newest-first records and stops at the first record older than
/// `since`. Nothing past that record is examined, so a source that is not
/// strictly newest-first will under-collect.
pub fn collect_since<S: PagedSource>(
    source: &S,
    since: NaiveDateTime,
    limits: CollectLimits,
) -> StageOutcome<Collection<S::Payload>> {
    collect(source, Some(since), limits)
}

fn collect<S: PagedSource>(
    source: &S,
    since: Option<NaiveDateTime>,
    limits: CollectLimits,
) -> StageOutcome<Collection<S::Payload>> {
    let mut records = Vec::new();
    let mut cursor: Option<S::Cursor> = None;
    let mut pages = 0u32;

    let stop = loop {
        if limits.max_pages.is_some_and(|max| pages >= max) {
            break StopReason::PageCeiling;
        }

        let page = match source.fetch_page(cursor.as_ref()) {
            Ok(page) => page,
            Err(err) => {
                warn!(source = source.name(), error = %err, "collection failed; source contributes no records");
                return StageOutcome::failed(err);
            }
        };
        pages += 1;
        debug!(source = source.name(), page = pages, fetched = page.records.len(), "page received");

        if page.records.is_empty() {
            break StopReason::Exhausted;
        }

        let mut boundary_hit = false;
        let mut ceiling_hit = false;
        for record in page.records {
            if since.is_some_and(|start| record.timestamp < start) {
                info!(source = source.name(), "reached records older than the window start; stopping");
                boundary_hit = true;
                break;
            }
            records.push(record);
            if limits.max_records.is_some_and(|max| records.len() >= max) {
                ceiling_hit = true;
                break;
            }
        }

        if boundary_hit {
            break StopReason::Boundary;
        }
        if ceiling_hit {
            break StopReason::RecordCeiling;
        }
        match page.next {
            Some(next) => cursor = Some(next),
            None => break StopReason::Exhausted,
        }
    };

    info!(source = source.name(), count = records.len(), pages, stop = ?stop, "collection finished");
    StageOutcome::Data(Collection { records, stop })
}

/// Share left over after the scraped categories, rounded to two decimals.
/// `None` when the scraped shares already reach 100%.
pub fn residual_share(shares: &[f64]) -> Option<f64> {
    let total: f64 = shares.iter().sum();
    let residual = ((100.0 - total) * 100.0).round() / 100.0;
    (residual > 0.0).then_some(residual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::cell::RefCell;

    struct ScriptedSource {
        pages: Vec<Vec<NaiveDateTime>>,
        fetched: RefCell<Vec<usize>>,
        fail_on: Option<usize>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Vec<NaiveDateTime>>) -> Self {
            Self {
                pages,
                fetched: RefCell::new(Vec::new()),
                fail_on: None,
            }
        }
    }

    impl PagedSource for ScriptedSource {
        type Payload = usize;
        type Cursor = usize;

        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch_page(&self, cursor: Option<&usize>) -> Result<Page<usize, usize>, GatewayError> {
            let index = cursor.copied().unwrap_or(0);
            self.fetched.borrow_mut().push(index);
            if self.fail_on == Some(index) {
                return Err(GatewayError::Status {
                    status: 401,
                    body: "unauthorized".to_string(),
                });
            }
            let records = self
                .pages
                .get(index)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(offset, timestamp)| RawRecord {
                    timestamp,
                    source: "scripted".to_string(),
                    payload: index * 100 + offset,
                })
                .collect();
            let next = (index + 1 < self.pages.len()).then_some(index + 1);
            Ok(Page { records, next })
        }
    }

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn days_ago(days: i64) -> NaiveDateTime {
        base() - Duration::days(days)
    }

    #[test]
    fn early_stop_returns_prefix_and_skips_later_pages() {
        let source = ScriptedSource::new(vec![
            vec![days_ago(0), days_ago(3), days_ago(9)],
            vec![days_ago(12), days_ago(40), days_ago(41)],
            vec![days_ago(50)],
        ]);
        let since = days_ago(30);

        let collection = match collect_since(&source, since, CollectLimits::unbounded()) {
            StageOutcome::Data(collection) => collection,
            other => panic!("expected data, got {other:?}"),
        };

        let timestamps: Vec<_> = collection.records.iter().map(|r| r.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![days_ago(0), days_ago(3), days_ago(9), days_ago(12)]
        );
        assert_eq!(collection.stop, StopReason::Boundary);
        assert!(!collection.truncated());
        assert_eq!(*source.fetched.borrow(), vec![0, 1]);
    }

    #[test]
    fn record_at_window_start_is_kept() {
        let since = days_ago(5);
        let source = ScriptedSource::new(vec![vec![days_ago(1), since, days_ago(6)]]);
        let collection = collect_since(&source, since, CollectLimits::unbounded())
            .data()
            .cloned()
            .expect("data");
        assert_eq!(collection.records.len(), 2);
    }

    #[test]
    fn out_of_order_source_under_collects() {
        let source = ScriptedSource::new(vec![vec![days_ago(1), days_ago(40), days_ago(2)]]);
        let collection = collect_since(&source, days_ago(30), CollectLimits::unbounded())
            .data()
            .cloned()
            .expect("data");
        assert_eq!(collection.records.len(), 1);
    }

    #[test]
    fn pagination_honours_ceilings() {
        let source = ScriptedSource::new(vec![
            vec![days_ago(1), days_ago(2)],
            vec![days_ago(3), days_ago(4)],
            vec![days_ago(5)],
        ]);
        let by_pages = collect_paginated(
            &source,
            CollectLimits {
                max_pages: Some(2),
                max_records: None,
            },
        )
        .data()
        .cloned()
        .expect("data");
        assert_eq!(by_pages.records.len(), 4);
        assert_eq!(by_pages.stop, StopReason::PageCeiling);
        assert!(by_pages.truncated());

        let by_records = collect_paginated(
            &source,
            CollectLimits {
                max_pages: None,
                max_records: Some(3),
            },
        )
        .data()
        .cloned()
        .expect("data");
        assert_eq!(by_records.records.len(), 3);
        assert_eq!(by_records.stop, StopReason::RecordCeiling);

        let all = collect_paginated(&source, CollectLimits::unbounded())
            .data()
            .cloned()
            .expect("data");
        assert_eq!(all.records.len(), 5);
        assert_eq!(all.stop, StopReason::Exhausted);
    }

    #[test]
    fn empty_page_ends_collection() {
        let source = ScriptedSource::new(vec![vec![days_ago(1)], Vec::new(), vec![days_ago(2)]]);
        let collection = collect_paginated(&source, CollectLimits::unbounded())
            .data()
            .cloned()
            .expect("data");
        assert_eq!(collection.records.len(), 1);
        assert_eq!(*source.fetched.borrow(), vec![0, 1]);
    }

    #[test]
    fn transport_failure_is_reported_not_raised() {
        let mut source = ScriptedSource::new(vec![vec![days_ago(1)], vec![days_ago(2)]]);
        source.fail_on = Some(1);
        let outcome = collect_paginated(&source, CollectLimits::unbounded());
        assert!(outcome.is_failed());
        assert!(outcome.map(|c| c.records).into_rows().is_empty());
    }

    #[test]
    fn residual_share_fills_to_one_hundred() {
        assert_eq!(residual_share(&[40.0, 35.5, 20.0]), Some(4.5));
        assert_eq!(residual_share(&[60.0, 40.0]), None);
        assert_eq!(residual_share(&[60.0, 40.5]), None);
        assert_eq!(residual_share(&[33.333, 33.333]), Some(33.33));
        assert_eq!(residual_share(&[]), Some(100.0));
    }
}
