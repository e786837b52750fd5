use chrono::{DateTime, Local, NaiveDateTime};
use serde::Deserialize;
use std::sync::Arc;

use super::transport::{decode_json, HttpTransport};
use super::GatewayError;
use crate::config::{AppStoreFeedConfig, PlayFeedConfig};
use crate::pipeline::collector::{Page, PagedSource, RawRecord};

pub const PLAY_SOURCE: &str = "Google Play";
pub const APP_STORE_SOURCE: &str = "App Store";
const APP_STORE_FEED_BASE: &str = "https://itunes.apple.com";

/// A store review reduced to the columns the monthly report exports.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreReview {
    pub score: u8,
    pub content: String,
}

/// Store timestamps arrive either zoned or as local wall-clock time; reports
/// compare against local wall-clock windows.
fn local_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(zoned) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(zoned.with_timezone(&Local).naive_local());
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

#[derive(Debug, Deserialize)]
struct PlayResponse {
    #[serde(default)]
    reviews: Vec<PlayReview>,
    #[serde(default)]
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayReview {
    score: u8,
    #[serde(default)]
    content: Option<String>,
    at: String,
}

pub(crate) fn parse_play_page(body: &str) -> Result<Page<StoreReview, String>, GatewayError> {
    let response: PlayResponse = decode_json(body)?;
    let records = response
        .reviews
        .into_iter()
        .map(|review| {
            let timestamp = local_timestamp(&review.at)
                .ok_or_else(|| GatewayError::Decode(format!("unparseable review date '{}'", review.at)))?;
            Ok(RawRecord {
                timestamp,
                source: PLAY_SOURCE.to_string(),
                payload: StoreReview {
                    score: review.score,
                    content: review.content.unwrap_or_default(),
                },
            })
        })
        .collect::<Result<Vec<_>, GatewayError>>()?;

    Ok(Page {
        records,
        next: response
            .continuation_token
            .filter(|token| !token.trim().is_empty()),
    })
}

/// Newest-first review feed continued with an opaque token.
#[derive(Debug)]
pub struct PlayReviewFeed {
    transport: Arc<HttpTransport>,
    config: PlayFeedConfig,
}

impl PlayReviewFeed {
    pub fn new(transport: Arc<HttpTransport>, config: PlayFeedConfig) -> Self {
        Self { transport, config }
    }

    pub fn max_pages(&self) -> Option<u32> {
        self.config.max_pages
    }
}

impl PagedSource for PlayReviewFeed {
    type Payload = StoreReview;
    type Cursor = String;

    fn name(&self) -> &str {
        PLAY_SOURCE
    }

    fn fetch_page(&self, cursor: Option<&String>) -> Result<Page<StoreReview, String>, GatewayError> {
        let mut params = vec![
            ("app_id", self.config.app_id.clone()),
            ("lang", self.config.lang.clone()),
            ("country", self.config.country.clone()),
            ("sort", "newest".to_string()),
            ("count", self.config.page_size.to_string()),
        ];
        if let Some(token) = cursor {
            params.push(("continuation_token", token.clone()));
        }
        let builder = self
            .transport
            .client()
            .get(&self.config.endpoint)
            .query(&params);
        let body = self.transport.send(builder)?;
        parse_play_page(&body)
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    feed: Feed,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    entry: Option<OneOrMany<FeedEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Label {
    label: String,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    updated: Label,
    #[serde(rename = "im:rating")]
    rating: Option<Label>,
    content: Option<Label>,
}

pub(crate) fn parse_app_store_page(
    body: &str,
    page: u32,
    max_pages: u32,
) -> Result<Page<StoreReview, u32>, GatewayError> {
    let response: FeedResponse = decode_json(body)?;
    let entries = response
        .feed
        .entry
        .map(OneOrMany::into_vec)
        .unwrap_or_default();

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        // Entries without a rating describe the app itself, not a review.
        let Some(rating) = entry.rating else { continue };
        let timestamp = local_timestamp(&entry.updated.label).ok_or_else(|| {
            GatewayError::Decode(format!("unparseable review date '{}'", entry.updated.label))
        })?;
        let score = rating
            .label
            .trim()
            .parse::<u8>()
            .map_err(|err| GatewayError::Decode(format!("bad rating '{}': {err}", rating.label)))?;
        records.push(RawRecord {
            timestamp,
            source: APP_STORE_SOURCE.to_string(),
            payload: StoreReview {
                score,
                content: entry.content.map(|label| label.label).unwrap_or_default(),
            },
        });
    }

    let next = (page < max_pages && !records.is_empty()).then_some(page + 1);
    Ok(Page { records, next })
}

/// Customer review JSON feed, paged by number and sorted most recent first.
#[derive(Debug)]
pub struct AppStoreReviewFeed {
    transport: Arc<HttpTransport>,
    config: AppStoreFeedConfig,
    base_url: String,
}

impl AppStoreReviewFeed {
    pub fn new(transport: Arc<HttpTransport>, config: AppStoreFeedConfig) -> Self {
        Self {
            transport,
            config,
            base_url: APP_STORE_FEED_BASE.to_string(),
        }
    }

    pub fn max_pages(&self) -> u32 {
        self.config.max_pages
    }

    fn page_url(&self, page: u32) -> String {
        format!(
            "{}/{}/rss/customerreviews/page={page}/id={}/sortby=mostrecent/json",
            self.base_url, self.config.country, self.config.app_id
        )
    }
}

impl PagedSource for AppStoreReviewFeed {
    type Payload = StoreReview;
    type Cursor = u32;

    fn name(&self) -> &str {
        APP_STORE_SOURCE
    }

    fn fetch_page(&self, cursor: Option<&u32>) -> Result<Page<StoreReview, u32>, GatewayError> {
        let page = cursor.copied().unwrap_or(1);
        let builder = self.transport.client().get(self.page_url(page));
        let body = self.transport.send(builder)?;
        parse_app_store_page(&body, page, self.config.max_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn play_page_keeps_order_and_token() {
        let body = r#"{
            "reviews": [
                {"score": 5, "content": "Great <b>app</b>", "at": "2024-05-30T21:04:11"},
                {"score": 1, "content": null, "at": "2024-05-02 08:00:00"}
            ],
            "continuation_token": "abc"
        }"#;
        let page = parse_play_page(body).expect("parses");
        assert_eq!(page.next.as_deref(), Some("abc"));
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].payload.content, "Great <b>app</b>");
        assert_eq!(page.records[1].payload.content, "");
        assert_eq!(
            page.records[1].timestamp,
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap().and_hms_opt(8, 0, 0).unwrap()
        );
        assert_eq!(page.records[0].source, PLAY_SOURCE);
    }

    #[test]
    fn play_page_without_token_ends_feed() {
        let page = parse_play_page(r#"{"reviews": [], "continuation_token": ""}"#).expect("parses");
        assert!(page.next.is_none());
        assert!(page.records.is_empty());
    }

    #[test]
    fn app_store_feed_skips_app_entry_and_pages_forward() {
        let body = r#"{"feed": {"entry": [
            {"updated": {"label": "2024-05-30T01:00:00-07:00"}, "title": {"label": "App"}},
            {"updated": {"label": "2024-05-29T01:00:00-07:00"}, "im:rating": {"label": "4"}, "content": {"label": "Nice"}}
        ]}}"#;
        let page = parse_app_store_page(body, 1, 10).expect("parses");
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].payload.score, 4);
        assert_eq!(page.next, Some(2));

        let last = parse_app_store_page(body, 10, 10).expect("parses");
        assert!(last.next.is_none());
    }

    #[test]
    fn app_store_single_entry_and_empty_feed() {
        let single = r#"{"feed": {"entry": {"updated": {"label": "2024-05-29T01:00:00-07:00"}, "im:rating": {"label": "2"}}}}"#;
        assert_eq!(parse_app_store_page(single, 1, 10).expect("parses").records.len(), 1);

        let empty = parse_app_store_page(r#"{"feed": {}}"#, 3, 10).expect("parses");
        assert!(empty.records.is_empty());
        assert!(empty.next.is_none());
    }
}
