use scraper::{ElementRef, Html, Selector};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

use super::transport::HttpTransport;
use super::GatewayError;

#[derive(Debug, Clone, PartialEq)]
pub struct ShareEntry {
    pub item: String,
    pub share: f64,
}

/// Snapshot table of one statistics page.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareSnapshot {
    pub caption: String,
    pub entries: Vec<ShareEntry>,
    pub embed_code: Option<String>,
}

/// One category page narrowed to a single calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Category page without query or fragment.
    pub page_url: String,
    /// `YYYYMM`.
    pub month: String,
}

impl SnapshotRequest {
    /// Period selection sent to the server. Fragments never leave the
    /// client, so the month has to travel in the query string.
    pub fn query(&self) -> [(&'static str, &str); 3] {
        [
            ("granularity", "monthly"),
            ("fromInt", self.month.as_str()),
            ("toInt", self.month.as_str()),
        ]
    }

    /// Browser link that opens the same single-month bar chart.
    pub fn chart_link(&self) -> String {
        format!("{}#monthly-{m}-{m}-bar", self.page_url, m = self.month)
    }
}

pub trait ShareSource: Debug {
    fn fetch_snapshot(&self, request: &SnapshotRequest) -> Result<ShareSnapshot, GatewayError>;
}

/// Fetches statistics pages and reads their snapshot table. The session is
/// held for the whole run and released on drop.
#[derive(Debug)]
pub struct StatsPageClient {
    transport: Arc<HttpTransport>,
}

impl StatsPageClient {
    pub fn new(transport: Arc<HttpTransport>) -> Self {
        debug!("stats page session opened");
        Self { transport }
    }
}

impl Drop for StatsPageClient {
    fn drop(&mut self) {
        debug!("stats page session closed");
    }
}

impl ShareSource for StatsPageClient {
    fn fetch_snapshot(&self, request: &SnapshotRequest) -> Result<ShareSnapshot, GatewayError> {
        debug!(page = %request.page_url, month = %request.month, "fetching snapshot");
        let builder = self
            .transport
            .client()
            .get(&request.page_url)
            .query(&request.query());
        let body = self.transport.send(builder)?;
        parse_snapshot(&body)
    }
}

fn selector(css: &str) -> Result<Selector, GatewayError> {
    Selector::parse(css).map_err(|err| GatewayError::Decode(format!("bad selector '{css}': {err}")))
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads caption, item/share rows and the embed snippet from a page.
pub fn parse_snapshot(html: &str) -> Result<ShareSnapshot, GatewayError> {
    let document = Html::parse_document(html);
    let table = document
        .select(&selector(".stats-snapshot")?)
        .next()
        .ok_or_else(|| GatewayError::Decode("snapshot table not found".to_string()))?;

    let caption = table
        .select(&selector("tfoot")?)
        .next()
        .map(text_of)
        .unwrap_or_default();

    let row_selector = selector("tbody tr")?;
    let item_selector = selector("th")?;
    let share_selector = selector("td > span.count")?;

    let mut entries = Vec::new();
    for row in table.select(&row_selector) {
        let item = row
            .select(&item_selector)
            .next()
            .map(text_of)
            .ok_or_else(|| GatewayError::Decode("snapshot row without item".to_string()))?;
        let raw_share = row
            .select(&share_selector)
            .next()
            .map(text_of)
            .ok_or_else(|| GatewayError::Decode(format!("no share value for '{item}'")))?;
        let share = raw_share
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .map_err(|err| GatewayError::Decode(format!("bad share '{raw_share}' for '{item}': {err}")))?;
        entries.push(ShareEntry { item, share });
    }

    let embed_code = document
        .select(&selector("#embed-code")?)
        .next()
        .and_then(|element| element.value().attr("value"))
        .map(str::to_string);

    Ok(ShareSnapshot {
        caption,
        entries,
        embed_code,
    })
}
