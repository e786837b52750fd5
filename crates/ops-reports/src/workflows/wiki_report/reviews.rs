use serde::Serialize;
use tracing::info;

use super::{export_or_skip, ReportContext, WikiReportOutcome};
use crate::config::ReviewReportConfig;
use crate::gateways::store_reviews::StoreReview;
use crate::pipeline::markup::{escape_html, timestamp_line, EMPTY_STATE};
use crate::pipeline::{
    collect_since, merge_within_window, publish_page, CollectLimits, Collection, PageRequest,
    PagedSource, RawRecord, ReportBundle, ReportWindow, StageOutcome, WikiGateway,
};

/// Exported review columns, in header order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRow {
    pub score: u8,
    pub content: String,
    pub date: String,
    pub source: String,
}

impl From<RawRecord<StoreReview>> for ReviewRow {
    fn from(record: RawRecord<StoreReview>) -> Self {
        Self {
            score: record.payload.score,
            content: record.payload.content,
            date: record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            source: record.source,
        }
    }
}

pub fn review_title(window: &ReportWindow) -> String {
    format!("[App Review] {}", window.period_label())
}

pub fn review_export_name(window: &ReportWindow) -> String {
    format!("reviews_{}.csv", window.month_key())
}

/// Newest-first collection that stops at the first review older than the
/// window start.
pub fn collect_reviews<S>(
    source: &S,
    window: &ReportWindow,
    limits: CollectLimits,
) -> StageOutcome<Collection<StoreReview>>
where
    S: PagedSource<Payload = StoreReview>,
{
    collect_since(source, window.start, limits)
}

pub fn review_bundle(
    sources: Vec<StageOutcome<Collection<StoreReview>>>,
    window: &ReportWindow,
    generated_at: chrono::NaiveDateTime,
) -> ReportBundle<ReviewRow> {
    let rows = merge_within_window(sources, window)
        .into_iter()
        .map(ReviewRow::from)
        .collect();
    ReportBundle::new(review_title(window), rows, generated_at)
}

fn review_table(rows: &[ReviewRow]) -> String {
    let mut table = String::from(
        "<table class=\"confluenceTable\"><thead><tr><th>score</th><th>content</th><th>date</th><th>source</th></tr></thead><tbody>",
    );
    for row in rows {
        table.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            row.score,
            escape_html(&row.content),
            row.date,
            escape_html(&row.source)
        ));
    }
    table.push_str("</tbody></table>");
    table
}

pub fn render_review_page(
    bundle: &ReportBundle<ReviewRow>,
    window: &ReportWindow,
    platforms: &[String],
) -> String {
    let platforms = if platforms.is_empty() {
        "none configured".to_string()
    } else {
        platforms.join(", ")
    };
    let listing = if bundle.is_empty() {
        format!("<p>{EMPTY_STATE}</p>")
    } else {
        review_table(&bundle.rows)
    };

    format!(
        "<h2>Combined app review report for {period}</h2>\
         <p>Platforms: {platforms}</p>\
         <p>Period: {start} ~ {end}</p>\
         <p>Generated at: {generated}</p>\
         <h3>Reviews from last month ({count} total)</h3>\
         {listing}",
        period = window.start.format("%B %Y"),
        platforms = escape_html(&platforms),
        start = window.start.format("%Y-%m-%d"),
        end = window.end.format("%Y-%m-%d"),
        generated = timestamp_line(bundle.generated_at),
        count = bundle.total_count,
    )
}

/// Aggregates the collected reviews and publishes them as one page.
pub fn publish_reviews(
    wiki: &dyn WikiGateway,
    config: &ReviewReportConfig,
    context: &ReportContext,
    platforms: &[String],
    sources: Vec<StageOutcome<Collection<StoreReview>>>,
) -> WikiReportOutcome {
    let bundle = review_bundle(sources, &context.window, context.generated_at);
    info!(title = %bundle.title, count = bundle.total_count, "review report aggregated");

    let body = render_review_page(&bundle, &context.window, platforms);
    let export = export_or_skip(
        &context.export_dir,
        &review_export_name(&context.window),
        &bundle.rows,
    );
    let request = PageRequest {
        space_key: &config.space_key,
        parent_id: config.parent_page_id.as_deref(),
        title: &bundle.title,
        body: &body,
    };
    let publication = publish_page(wiki, &request, export);

    WikiReportOutcome {
        title: bundle.title,
        total_count: bundle.total_count,
        publication,
    }
}
