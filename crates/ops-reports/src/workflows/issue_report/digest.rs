use chrono::NaiveDate;

use super::issues::IssueRow;
use crate::pipeline::markup::{escape_chat, escape_html, EMPTY_STATE};
use crate::pipeline::ReportBundle;

/// Issues listed per chat message; the total still counts every issue.
pub const CHAT_ROW_LIMIT: usize = 15;

pub const EMPTY_DIGEST_BODY: &str = "No stale issues were found for any condition. 🎉";

const DIGEST_INTRO: &str = "<h1>Stale issue daily digest</h1>\
<p>Open issues matching the tracked query that have not been updated recently. Assignees, please update their progress.</p>\
<p>Issues in a finished state are excluded by the query.</p>\
<br><hr><br>";

const BLOCK_SEPARATOR: &str = "<br><hr><br>";

/// Shown in place of the empty state when a bucket's search failed.
pub const QUERY_FAILED: &str = "⚠ could not query the issue tracker";

/// One bucket's rows, or the reason its search failed.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketDigest {
    pub bundle: ReportBundle<IssueRow>,
    pub failure: Option<String>,
}

impl BucketDigest {
    pub fn found(bundle: ReportBundle<IssueRow>) -> Self {
        Self {
            bundle,
            failure: None,
        }
    }

    pub fn failed(bundle: ReportBundle<IssueRow>, reason: impl Into<String>) -> Self {
        Self {
            bundle,
            failure: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub fn chat_message(bucket: &BucketDigest) -> String {
    let bundle = &bucket.bundle;
    if let Some(reason) = &bucket.failure {
        return format!(
            "*{}*: {QUERY_FAILED} ({})",
            escape_chat(&bundle.title),
            escape_chat(reason)
        );
    }
    if bundle.is_empty() {
        return format!("{}: {EMPTY_STATE}", escape_chat(&bundle.title));
    }

    let mut lines = vec![format!("*{}*", escape_chat(&bundle.title))];
    for row in bundle.rows.iter().take(CHAT_ROW_LIMIT) {
        lines.push(format!(
            "• <{}|{}> - {}, {}, {} - [latest comment: {}]",
            row.url,
            row.key,
            escape_chat(&row.status),
            escape_chat(&row.summary),
            escape_chat(&row.assignee),
            row.latest_comment_date
        ));
    }
    lines.push(format!(
        "\n*{} issues in total* as of {}",
        bundle.total_count,
        bundle.generated_at.format("%Y-%m-%d %H:%M")
    ));
    lines.join("\n")
}

pub fn html_block(bucket: &BucketDigest) -> String {
    let bundle = &bucket.bundle;
    let title = escape_html(&bundle.title);
    if let Some(reason) = &bucket.failure {
        return format!(
            "<h2>{title}</h2><p style=\"color: #b00;\">{QUERY_FAILED}: {}</p>",
            escape_html(reason)
        );
    }
    if bundle.is_empty() {
        return format!("<h2>{title}</h2><p>{EMPTY_STATE}</p>");
    }

    let mut html = format!(
        "<h2>{title} ({} issues)</h2><ul style=\"list-style-type: none; padding-left: 20px;\">",
        bundle.total_count
    );
    for row in &bundle.rows {
        html.push_str(&format!(
            "<li>• <a href=\"{url}\" style=\"text-decoration:none;\">{key}</a> - {status}, {summary}, {assignee} \
             <span style=\"color: #666;\">(latest comment: {comment})</span></li>",
            url = escape_html(&row.url),
            key = escape_html(&row.key),
            status = escape_html(&row.status),
            summary = escape_html(&row.summary),
            assignee = escape_html(&row.assignee),
            comment = row.latest_comment_date,
        ));
    }
    html.push_str("</ul>");
    html
}

pub fn email_subject(total: usize, failed: usize, date: NaiveDate) -> String {
    let date = date.format("%Y-%m-%d");
    if failed > 0 {
        format!("Stale issue digest ({total} total, {failed} searches failed) - {date}")
    } else {
        format!("Stale issue digest ({total} total) - {date}")
    }
}

pub fn email_body(blocks: &[String]) -> String {
    let mut body = String::from(DIGEST_INTRO);
    for block in blocks {
        body.push_str(block);
        body.push_str(BLOCK_SEPARATOR);
    }
    body
}

/// All buckets flattened into CSV rows, each bucket preceded by its
/// separator row.
pub fn csv_rows(buckets: &[BucketDigest]) -> Vec<IssueRow> {
    buckets
        .iter()
        .flat_map(|bucket| {
            let bundle = &bucket.bundle;
            let separator = if bucket.is_failed() {
                IssueRow::failed_separator(&bundle.title)
            } else {
                IssueRow::separator(&bundle.title, bundle.total_count)
            };
            std::iter::once(separator).chain(bundle.rows.iter().cloned())
        })
        .collect()
}
