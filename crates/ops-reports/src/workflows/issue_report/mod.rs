//! Stale issue digest: one tracker search per age bucket, a chat message per
//! bucket, and one email carrying every bucket plus a CSV.

pub mod digest;
pub mod issues;

use chrono::NaiveDateTime;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{DigestConfig, IssueReportConfig};
use crate::gateways::{GatewayError, HttpTransport, IssueTracker, JiraClient, SlackWebhook, SmtpMailer, TrackerSearch};
use crate::pipeline::{
    collect_paginated, deliver_chat, deliver_mail, stale_issue_buckets, AgeBucket, ChatSink,
    CollectLimits, ExportFile, MailSink, ReportBundle, StageOutcome,
};

pub use digest::{
    chat_message, csv_rows, email_body, email_subject, html_block, BucketDigest, CHAT_ROW_LIMIT,
    EMPTY_DIGEST_BODY, QUERY_FAILED,
};
pub use issues::{IssueRow, DIGEST_FIELDS};

/// Collaborators of one digest run.
#[derive(Debug, Clone, Copy)]
pub struct DigestSinks<'a> {
    pub tracker: &'a dyn IssueTracker,
    pub chat: &'a dyn ChatSink,
    pub mail: &'a dyn MailSink,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketSummary {
    pub title: String,
    pub total_count: usize,
    pub collection: &'static str,
    pub chat: StageOutcome<()>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigestOutcome {
    pub buckets: Vec<BucketSummary>,
    pub total_count: usize,
    pub mail: StageOutcome<()>,
    pub comments_posted: usize,
}

impl DigestOutcome {
    /// Whether at least one sink accepted its output.
    pub fn delivered_anywhere(&self) -> bool {
        self.mail.is_data() || self.buckets.iter().any(|bucket| bucket.chat.is_data())
    }
}

pub fn bucket_query(digest: &DigestConfig, bucket: &AgeBucket) -> String {
    format!(
        "{} AND {} {}",
        digest.base_query.trim(),
        bucket.query_clause(),
        digest.order_by.trim()
    )
    .trim_end()
    .to_string()
}

fn collect_bucket(
    tracker: &dyn IssueTracker,
    digest: &DigestConfig,
    bucket: &AgeBucket,
    now: NaiveDateTime,
) -> (StageOutcome<Vec<IssueRow>>, BucketDigest) {
    let query = bucket_query(digest, bucket);
    info!(bucket = %bucket.title, query = %query, "searching bucket");
    let search = TrackerSearch::new(tracker, query, &DIGEST_FIELDS);
    let limits = CollectLimits {
        max_pages: None,
        max_records: Some(digest.max_results),
    };
    let outcome = collect_paginated(&search, limits).map(|collection| {
        collection
            .records
            .iter()
            .map(|record| IssueRow::from_issue(&record.payload, tracker.browse_url(&record.payload.key)))
            .collect::<Vec<_>>()
    });
    let outcome = match outcome {
        StageOutcome::Data(rows) => StageOutcome::from_rows(rows),
        other => other,
    };
    let bundle = ReportBundle::new(bucket.title.clone(), outcome.clone().into_rows(), now);
    let digest = match &outcome {
        StageOutcome::Failed(reason) => {
            error!(bucket = %bucket.title, reason = %reason, "bucket search failed");
            BucketDigest::failed(bundle, reason.clone())
        }
        _ => BucketDigest::found(bundle),
    };
    (outcome, digest)
}

fn remind_assignees(tracker: &dyn IssueTracker, rows: &[IssueRow], text: &str) -> usize {
    let mut posted = 0;
    for row in rows {
        let Some(account_id) = row.assignee_account() else {
            info!(issue = %row.key, "no assignee; reminder skipped");
            continue;
        };
        match tracker.add_comment(&row.key, account_id, text) {
            Ok(()) => {
                info!(issue = %row.key, "reminder comment posted");
                posted += 1;
            }
            Err(err) => warn!(issue = %row.key, error = %err, "reminder comment failed"),
        }
    }
    posted
}

/// Runs every bucket against the given sinks. Each sink is attempted
/// regardless of how the others fared.
pub fn run_digest(
    sinks: DigestSinks<'_>,
    digest: &DigestConfig,
    now: NaiveDateTime,
    export_dir: &Path,
) -> DigestOutcome {
    let mut buckets = Vec::new();
    let mut digests = Vec::new();
    let mut blocks = Vec::new();
    let mut comments_posted = 0;

    for bucket in stale_issue_buckets() {
        let (outcome, found) = collect_bucket(sinks.tracker, digest, &bucket, now);
        let chat = deliver_chat(sinks.chat, &chat_message(&found));
        blocks.push(html_block(&found));
        if digest.notify_assignees {
            comments_posted += remind_assignees(sinks.tracker, &found.bundle.rows, &digest.reminder_text);
        }
        buckets.push(BucketSummary {
            title: found.bundle.title.clone(),
            total_count: found.bundle.total_count,
            collection: outcome.label(),
            chat,
        });
        digests.push(found);
    }

    let total_count: usize = digests.iter().map(|found| found.bundle.total_count).sum();
    let failed_searches = digests.iter().filter(|found| found.is_failed()).count();
    let subject = email_subject(total_count, failed_searches, now.date());
    let mail = if total_count > 0 {
        let name = format!("issue_digest_{}.csv", now.format("%Y%m%d_%H%M%S"));
        let export = match ExportFile::write(export_dir, &name, &csv_rows(&digests), false) {
            Ok(file) => file,
            Err(err) => {
                error!(file = %name, error = %err, "digest CSV could not be written; mailing without it");
                None
            }
        };
        deliver_mail(sinks.mail, subject, email_body(&blocks), export)
    } else if failed_searches > 0 {
        deliver_mail(sinks.mail, subject, email_body(&blocks), None)
    } else {
        deliver_mail(sinks.mail, subject, EMPTY_DIGEST_BODY.to_string(), None)
    };

    info!(
        total = total_count,
        failed_searches,
        mail = mail.label(),
        comments_posted,
        "issue digest finished"
    );
    DigestOutcome {
        buckets,
        total_count,
        mail,
        comments_posted,
    }
}

pub fn run(
    config: &IssueReportConfig,
    now: NaiveDateTime,
    export_dir: &Path,
) -> Result<DigestOutcome, GatewayError> {
    let transport = Arc::new(HttpTransport::with_runtime()?);
    let tracker = JiraClient::new(Arc::clone(&transport), &config.tracker);
    let chat = SlackWebhook::new(Arc::clone(&transport), config.slack.webhook_url.clone());
    let mail = SmtpMailer::new(config.mail.clone());

    let sinks = DigestSinks {
        tracker: &tracker,
        chat: &chat,
        mail: &mail,
    };
    Ok(run_digest(sinks, &config.digest, now, export_dir))
}
