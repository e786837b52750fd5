use serde::Serialize;

use crate::gateways::jira::TrackerIssue;
use crate::pipeline::aggregate::{date_only, latest_date};

/// Fields requested for every digest search.
pub const DIGEST_FIELDS: [&str; 7] = [
    "key", "summary", "status", "assignee", "updated", "priority", "comment",
];

pub const UNASSIGNED: &str = "Unassigned";
pub const NO_PRIORITY: &str = "None";

/// One issue normalized into the digest CSV column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueRow {
    pub key: String,
    pub url: String,
    pub summary: String,
    pub priority: String,
    pub status: String,
    pub assignee: String,
    pub updated: String,
    pub latest_comment_date: String,
    pub assignee_id: String,
}

impl IssueRow {
    pub fn from_issue(issue: &TrackerIssue, url: String) -> Self {
        let fields = &issue.fields;
        let assignee = fields.assignee.as_ref();
        let comment_dates = fields
            .comment
            .iter()
            .flat_map(|page| page.comments.iter())
            .filter_map(|comment| comment.updated.as_deref().or(comment.created.as_deref()));

        Self {
            key: issue.key.clone(),
            url,
            summary: fields.summary.clone().unwrap_or_default(),
            priority: fields
                .priority
                .as_ref()
                .map(|priority| priority.name.clone())
                .unwrap_or_else(|| NO_PRIORITY.to_string()),
            status: fields
                .status
                .as_ref()
                .map(|status| status.name.clone())
                .unwrap_or_default(),
            assignee: assignee
                .and_then(|assignee| assignee.display_name.clone())
                .unwrap_or_else(|| UNASSIGNED.to_string()),
            updated: fields.updated.as_deref().map(date_only).unwrap_or_default(),
            latest_comment_date: latest_date(comment_dates),
            assignee_id: assignee
                .and_then(|assignee| assignee.account_id.clone())
                .unwrap_or_default(),
        }
    }

    /// CSV row that labels the bucket following it.
    pub fn separator(title: &str, count: usize) -> Self {
        Self {
            key: format!("--- {title} ({count}) ---"),
            ..Self::default()
        }
    }

    /// Marks a bucket whose search failed, so it is not read as zero issues.
    pub fn failed_separator(title: &str) -> Self {
        Self {
            key: format!("--- {title} (query failed) ---"),
            ..Self::default()
        }
    }

    pub fn assignee_account(&self) -> Option<&str> {
        Some(self.assignee_id.as_str()).filter(|id| !id.trim().is_empty())
    }
}
