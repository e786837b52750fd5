use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::gateways::jira::SEARCH_PAGE_SIZE;
use crate::gateways::{GatewayError, HttpTransport, IssueTracker, JiraClient, TrackerSearch};
use crate::pipeline::aggregate::date_only;
use crate::pipeline::{collect_paginated, CollectLimits, ExportError, ExportFile, StageOutcome};

pub const DEFAULT_MAX_RESULTS: usize = 1000;
pub const DEFAULT_OUTPUT_NAME: &str = "jira_issues.csv";
pub const SEARCH_FIELDS: [&str; 5] = ["key", "summary", "status", "assignee", "created"];

/// Options of one interactive search, filled from flags or prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub query: String,
    pub max_results: usize,
    pub export: bool,
    pub output_name: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_results: DEFAULT_MAX_RESULTS,
            export: false,
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
        }
    }
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("a query is required")]
    EmptyQuery,
    #[error("search failed: {0}")]
    Search(String),
    #[error("the query returned no issues")]
    NoResults,
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRow {
    pub key: String,
    pub url: String,
    pub status: String,
    pub assignee: String,
    pub created: String,
    pub summary: String,
}

#[derive(Debug)]
pub struct SearchResult {
    pub query: String,
    pub rows: Vec<SearchRow>,
    pub truncated: bool,
    pub export: Option<PathBuf>,
}

/// Rewrites the query through the tracker's cleaner, keeping the original
/// when the cleaner is unavailable.
fn cleaned_query(tracker: &dyn IssueTracker, query: &str) -> String {
    match tracker.clean_query(query) {
        Ok(cleaned) => {
            if cleaned != query {
                info!(original = %query, cleaned = %cleaned, "query rewritten to account-id terms");
            }
            cleaned
        }
        Err(err) => {
            warn!(error = %err, "query cleaner unavailable; using the original query");
            query.to_string()
        }
    }
}

pub fn search(
    tracker: &dyn IssueTracker,
    options: &SearchOptions,
    export_dir: &Path,
) -> Result<SearchResult, SearchError> {
    let raw_query = options.query.trim();
    if raw_query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let query = cleaned_query(tracker, raw_query);

    let max_results = options.max_results.max(1);
    let source = TrackerSearch::new(tracker, query.clone(), &SEARCH_FIELDS)
        .with_page_size(SEARCH_PAGE_SIZE.min(max_results));
    let limits = CollectLimits {
        max_pages: None,
        max_records: Some(max_results),
    };
    let collection = match collect_paginated(&source, limits) {
        StageOutcome::Data(collection) => collection,
        StageOutcome::Empty => return Err(SearchError::NoResults),
        StageOutcome::Failed(reason) => return Err(SearchError::Search(reason)),
    };
    if collection.records.is_empty() {
        return Err(SearchError::NoResults);
    }

    let truncated = collection.truncated();
    let rows: Vec<SearchRow> = collection
        .records
        .into_iter()
        .map(|record| {
            let issue = record.payload;
            let fields = issue.fields;
            SearchRow {
                url: tracker.browse_url(&issue.key),
                key: issue.key,
                status: fields.status.map(|status| status.name).unwrap_or_default(),
                assignee: fields
                    .assignee
                    .and_then(|assignee| assignee.display_name)
                    .unwrap_or_default(),
                created: fields.created.as_deref().map(date_only).unwrap_or_default(),
                summary: fields.summary.unwrap_or_default(),
            }
        })
        .collect();
    info!(count = rows.len(), truncated, "search finished");

    let export = if options.export {
        export_rows(&rows, export_dir, &options.output_name)?
    } else {
        None
    };

    Ok(SearchResult {
        query,
        rows,
        truncated,
        export,
    })
}

/// Writes the rows as a BOM-prefixed CSV. The file is the tool's output and
/// stays on disk.
pub fn export_rows(
    rows: &[SearchRow],
    export_dir: &Path,
    output_name: &str,
) -> Result<Option<PathBuf>, SearchError> {
    let name = match output_name.trim() {
        "" => DEFAULT_OUTPUT_NAME,
        name => name,
    };
    let file = ExportFile::write(export_dir, name, rows, true)?;
    if let Some(file) = &file {
        info!(path = %file.path().display(), rows = file.rows(), "search results exported");
    }
    Ok(file.map(|file| file.path().to_path_buf()))
}

/// Fixed-width console listing.
pub fn render_table(rows: &[SearchRow]) -> String {
    let mut out = format!("{} issues fetched.\n\n", rows.len());
    out.push_str(&format!(
        "{:<70} | {:<12} | {:<20} | {:<10} | Summary\n",
        "Link", "Status", "Assignee", "Created"
    ));
    out.push_str(&"-".repeat(130));
    out.push('\n');
    for row in rows {
        let assignee = if row.assignee.is_empty() {
            "Unassigned"
        } else {
            row.assignee.as_str()
        };
        out.push_str(&format!(
            "{:<70} | {:<12} | {:<20} | {:<10} | {}\n",
            row.url, row.status, assignee, row.created, row.summary
        ));
    }
    out
}

pub fn run(
    config: &SearchConfig,
    options: &SearchOptions,
    export_dir: &Path,
) -> Result<SearchResult, SearchError> {
    let transport = Arc::new(HttpTransport::with_runtime()?);
    let tracker = JiraClient::new(transport, &config.tracker);
    search(&tracker, options, export_dir)
}
