use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{info, warn};

use super::transport::HttpTransport;
use super::GatewayError;
use crate::config::TrackerConnection;
use crate::pipeline::aggregate::parse_instant;
use crate::pipeline::collector::{Page, PagedSource, RawRecord};

pub const SEARCH_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerIssue {
    pub key: String,
    #[serde(default)]
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub status: Option<NamedField>,
    #[serde(default)]
    pub priority: Option<NamedField>,
    #[serde(default)]
    pub assignee: Option<Assignee>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub comment: Option<CommentPage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedField {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentPage {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

/// One page of search results. The search endpoint is token-paged: it
/// reports no total and ignores offsets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub issues: Vec<TrackerIssue>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub is_last: Option<bool>,
}

/// Issue tracker endpoints used by the digest and the search tool.
pub trait IssueTracker: Debug {
    fn search(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: usize,
        fields: &[&str],
    ) -> Result<SearchPage, GatewayError>;

    /// Rewrites user-name based query terms into account-id terms.
    fn clean_query(&self, query: &str) -> Result<String, GatewayError>;

    /// Posts a comment that starts with a mention of `account_id`.
    fn add_comment(&self, issue_key: &str, account_id: &str, text: &str)
        -> Result<(), GatewayError>;

    fn browse_url(&self, issue_key: &str) -> String;
}

#[derive(Debug)]
pub struct JiraClient {
    transport: Arc<HttpTransport>,
    base_url: String,
    email: String,
    api_token: String,
}

impl JiraClient {
    pub fn new(transport: Arc<HttpTransport>, connection: &TrackerConnection) -> Self {
        Self {
            transport,
            base_url: connection.base_url.trim_end_matches('/').to_string(),
            email: connection.email.clone(),
            api_token: connection.api_token.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.transport
            .client()
            .request(method, format!("{}{path}", self.base_url))
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .header("X-Atlassian-Force-Account-Id", "true")
    }
}

/// Document-format comment body: a mention node followed by plain text.
pub(crate) fn mention_comment_payload(account_id: &str, text: &str) -> Value {
    json!({
        "body": {
            "type": "doc",
            "version": 1,
            "content": [{
                "type": "paragraph",
                "content": [
                    { "type": "mention", "attrs": { "id": account_id, "accessLevel": "CONTAINER" } },
                    { "type": "text", "text": text }
                ]
            }]
        }
    })
}

/// First cleaned query in the response, or the input when none is returned.
pub(crate) fn cleaned_query_from(response: &Value, original: &str) -> String {
    response
        .get("queries")
        .and_then(|queries| queries.get(0))
        .and_then(|entry| entry.get("query"))
        .and_then(Value::as_str)
        .filter(|query| !query.trim().is_empty())
        .unwrap_or(original)
        .to_string()
}

impl IssueTracker for JiraClient {
    fn search(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: usize,
        fields: &[&str],
    ) -> Result<SearchPage, GatewayError> {
        let mut params = vec![
            ("jql", query.to_string()),
            ("maxResults", max_results.to_string()),
            ("fields", fields.join(",")),
        ];
        if let Some(token) = page_token {
            params.push(("nextPageToken", token.to_string()));
        }
        let builder = self
            .request(reqwest::Method::GET, "/rest/api/3/search/jql")
            .query(&params);
        self.transport.send_json(builder)
    }

    fn clean_query(&self, query: &str) -> Result<String, GatewayError> {
        let builder = self
            .request(reqwest::Method::POST, "/rest/api/3/jql/pdcleaner")
            .json(&json!({ "queries": [query] }));
        let response: Value = self.transport.send_json(builder)?;
        Ok(cleaned_query_from(&response, query))
    }

    fn add_comment(
        &self,
        issue_key: &str,
        account_id: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        let builder = self
            .request(
                reqwest::Method::POST,
                &format!("/rest/api/3/issue/{issue_key}/comment"),
            )
            .json(&mention_comment_payload(account_id, text));
        self.transport.send(builder).map(|_| ())
    }

    fn browse_url(&self, issue_key: &str) -> String {
        format!("{}/browse/{issue_key}", self.base_url)
    }
}

/// Offset-paginated view over one search query.
#[derive(Debug)]
pub struct TrackerSearch<'a> {
    tracker: &'a dyn IssueTracker,
    query: String,
    fields: &'a [&'a str],
    page_size: usize,
}

impl<'a> TrackerSearch<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, query: impl Into<String>, fields: &'a [&'a str]) -> Self {
        Self {
            tracker,
            query: query.into(),
            fields,
            page_size: SEARCH_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl PagedSource for TrackerSearch<'_> {
    type Payload = TrackerIssue;
    type Cursor = String;

    fn name(&self) -> &str {
        "issue-tracker"
    }

    /// Follows `nextPageToken`. A page without a token, or one flagged
    /// last, ends the search.
    fn fetch_page(&self, cursor: Option<&String>) -> Result<Page<TrackerIssue, String>, GatewayError> {
        let page = self.tracker.search(
            &self.query,
            cursor.map(String::as_str),
            self.page_size,
            self.fields,
        )?;
        let fetched = page.issues.len();
        info!(fetched, is_last = ?page.is_last, "search page fetched");

        if cursor.is_some() && page.next_page_token.as_ref() == cursor {
            warn!(fetched, "tracker did not advance past the page token; dropping the repeated page");
            return Ok(Page {
                records: Vec::new(),
                next: None,
            });
        }
        let next = page
            .next_page_token
            .filter(|token| fetched > 0 && page.is_last != Some(true) && !token.trim().is_empty());

        let records = page
            .issues
            .into_iter()
            .map(|issue| RawRecord {
                timestamp: issue
                    .fields
                    .updated
                    .as_deref()
                    .and_then(parse_instant)
                    .map(|(instant, _)| instant)
                    .unwrap_or_else(NaiveDateTime::default),
                source: self.name().to_string(),
                payload: issue,
            })
            .collect();

        Ok(Page { records, next })
    }
}
