pub mod confluence;
pub mod jira;
pub mod slack;
pub mod smtp;
pub mod stats_page;
pub mod store_reviews;
pub mod transport;

pub use confluence::ConfluenceClient;
pub use jira::{IssueTracker, JiraClient, SearchPage, TrackerIssue, TrackerSearch};
pub use slack::SlackWebhook;
pub use smtp::SmtpMailer;
pub use stats_page::{ShareEntry, ShareSnapshot, ShareSource, SnapshotRequest, StatsPageClient};
pub use store_reviews::{AppStoreReviewFeed, PlayReviewFeed, StoreReview};
pub use transport::HttpTransport;

/// Failure of a single outbound call. Callers log it and skip the stage.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unable to decode response: {0}")]
    Decode(String),
    #[error("unable to build message: {0}")]
    Message(String),
    #[error("http runtime unavailable: {0}")]
    Runtime(String),
}

impl GatewayError {
    pub(crate) fn transport<E: std::fmt::Display>(err: E) -> Self {
        Self::Transport(err.to_string())
    }
}
