//! Monthly wiki reports: store reviews and market share, each published as
//! one page with its CSV export attached.

pub mod market_share;
pub mod reviews;

use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::WikiReportConfig;
use crate::gateways::{
    AppStoreReviewFeed, ConfluenceClient, GatewayError, HttpTransport, PlayReviewFeed,
    StatsPageClient,
};
use crate::pipeline::{CollectLimits, ExportFile, PagePublication, PagedSource, ReportWindow};

pub use market_share::{publish_market_share, ShareRow};
pub use reviews::{publish_reviews, ReviewRow};

/// Values fixed once at the start of a run and shared by both reports.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub window: ReportWindow,
    pub generated_at: NaiveDateTime,
    pub export_dir: PathBuf,
}

impl ReportContext {
    pub fn for_run(now: NaiveDateTime, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            window: ReportWindow::previous_month(now),
            generated_at: now,
            export_dir: export_dir.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WikiReportOutcome {
    pub title: String,
    pub total_count: usize,
    pub publication: PagePublication,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WikiReportSummary {
    pub reviews: WikiReportOutcome,
    pub market_share: Option<WikiReportOutcome>,
}

/// Writes the export, or logs and carries on without one.
pub(crate) fn export_or_skip<R: Serialize>(dir: &Path, name: &str, rows: &[R]) -> Option<ExportFile> {
    match ExportFile::write(dir, name, rows, false) {
        Ok(file) => file,
        Err(err) => {
            error!(file = name, error = %err, "export could not be written; publishing without attachment");
            None
        }
    }
}

pub fn run(config: &WikiReportConfig, context: &ReportContext) -> Result<WikiReportSummary, GatewayError> {
    let transport = Arc::new(HttpTransport::with_runtime()?);
    let wiki = ConfluenceClient::new(Arc::clone(&transport), &config.wiki);
    info!(
        period = %context.window.period_label(),
        start = %context.window.start,
        end = %context.window.end,
        "wiki report run started"
    );

    let mut platforms = Vec::new();
    let mut sources = Vec::new();
    match &config.reviews.play {
        Some(play) => {
            let feed = PlayReviewFeed::new(Arc::clone(&transport), play.clone());
            let limits = CollectLimits {
                max_pages: feed.max_pages(),
                max_records: None,
            };
            platforms.push(feed.name().to_string());
            sources.push(reviews::collect_reviews(&feed, &context.window, limits));
        }
        None => info!("play review feed not configured; skipping"),
    }
    match &config.reviews.app_store {
        Some(app_store) => {
            let feed = AppStoreReviewFeed::new(Arc::clone(&transport), app_store.clone());
            let limits = CollectLimits {
                max_pages: Some(feed.max_pages()),
                max_records: None,
            };
            platforms.push(feed.name().to_string());
            sources.push(reviews::collect_reviews(&feed, &context.window, limits));
        }
        None => info!("app store review feed not configured; skipping"),
    }
    let reviews = publish_reviews(&wiki, &config.reviews, context, &platforms, sources);

    let market_share = config.market_share.as_ref().map(|share_config| {
        let categories = {
            let session = StatsPageClient::new(Arc::clone(&transport));
            market_share::collect_shares(&session, share_config, &context.window)
        };
        publish_market_share(&wiki, share_config, context, categories)
    });

    info!(
        reviews = reviews.total_count,
        market_share = ?market_share.as_ref().map(|outcome| outcome.total_count),
        "wiki report run finished"
    );
    Ok(WikiReportSummary {
        reviews,
        market_share,
    })
}
