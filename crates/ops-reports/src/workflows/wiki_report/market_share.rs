use serde::Serialize;
use tracing::{info, warn};

use super::{export_or_skip, ReportContext, WikiReportOutcome};
use crate::config::MarketShareConfig;
use crate::gateways::stats_page::{ShareSnapshot, ShareSource, SnapshotRequest};
use crate::pipeline::markup::{escape_html, timestamp_line, EMPTY_STATE};
use crate::pipeline::{publish_page, residual_share, PageRequest, ReportWindow, StageOutcome, WikiGateway};

pub const OTHERS_LABEL: &str = "Others";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareRow {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Item")]
    pub item: String,
    #[serde(rename = "Share (%)")]
    pub share: f64,
}

/// Scrape result of one category path.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryShare {
    pub path: String,
    pub snapshot: StageOutcome<ShareSnapshot>,
}

impl CategoryShare {
    /// `android-version-market-share/mobile/` becomes `ANDROID-VERSION MOBILE`.
    pub fn heading(&self) -> String {
        self.path
            .replace("-market-share/", " ")
            .replace('/', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase()
    }

    /// First path segment, used as the CSV source column.
    pub fn source(&self) -> &str {
        self.path.split('/').next().unwrap_or(&self.path)
    }

    /// Scraped items followed by the residual row when shares fall short
    /// of 100%.
    pub fn items(&self) -> Vec<(String, f64)> {
        let Some(snapshot) = self.snapshot.data() else {
            return Vec::new();
        };
        let mut items: Vec<(String, f64)> = snapshot
            .entries
            .iter()
            .map(|entry| (entry.item.clone(), entry.share))
            .collect();
        let shares: Vec<f64> = snapshot.entries.iter().map(|entry| entry.share).collect();
        if let Some(residual) = residual_share(&shares) {
            items.push((OTHERS_LABEL.to_string(), residual));
        }
        items
    }
}

pub fn market_share_title(window: &ReportWindow) -> String {
    format!("[Market Share] {}", window.period_label())
}

pub fn market_share_export_name(window: &ReportWindow) -> String {
    format!("market_share_{}.csv", window.month_key())
}

pub fn category_request(config: &MarketShareConfig, path: &str, window: &ReportWindow) -> SnapshotRequest {
    SnapshotRequest {
        page_url: format!("{}{path}{}/", config.target_url, config.region),
        month: window.month_key(),
    }
}

/// Scrapes every configured category in order. A category that fails to
/// load or parse is kept as `Failed` so the page can show a placeholder.
pub fn collect_shares(
    source: &dyn ShareSource,
    config: &MarketShareConfig,
    window: &ReportWindow,
) -> Vec<CategoryShare> {
    config
        .categories
        .iter()
        .map(|path| {
            let request = category_request(config, path, window);
            let snapshot = match source.fetch_snapshot(&request) {
                Ok(snapshot) if snapshot.entries.is_empty() => {
                    warn!(category = %path, "snapshot table has no rows");
                    StageOutcome::Empty
                }
                Ok(snapshot) => {
                    info!(category = %path, rows = snapshot.entries.len(), "category scraped");
                    StageOutcome::Data(snapshot)
                }
                Err(err) => {
                    warn!(category = %path, link = %request.chart_link(), error = %err, "category scrape failed; emitting placeholder");
                    StageOutcome::failed(err)
                }
            };
            CategoryShare {
                path: path.clone(),
                snapshot,
            }
        })
        .collect()
}

pub fn share_rows(categories: &[CategoryShare]) -> Vec<ShareRow> {
    categories
        .iter()
        .flat_map(|category| {
            category.items().into_iter().map(|(item, share)| ShareRow {
                source: category.source().to_string(),
                item,
                share,
            })
        })
        .collect()
}

fn category_block(category: &CategoryShare) -> String {
    let heading = format!("<h2>{}</h2>", escape_html(&category.heading()));
    let snapshot = match &category.snapshot {
        StageOutcome::Data(snapshot) => snapshot,
        StageOutcome::Empty => return format!("{heading}<p>Data load error: no rows in snapshot table</p>"),
        StageOutcome::Failed(reason) => {
            return format!("{heading}<p>Data load error: {}</p>", escape_html(reason))
        }
    };

    let items = category.items();
    let item_cells: String = items
        .iter()
        .map(|(item, _)| format!("<td>{}</td>", escape_html(item)))
        .collect();
    let share_cells: String = items
        .iter()
        .map(|(_, share)| format!("<td>{share:.2}%</td>"))
        .collect();

    let mut block = format!(
        "{heading}<table id='stats-table-{id}' class=\"confluenceTable\" border=\"1\" style=\"width:100%; text-align:center;\">\
         <thead><tr><th colspan=\"{colspan}\" style=\"text-align:left; background-color:#f0f0f0; padding: 10px;\">{caption}</th></tr></thead>\
         <tbody><tr><th>Item</th>{item_cells}</tr><tr><th>Share (%)</th>{share_cells}</tr></tbody></table>",
        id = category.source(),
        colspan = items.len() + 1,
        caption = escape_html(&snapshot.caption),
    );
    if let Some(embed) = &snapshot.embed_code {
        block.push_str(&format!(
            "<div style='margin-bottom: 30px; border: 1px solid #eee; padding: 5px;'>{embed}</div>"
        ));
    }
    block
}

pub fn render_market_share_page(
    categories: &[CategoryShare],
    window: &ReportWindow,
    generated_at: chrono::NaiveDateTime,
    row_count: usize,
) -> String {
    let mut body = format!(
        "<h2>Market share report for {}</h2><p>Generated at: {}</p>",
        window.start.format("%B %Y"),
        timestamp_line(generated_at)
    );
    if row_count == 0 {
        body.push_str(&format!("<p>{EMPTY_STATE}</p>"));
    }
    for category in categories {
        body.push_str(&category_block(category));
    }
    body
}

pub fn publish_market_share(
    wiki: &dyn WikiGateway,
    config: &MarketShareConfig,
    context: &ReportContext,
    categories: Vec<CategoryShare>,
) -> WikiReportOutcome {
    let title = market_share_title(&context.window);
    let rows = share_rows(&categories);
    let failed = categories
        .iter()
        .filter(|category| !category.snapshot.is_data())
        .count();
    info!(title = %title, rows = rows.len(), failed_categories = failed, "market share aggregated");

    let body = render_market_share_page(&categories, &context.window, context.generated_at, rows.len());
    let export = export_or_skip(
        &context.export_dir,
        &market_share_export_name(&context.window),
        &rows,
    );
    let request = PageRequest {
        space_key: &config.space_key,
        parent_id: config.parent_page_id.as_deref(),
        title: &title,
        body: &body,
    };
    let publication = publish_page(wiki, &request, export);

    WikiReportOutcome {
        title,
        total_count: rows.len(),
        publication,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_share_categories;
    use crate::gateways::stats_page::ShareEntry;
    use crate::gateways::GatewayError;
    use chrono::NaiveDate;

    #[derive(Debug)]
    struct CannedStats;

    impl ShareSource for CannedStats {
        fn fetch_snapshot(&self, request: &SnapshotRequest) -> Result<ShareSnapshot, GatewayError> {
            if request.page_url.contains("tablet") {
                return Err(GatewayError::Decode("snapshot table not found".to_string()));
            }
            Ok(ShareSnapshot {
                caption: "Share in South Korea".to_string(),
                entries: vec![
                    ShareEntry { item: "A".to_string(), share: 40.0 },
                    ShareEntry { item: "B".to_string(), share: 35.5 },
                    ShareEntry { item: "C".to_string(), share: 20.0 },
                ],
                embed_code: Some("<iframe src=\"https://example.com\"></iframe>".to_string()),
            })
        }
    }

    fn window() -> ReportWindow {
        ReportWindow::previous_month(
            NaiveDate::from_ymd_opt(2024, 6, 3)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
    }

    fn config() -> MarketShareConfig {
        MarketShareConfig {
            target_url: "https://stats.example.com/".to_string(),
            space_key: "QA".to_string(),
            parent_page_id: None,
            region: "south-korea".to_string(),
            categories: vec![
                "android-version-market-share/mobile/".to_string(),
                "android-version-market-share/tablet/".to_string(),
            ],
        }
    }

    #[test]
    fn request_targets_single_month() {
        let request = category_request(&config(), "browser-market-share/all/", &window());
        assert_eq!(request.page_url, "https://stats.example.com/browser-market-share/all/south-korea/");
        assert_eq!(request.month, "202405");
        assert_eq!(
            request.query(),
            [("granularity", "monthly"), ("fromInt", "202405"), ("toInt", "202405")]
        );
        assert_eq!(
            request.chart_link(),
            "https://stats.example.com/browser-market-share/all/south-korea/#monthly-202405-202405-bar"
        );
        assert_eq!(default_share_categories().len(), 10);
    }

    #[test]
    fn failed_category_becomes_placeholder_and_residual_is_added() {
        let categories = collect_shares(&CannedStats, &config(), &window());
        assert!(categories[0].snapshot.is_data());
        assert!(categories[1].snapshot.is_failed());

        let rows = share_rows(&categories);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3].item, OTHERS_LABEL);
        assert_eq!(rows[3].share, 4.5);
        assert_eq!(rows[0].source, "android-version-market-share");

        let body = render_market_share_page(&categories, &window(), window().end, rows.len());
        assert!(body.contains("<h2>ANDROID-VERSION MOBILE</h2>"));
        assert!(body.contains("<h2>ANDROID-VERSION TABLET</h2><p>Data load error:"));
        assert!(body.contains("<td>4.50%</td>"));
        assert!(body.contains("<iframe src=\"https://example.com\"></iframe>"));
        assert!(!body.contains(EMPTY_STATE));
    }

    #[test]
    fn full_share_adds_no_residual() {
        let category = CategoryShare {
            path: "vendor-market-share/console/".to_string(),
            snapshot: StageOutcome::Data(ShareSnapshot {
                caption: String::new(),
                entries: vec![
                    ShareEntry { item: "X".to_string(), share: 60.0 },
                    ShareEntry { item: "Y".to_string(), share: 40.0 },
                ],
                embed_code: None,
            }),
        };
        assert_eq!(category.items().len(), 2);
        assert_eq!(category.heading(), "VENDOR CONSOLE");
    }
}
