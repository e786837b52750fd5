use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Distinguishes runtime behavior for different stages of deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Process-level settings read from the environment before any report runs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub config_path: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let config_path = env::var("OPS_REPORTS_CONFIG")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            config_path,
        }
    }

    /// Picks the explicit CLI path first, then the environment default.
    pub fn resolve_config_path(
        &self,
        explicit: Option<PathBuf>,
        fallback_name: &str,
    ) -> PathBuf {
        explicit
            .or_else(|| self.config_path.clone())
            .unwrap_or_else(|| PathBuf::from(fallback_name))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Credentials for the wiki service that receives monthly report pages.
#[derive(Debug, Clone, Deserialize)]
pub struct WikiConnection {
    pub base_url: String,
    pub username: String,
    pub api_token: String,
}

/// Credentials for the issue tracker search and comment endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConnection {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayFeedConfig {
    pub endpoint: String,
    pub app_id: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_review_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppStoreFeedConfig {
    pub app_id: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_app_store_pages")]
    pub max_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewReportConfig {
    pub space_key: String,
    #[serde(default)]
    pub parent_page_id: Option<String>,
    #[serde(default)]
    pub play: Option<PlayFeedConfig>,
    #[serde(default)]
    pub app_store: Option<AppStoreFeedConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketShareConfig {
    pub target_url: String,
    pub space_key: String,
    #[serde(default)]
    pub parent_page_id: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_share_categories")]
    pub categories: Vec<String>,
}

/// JSON configuration for the monthly wiki report run.
#[derive(Debug, Clone, Deserialize)]
pub struct WikiReportConfig {
    pub wiki: WikiConnection,
    pub reviews: ReviewReportConfig,
    #[serde(default)]
    pub market_share: Option<MarketShareConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub app_password: String,
    pub recipient_emails: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigestConfig {
    pub base_query: String,
    #[serde(default = "default_order_by")]
    pub order_by: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub notify_assignees: bool,
    #[serde(default = "default_reminder_text")]
    pub reminder_text: String,
}

/// JSON configuration for the stale issue digest run.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueReportConfig {
    pub tracker: TrackerConnection,
    pub slack: SlackConfig,
    pub mail: MailConfig,
    pub digest: DigestConfig,
}

/// JSON configuration for the interactive search tool.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub tracker: TrackerConnection,
}

/// Loads a per-script JSON configuration and checks required credentials.
pub fn load_json<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate,
{
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let config: T = serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Required-field checks serde cannot express (non-empty credentials).
pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::MissingField(field))
    } else {
        Ok(())
    }
}

impl Validate for WikiConnection {
    fn validate(&self) -> Result<(), ConfigError> {
        require("wiki.base_url", &self.base_url)?;
        require("wiki.username", &self.username)?;
        require("wiki.api_token", &self.api_token)
    }
}

impl Validate for TrackerConnection {
    fn validate(&self) -> Result<(), ConfigError> {
        require("tracker.base_url", &self.base_url)?;
        require("tracker.email", &self.email)?;
        require("tracker.api_token", &self.api_token)
    }
}

impl Validate for WikiReportConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.wiki.validate()?;
        require("reviews.space_key", &self.reviews.space_key)?;
        if let Some(share) = &self.market_share {
            require("market_share.target_url", &share.target_url)?;
            require("market_share.space_key", &share.space_key)?;
        }
        Ok(())
    }
}

impl Validate for IssueReportConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()?;
        require("slack.webhook_url", &self.slack.webhook_url)?;
        require("mail.smtp_server", &self.mail.smtp_server)?;
        require("mail.sender_email", &self.mail.sender_email)?;
        require("mail.app_password", &self.mail.app_password)?;
        if self.mail.recipient_emails.is_empty() {
            return Err(ConfigError::MissingField("mail.recipient_emails"));
        }
        require("digest.base_query", &self.digest.base_query)
    }
}

impl Validate for SearchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()
    }
}

fn default_lang() -> String {
    "ko".to_string()
}

fn default_country() -> String {
    "kr".to_string()
}

fn default_region() -> String {
    "south-korea".to_string()
}

fn default_review_page_size() -> u32 {
    1000
}

fn default_app_store_pages() -> u32 {
    10
}

fn default_order_by() -> String {
    "ORDER BY priority DESC".to_string()
}

fn default_max_results() -> usize {
    1000
}

fn default_reminder_text() -> String {
    " this issue has not been updated for over a week. Please take a look.".to_string()
}

pub fn default_share_categories() -> Vec<String> {
    [
        "android-version-market-share/mobile/",
        "android-version-market-share/tablet/",
        "ios-version-market-share/mobile/",
        "ios-version-market-share/tablet/",
        "vendor-market-share/mobile/",
        "vendor-market-share/tablet/",
        "vendor-market-share/console/",
        "browser-market-share/all/",
        "browser-version-market-share/all/",
        "ai-chatbot-market-share/all/",
    ]
    .iter()
    .map(|path| path.to_string())
    .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    MissingField(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Unreadable { path, .. } => {
                write!(f, "unable to read config file '{}'", path.display())
            }
            ConfigError::Malformed { path, .. } => {
                write!(f, "config file '{}' is not valid JSON for this report", path.display())
            }
            ConfigError::MissingField(field) => write!(f, "config field '{field}' must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Unreadable { source, .. } => Some(source),
            ConfigError::Malformed { source, .. } => Some(source),
            ConfigError::MissingField(_) => None,
        }
    }
}
