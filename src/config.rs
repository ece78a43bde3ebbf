use crate::error::{AppError, AppResult};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_OUTPUT_FILE: &str = "./harvested_records.json";
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_BATCH_SIZE: u32 = 10;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

pub const HTTP_TIMEOUT_SECONDS: u64 = 30;
pub const HTTP_CONNECT_TIMEOUT: u64 = 20;
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY_BASE_MS: u64 = 1000;
pub const WINDOW_DELAY_MS: u64 = 100;

pub const DEFAULT_RECORDS_POINTER: &str = "/data/list";
pub const DEFAULT_PAYLOAD_FIELD: &str = "data";
pub const DEFAULT_TOKEN_FIELD: &str = "__RequestVerificationToken";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const ACCEPT_VAL: &str = "application/json, text/javascript, */*; q=0.01";
pub const REQUESTED_WITH_VAL: &str = "XMLHttpRequest";

pub const ENV_PROXY: &str = "HARVEST_PROXY";
pub const ENV_ANTI_FORGERY_TOKEN: &str = "HARVEST_ANTI_FORGERY_TOKEN";
pub const ENV_SESSION_COOKIE: &str = "HARVEST_SESSION_COOKIE";
pub const ENV_SEARCH_TOKEN: &str = "HARVEST_SEARCH_TOKEN";

/// Shape of the outbound search request. Everything here is static across pages except the
/// page number, which is templated in per request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RequestTemplate {
    pub endpoint: String,
    pub referer: Option<String>,
    pub user_agent: String,
    pub page_size: u32,
    pub filters: Value,
    pub sort: Value,
    pub payload_field: String,
    pub token_field: String,
    pub records_pointer: String,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        RequestTemplate {
            endpoint: String::new(),
            referer: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            filters: Value::Array(Vec::new()),
            sort: Value::Null,
            payload_field: DEFAULT_PAYLOAD_FIELD.to_string(),
            token_field: DEFAULT_TOKEN_FIELD.to_string(),
            records_pointer: DEFAULT_RECORDS_POINTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HarvestConfig {
    pub total_pages: u32,
    pub batch_size: u32,
    pub concurrency: usize,
    pub output: PathBuf,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub window_delay_ms: u64,
    pub request: RequestTemplate,
    #[serde(skip)]
    pub proxy: Option<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        HarvestConfig {
            total_pages: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            output: PathBuf::from(DEFAULT_OUTPUT_FILE),
            timeout_secs: HTTP_TIMEOUT_SECONDS,
            connect_timeout_secs: HTTP_CONNECT_TIMEOUT,
            max_retries: MAX_RETRIES,
            retry_delay_ms: RETRY_DELAY_BASE_MS,
            window_delay_ms: WINDOW_DELAY_MS,
            request: RequestTemplate::default(),
            proxy: None,
        }
    }
}

impl HarvestConfig {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::ConfigError(format!("Invalid config '{}': {}", path.display(), e))
        })
    }

    /// Picks up the optional outbound proxy from the process environment.
    pub fn with_env_proxy(mut self) -> Self {
        self.proxy = std::env::var(ENV_PROXY)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.total_pages == 0 {
            return Err(AppError::Argument(
                "total pages must be at least 1 (--total-pages).".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(AppError::Argument(
                "batch size must be at least 1 (--batch-size).".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(AppError::Argument(
                "concurrency must be at least 1 (--concurrency).".into(),
            ));
        }
        if self.request.endpoint.trim().is_empty() {
            return Err(AppError::ConfigError(
                "No endpoint configured. Use --endpoint or the config file's request.endpoint."
                    .into(),
            ));
        }
        reqwest::Url::parse(&self.request.endpoint).map_err(|e| {
            AppError::ConfigError(format!(
                "Endpoint '{}' is not a valid URL: {}",
                self.request.endpoint, e
            ))
        })?;
        if !self.request.records_pointer.is_empty() && !self.request.records_pointer.starts_with('/')
        {
            return Err(AppError::ConfigError(format!(
                "Records pointer '{}' must be empty or start with '/'.",
                self.request.records_pointer
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn window_delay(&self) -> Duration {
        Duration::from_millis(self.window_delay_ms)
    }
}
