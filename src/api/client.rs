use crate::api::credentials::{CredentialSource, Credentials};
use crate::api::model::{self, PageNumber, PageResult, SearchPayload};
use crate::config::{self, HarvestConfig, RequestTemplate};
use crate::error::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, COOKIE, REFERER};
use reqwest::{Client, Proxy};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Anything that can turn a page number into a page of records. Implementations never fail:
/// an unrecoverable page comes back as [`PageResult::failed`].
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, page: PageNumber) -> PageResult;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &HarvestConfig) -> Self {
        RetryPolicy {
            max_retries: cfg.max_retries,
            base_delay: cfg.retry_delay(),
            attempt_timeout: cfg.timeout(),
        }
    }

    /// Delays slept before retry 1..=max_retries, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_retries)
            .map(|retry| backoff_delay(retry, self.base_delay))
            .collect()
    }
}

/// Linear backoff: retry `n` waits `n * base`.
pub fn backoff_delay(retry: u32, base: Duration) -> Duration {
    base.saturating_mul(retry)
}

#[derive(Clone)]
pub struct FetchClient {
    client: Client,
    template: Arc<RequestTemplate>,
    credentials: Arc<dyn CredentialSource>,
    policy: RetryPolicy,
}

impl FetchClient {
    pub fn new(cfg: &HarvestConfig, credentials: Arc<dyn CredentialSource>) -> AppResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .user_agent(cfg.request.user_agent.clone());

        builder = match &cfg.proxy {
            Some(proxy_url) => {
                log(
                    LogLevel::Info,
                    &format!("Routing all requests through proxy {}", proxy_url),
                );
                let proxy = Proxy::all(proxy_url).map_err(|e| {
                    AppError::ConfigError(format!("Invalid proxy URL '{}': {}", proxy_url, e))
                })?;
                builder.proxy(proxy)
            }
            // Only the harvester's own variable selects a proxy.
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(AppError::from)?;
        Ok(FetchClient {
            client,
            template: Arc::new(cfg.request.clone()),
            credentials,
            policy: RetryPolicy::from_config(cfg),
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetches one page, retrying with linear backoff. Never errors: exhausted retries yield an
    /// empty failed page.
    pub async fn fetch_page(&self, page: PageNumber) -> PageResult {
        let mut last_error: Option<AppError> = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt, self.policy.base_delay);
                log(
                    LogLevel::Warning,
                    &format!(
                        "Page {} (Try {}) failed: {}. Retrying in {:?}",
                        page,
                        attempt,
                        last_error
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                        delay
                    ),
                );
                sleep(delay).await;
            }

            match self.attempt(page).await {
                Ok(raw_records) => {
                    log(
                        LogLevel::Success,
                        &format!("Page {} OK: {} record(s)", page, raw_records.len()),
                    );
                    return PageResult::fetched(page, raw_records);
                }
                Err(e) => last_error = Some(e),
            }
        }

        log(
            LogLevel::Error,
            &format!(
                "Page {} FAILED after {} attempt(s): {}",
                page,
                self.policy.max_retries + 1,
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        );
        PageResult::failed(page)
    }

    async fn attempt(&self, page: PageNumber) -> AppResult<Vec<Value>> {
        let creds = self.credentials.credentials()?;
        let headers = self.request_headers(&creds)?;
        let payload = serde_json::to_string(&SearchPayload::new(
            &self.template,
            page,
            &creds.search_token,
        ))?;
        let form = [
            (self.template.payload_field.as_str(), payload),
            (self.template.token_field.as_str(), creds.anti_forgery_token),
        ];

        let request = self
            .client
            .post(&self.template.endpoint)
            .headers(headers)
            .form(&form);

        // Dropping the future on timeout cancels the in-flight request.
        let exchange = async {
            let resp = request.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(AppError::HttpStatus {
                    status: status.as_u16(),
                    message: body.chars().take(150).collect(),
                });
            }
            let bytes = resp.bytes().await?;
            Ok::<_, AppError>(bytes)
        };

        let bytes = timeout(self.policy.attempt_timeout, exchange)
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "page {} exceeded {:?}",
                    page, self.policy.attempt_timeout
                ))
            })??;

        let body: Value = serde_json::from_slice(&bytes)?;
        Ok(model::extract_records(body, &self.template.records_pointer))
    }

    fn request_headers(&self, creds: &Credentials) -> AppResult<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, HeaderValue::from_static(config::ACCEPT_VAL));
        h.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static(config::REQUESTED_WITH_VAL),
        );
        h.insert(
            COOKIE,
            HeaderValue::from_str(&creds.session_cookie).map_err(|_| {
                AppError::Credentials("session cookie is not a valid header value".into())
            })?,
        );
        if let Some(referer) = &self.template.referer {
            h.insert(
                REFERER,
                HeaderValue::from_str(referer).map_err(|_| {
                    AppError::ConfigError(format!("Invalid referer header: {}", referer))
                })?,
            );
        }
        Ok(h)
    }
}

#[async_trait]
impl PageSource for FetchClient {
    async fn fetch(&self, page: PageNumber) -> PageResult {
        self.fetch_page(page).await
    }
}
