use crate::config::FetchConfig;
use crate::types::{Result, TriageError};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

/// Shared HTTP client for the source connectors: retries with exponential
/// backoff and keeps a minimum interval between requests to one host.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let response = self.get_with_retries(url, query).await?;
        let content = response.text().await?;
        info!("Fetched {} ({} bytes)", url, content.len());
        Ok(content)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let content = self.get_text(url, query).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn get_with_retries(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        self.apply_rate_limit(url).await?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.send(url, query).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        self.check_size(url, &response)?;
                        return Ok(response);
                    }

                    last_error = Some(TriageError::Upstream {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                    // client errors other than throttling will not improve on retry
                    if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        error!("Failed to fetch {} after {} attempts", url, self.config.max_retries + 1);
        Err(last_error.unwrap_or_else(|| TriageError::Parse(format!("no response from {}", url))))
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json, text/xml, application/xml, application/atom+xml")
            .query(query)
            .send()
            .await?;
        Ok(response)
    }

    fn check_size(&self, url: &str, response: &Response) -> Result<()> {
        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_response_size_mb {
                return Err(TriageError::Parse(format!(
                    "response from {} too large: {}MB",
                    url, size_mb
                )));
            }
        }
        Ok(())
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let parsed_url = Url::parse(url)?;
        let host = parsed_url.host_str().unwrap_or("").to_string();

        let now = Instant::now();
        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);

        // reserve the next slot for this host, then sleep without the lock
        let wait_time = {
            let mut rate_limiter = self.rate_limiter.write().await;
            let slot = match rate_limiter.get(&host) {
                Some(last_request) => (*last_request + min_interval).max(now),
                None => now,
            };
            rate_limiter.insert(host.clone(), slot);
            slot.duration_since(now)
        };

        if !wait_time.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        Ok(())
    }
}
