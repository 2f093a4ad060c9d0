// Async HTTP fetcher for EthioScan
// One reqwest client shared by the crawler and the execution engine

use crate::config::ScanConfig;
use crate::errors::FetchError;
use crate::models::Method;
use crate::urls::NormalizedUrl;
use async_trait::async_trait;
use reqwest::{redirect, Client};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Fixed identifying user agent sent with every request
pub const USER_AGENT: &str = "EthioScan/1.0 (Ethiopian Security Scanner)";
pub const ACCEPT: &str = "text/html,application/xhtml+xml";

/// A received HTTP response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// All response headers, names lowercased
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub elapsed: Duration,
    pub final_url: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// A prepared probe: GET with the payload in the URL, or POST with a form body
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub method: Method,
    pub url: String,
    pub form: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub retries: u32,
    /// Backoff before retry n is `base * 2^n`
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// The network seam of the pipeline. Tests substitute instrumented doubles.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Crawl fetch: polite delay, then GET with retry and exponential backoff.
    async fn fetch(&self, url: &NormalizedUrl, timeout: Duration) -> Result<FetchResponse, FetchError>;

    /// Single probe submission, no retry.
    async fn send(&self, request: &ProbeRequest, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

pub struct HttpFetcher {
    pub client: Client,
    delay: Duration,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(delay: Duration, retry: RetryPolicy) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(10)
            .redirect(redirect::Policy::limited(5))
            .cookie_store(true)
            .build()?;
        Ok(Self { client, delay, retry })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self, FetchError> {
        Self::new(
            config.delay,
            RetryPolicy {
                retries: config.retries,
                base_delay: config.backoff_base,
            },
        )
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        form: &[(String, String)],
        timeout: Duration,
    ) -> Result<FetchResponse, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let mut req = match method {
            Method::GET => self.client.get(parsed),
            Method::POST => self.client.post(parsed).form(form),
        };
        req = req.header(reqwest::header::ACCEPT, ACCEPT).timeout(timeout);

        let started = Instant::now();
        let resp = req
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout))?;

        Ok(FetchResponse {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
            final_url,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &NormalizedUrl, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0;
        loop {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match self.send_once(Method::GET, url.as_str(), &[], timeout).await {
                Ok(resp) if resp.is_server_error() && attempt < self.retry.retries => {
                    let wait = self.retry.backoff(attempt);
                    warn!(
                        "{} returned {} (attempt {}), retrying in {:?}",
                        url, resp.status, attempt + 1, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(resp) => {
                    debug!("fetched {} -> {} ({:?})", url, resp.status, resp.elapsed);
                    return Ok(resp);
                }
                Err(e) if e.is_transient() && attempt < self.retry.retries => {
                    let wait = self.retry.backoff(attempt);
                    warn!(
                        "request to {} failed (attempt {}): {}, retrying in {:?}",
                        url, attempt + 1, e, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
            attempt += 1;
        }
    }

    async fn send(&self, request: &ProbeRequest, timeout: Duration) -> Result<FetchResponse, FetchError> {
        self.send_once(request.method, &request.url, &request.form, timeout)
            .await
    }
}
