/// HTTP fetcher - pooled GETs with bounded redirects
///
/// All SMP traffic goes through this client: keep-alive pooling per
/// origin, per-request timeouts, and at most one followed redirect per
/// the Peppol profile. Redirects are handled manually so relative
/// `Location` values, missing `Location` headers, and the redirect count
/// stay observable.
use crate::config::ResolverConfig;
use crate::error::{SmpError, SmpResult};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

/// Idle connections kept alive per origin
const PER_ORIGIN_IDLE_CONNECTIONS: usize = 10;

/// Upper bound on in-flight requests across all origins
const MAX_CONCURRENT_REQUESTS: usize = 100;

/// Redirects followed per request (Peppol profile)
const MAX_REDIRECTS: u8 = 1;

/// Result of a completed GET, after any permitted redirect
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// URL the final response came from
    pub final_url: String,
    /// HTTP status code of the final response
    pub status: u16,
    /// Response body decoded as UTF-8
    pub body: String,
    /// Number of redirects followed (0 or 1)
    pub redirects: u8,
}

impl FetchResponse {
    /// Whether the final status is 200 OK
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Shared HTTP client with connection pooling
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<Semaphore>,
    default_timeout: Duration,
}

impl HttpFetcher {
    /// Build the fetcher from resolver configuration
    pub fn new(config: &ResolverConfig) -> SmpResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/xml, text/xml"));

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(Policy::none())
            .pool_max_idle_per_host(PER_ORIGIN_IDLE_CONNECTIONS)
            .build()
            .map_err(|e| SmpError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
            default_timeout: Duration::from_millis(config.http_timeout_ms),
        })
    }

    /// GET a URL with the default per-request timeout
    pub async fn get(&self, url: &str) -> SmpResult<FetchResponse> {
        self.get_with_timeout(url, self.default_timeout).await
    }

    /// GET a URL with an explicit per-request timeout
    ///
    /// Any HTTP status other than a redirect is returned as `Ok`; the
    /// caller decides what each status means. Transport failures and
    /// redirect-policy violations are `Err`.
    pub async fn get_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
    ) -> SmpResult<FetchResponse> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| SmpError::Internal(format!("HTTP limiter closed: {}", e)))?;

        let mut current =
            Url::parse(url).map_err(|e| SmpError::transport(url, e))?;
        let mut redirects: u8 = 0;

        loop {
            debug!("GET {} (redirects: {})", current, redirects);

            let response = self
                .client
                .get(current.clone())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| SmpError::transport(current.as_str(), e))?;

            let status = response.status();

            if status.is_redirection() {
                if redirects >= MAX_REDIRECTS {
                    return Err(SmpError::transport(
                        current.as_str(),
                        "redirect limit exceeded (profile allows one redirect)",
                    ));
                }

                let location = response
                    .headers()
                    .get(LOCATION)
                    .ok_or_else(|| {
                        SmpError::transport(current.as_str(), "redirect without Location header")
                    })?
                    .to_str()
                    .map_err(|e| SmpError::transport(current.as_str(), e))?
                    .to_string();

                // Relative Location values resolve against the previous URL
                current = current
                    .join(&location)
                    .map_err(|e| SmpError::transport(current.as_str(), e))?;
                redirects += 1;
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|e| SmpError::transport(current.as_str(), e))?;

            return Ok(FetchResponse {
                final_url: current.to_string(),
                status: status.as_u16(),
                body,
                redirects,
            });
        }
    }
}
