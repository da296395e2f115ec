//! HTTP transport facade for provider adapters.
//!
//! Wraps `reqwest` behind the small surface adapters actually need: a
//! redirect-following client and a `Location`-reading one sharing a single
//! per-resolution cookie jar, full-body responses, and a one-shot retry on
//! timeout/connect failures. Adapters never touch `reqwest` types directly,
//! so tests can point them at a mock server and failures map cleanly onto
//! the engine's error taxonomy.

mod body;

pub use body::{as_json, as_text};

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Connection knobs shared by every session the engine opens.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
    /// Optional proxy URL (per-resolution override comes from descriptor
    /// extras).
    pub proxy: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
            )
            .to_string(),
            proxy: None,
        }
    }
}

/// Transport-level failures, before adapters wrap them with share context.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP client construction failed: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to {url} timed out twice")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid header value for {name}")]
    Header { name: String },
    #[error("invalid proxy URL: {0}")]
    Proxy(String),
}

/// A fully-read response: status, headers, raw body bytes.
#[derive(Debug)]
pub struct WireResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
}

impl WireResponse {
    /// The `Location` header, if present and non-empty. The engine reads
    /// download URLs from here, never from bodies.
    #[must_use]
    pub fn location(&self) -> Option<String> {
        self.headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    }

    /// All `Set-Cookie` values, raw.
    #[must_use]
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(ToString::to_string)
            .collect()
    }
}

/// One resolution's HTTP session: shared cookie jar, two clients.
///
/// Dropped (and its cookies with it) when the resolution completes. The
/// anti-bot challenge path discards a session wholesale and opens a fresh
/// one rather than trying to unpick poisoned cookies.
#[derive(Debug)]
pub struct Transport {
    client: Client,
    no_redirect: Client,
    jar: Arc<Jar>,
}

impl Transport {
    /// Opens a fresh session with its own cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when client construction fails or the
    /// proxy URL is unusable.
    pub fn open(config: &TransportConfig) -> Result<Self, TransportError> {
        let jar = Arc::new(Jar::default());
        let build = |follow_redirects: bool| -> Result<Client, TransportError> {
            let mut builder = Client::builder()
                .connect_timeout(config.connect_timeout)
                .timeout(config.read_timeout)
                .user_agent(config.user_agent.clone())
                .cookie_provider(jar.clone());
            if !follow_redirects {
                builder = builder.redirect(reqwest::redirect::Policy::none());
            }
            if let Some(proxy) = &config.proxy {
                let proxy = reqwest::Proxy::all(proxy)
                    .map_err(|_| TransportError::Proxy(proxy.clone()))?;
                builder = builder.proxy(proxy);
            }
            builder.build().map_err(TransportError::Build)
        };
        Ok(Self {
            client: build(true)?,
            no_redirect: build(false)?,
            jar,
        })
    }

    /// Sets a cookie on the session jar for `url`'s domain.
    pub fn add_cookie(&self, url: &Url, name: &str, value: &str) {
        self.jar
            .add_cookie_str(&format!("{name}={value}; Path=/"), url);
    }

    /// Cookie header the jar would currently send to `url` (used when
    /// deriving replay headers for the caller).
    #[must_use]
    pub fn cookies_for(&self, url: &Url) -> Option<String> {
        self.jar
            .cookies(url)
            .and_then(|value| value.to_str().map(ToString::to_string).ok())
    }

    /// GET following redirects.
    ///
    /// # Errors
    ///
    /// See [`TransportError`]; timeouts are retried once before erroring.
    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<WireResponse, TransportError> {
        self.send(&self.client, Method::GET, url, headers, None).await
    }

    /// GET without redirect following; the caller reads `Location` itself.
    ///
    /// # Errors
    ///
    /// See [`TransportError`].
    pub async fn get_no_redirect(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<WireResponse, TransportError> {
        self.send(&self.no_redirect, Method::GET, url, headers, None)
            .await
    }

    /// POST with an empty body (several providers key everything into the
    /// query string).
    ///
    /// # Errors
    ///
    /// See [`TransportError`].
    pub async fn post_empty(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<WireResponse, TransportError> {
        self.send(&self.client, Method::POST, url, headers, None)
            .await
    }

    /// POST with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`TransportError`].
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        json: &serde_json::Value,
    ) -> Result<WireResponse, TransportError> {
        self.send(&self.client, Method::POST, url, headers, Some(json))
            .await
    }

    async fn send(
        &self,
        client: &Client,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        json: Option<&serde_json::Value>,
    ) -> Result<WireResponse, TransportError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::Header {
                    name: (*name).to_string(),
                })?;
            let value = HeaderValue::from_str(value).map_err(|_| TransportError::Header {
                name: name.to_string(),
            })?;
            header_map.insert(name, value);
        }

        // Timeouts and connect failures get exactly one retry; anything
        // else surfaces immediately.
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = client
                .request(method.clone(), url)
                .headers(header_map.clone());
            if let Some(body) = json {
                request = request.json(body);
            }
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    let body = response
                        .bytes()
                        .await
                        .map_err(|source| TransportError::Network {
                            url: url.to_string(),
                            source,
                        })?;
                    debug!(%url, status = status.as_u16(), bytes = body.len(), "request complete");
                    return Ok(WireResponse {
                        status,
                        headers,
                        body,
                    });
                }
                Err(error) if attempt == 1 && (error.is_timeout() || error.is_connect()) => {
                    warn!(%url, %error, "transient network failure; retrying once");
                }
                Err(error) if error.is_timeout() => {
                    return Err(TransportError::Timeout {
                        url: url.to_string(),
                    });
                }
                Err(source) => {
                    return Err(TransportError::Network {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_location_header_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://dl.example/f"));
        let response = WireResponse {
            status: StatusCode::FOUND,
            headers,
            body: bytes::Bytes::new(),
        };
        assert_eq!(response.location().unwrap(), "https://dl.example/f");
    }

    #[test]
    fn test_empty_location_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("  "));
        let response = WireResponse {
            status: StatusCode::FOUND,
            headers,
            body: bytes::Bytes::new(),
        };
        assert!(response.location().is_none());
    }

    #[test]
    fn test_open_rejects_bad_proxy() {
        let config = TransportConfig {
            proxy: Some("definitely not a proxy url \u{0}".to_string()),
            ..TransportConfig::default()
        };
        assert!(matches!(
            Transport::open(&config),
            Err(TransportError::Proxy(_))
        ));
    }
}
