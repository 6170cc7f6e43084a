//! reqwest-backed [`Client`]

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::redirect::Policy;

use super::{Client, ClientError, Request, Response, ResponseBody, ResponseHead};

/// User-Agent sent when a step does not set its own
pub const USER_AGENT_STRING: &str = concat!("quicshot/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`HttpClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub insecure: bool,
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: None,
            follow_redirects: false,
            max_redirects: 10,
            insecure: false,
            pool_max_idle_per_host: 100,
        }
    }
}

/// HTTP client shared by every shot of a run
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT_STRING)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(30));

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        builder = if config.follow_redirects {
            builder.redirect(Policy::limited(config.max_redirects))
        } else {
            builder.redirect(Policy::none())
        };

        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let inner = builder
            .build()
            .map_err(|e| ClientError::Request(format!("Failed to build client: {}", e)))?;
        Ok(Self { inner })
    }
}

impl Client for HttpClient {
    async fn send(&self, req: Request) -> Result<Response, ClientError> {
        let mut builder = self.inner.request(req.method, req.url).headers(req.headers);
        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify)?;

        let head = ResponseHead {
            status: response.status(),
            version: response.version(),
            headers: response.headers().clone(),
        };
        let body = ResponseBody::from_stream(
            response
                .bytes_stream()
                .map_err(|e| ClientError::Body(e.to_string())),
        );

        Ok(Response { head, body })
    }
}

fn classify(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else if e.is_connect() {
        ClientError::Connect(e.to_string())
    } else {
        ClientError::Request(e.to_string())
    }
}
