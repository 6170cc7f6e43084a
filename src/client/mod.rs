//! HTTP transport seam
//!
//! The scenario gun only talks to a [`Client`]. The production implementation
//! is [`HttpClient`] (reqwest); tests substitute an in-memory client.

pub mod http;

pub use self::http::{ClientConfig, HttpClient};

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use ::http::{HeaderMap, Method, StatusCode, Version};
use thiserror::Error;
use url::Url;

/// Transport-level failure
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to read body: {0}")]
    Body(String),
}

/// A fully rendered outgoing request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Approximate bytes put on the wire: request line, headers and body
    pub fn wire_size(&self) -> u64 {
        let line = self.method.as_str().len() + self.url.as_str().len() + 11;
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len() + 4)
            .sum();
        let body = self.body.as_ref().map(|b| b.len()).unwrap_or(0);
        (line + headers + 2 + body) as u64
    }
}

/// Status line and headers of a response
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }

    /// Header value as text; `None` if absent or not valid UTF-8
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// e.g. `HTTP/1.1 200 OK`
    pub fn status_line(&self) -> String {
        format!(
            "{:?} {} {}",
            self.version,
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or("")
        )
        .trim_end()
        .to_string()
    }

    /// Approximate size of the status line and headers
    pub fn wire_size(&self) -> u64 {
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len() + 4)
            .sum();
        (self.status_line().len() + 2 + headers + 2) as u64
    }
}

type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Streaming response body; read it fully or drain it, exactly once
pub struct ResponseBody {
    inner: BodyStream,
}

impl ResponseBody {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::from_stream(stream::once(async move { Ok(bytes) }))
    }

    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    /// Collect the whole body
    pub async fn read_all(mut self) -> Result<Bytes, ClientError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Consume the body without keeping it; returns the number of bytes read
    pub async fn drain(mut self) -> Result<u64, ClientError> {
        let mut total = 0u64;
        while let Some(chunk) = self.inner.next().await {
            total += chunk?.len() as u64;
        }
        Ok(total)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody { .. }")
    }
}

#[derive(Debug)]
pub struct Response {
    pub head: ResponseHead,
    pub body: ResponseBody,
}

/// Sends one request and returns the response head plus a body stream
pub trait Client: Send + Sync {
    fn send(&self, req: Request) -> impl Future<Output = Result<Response, ClientError>> + Send;

    /// Release pooled connections at the end of a scenario
    fn close_idle_connections(&self) {}
}

/// A step URL after target resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub url: Url,
    /// `host[:port]` of an absolute step URL whose authority was replaced by
    /// the target; sent as the `Host` header
    pub host: Option<String>,
}

/// Point a step URL at the configured target.
///
/// Relative URLs (`/api/items?x=1`) are joined onto the target. Absolute
/// URLs keep their path and query but take the target's scheme, host and
/// port, and remember their own authority for the `Host` header. Without a
/// target the URL must be absolute.
pub fn resolve_target(raw: &str, target: Option<&Url>) -> Result<Resolved, String> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut url) => {
            let mut host = None;
            if let Some(target) = target {
                let original = authority(&url);
                url.set_scheme(target.scheme())
                    .map_err(|_| format!("cannot switch `{}` to scheme {}", raw, target.scheme()))?;
                url.set_host(target.host_str())
                    .map_err(|e| format!("cannot retarget `{}`: {}", raw, e))?;
                url.set_port(target.port())
                    .map_err(|_| format!("cannot set port on `{}`", raw))?;
                if authority(&url) != original {
                    host = original;
                }
            }
            Ok(Resolved { url, host })
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => match target {
            Some(target) => target
                .join(raw)
                .map(|url| Resolved { url, host: None })
                .map_err(|e| format!("invalid url `{}`: {}", raw, e)),
            None => Err(format!("relative url `{}` requires a target", raw)),
        },
        Err(e) => Err(format!("invalid url `{}`: {}", raw, e)),
    }
}

/// `host[:port]`, the port only when it is not the scheme default
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
