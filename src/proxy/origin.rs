//! Vendor HTTP access.

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use http::StatusCode;

use crate::body::BodyStream;
use crate::error::OriginError;

/// Default TCP/TLS connect timeout for vendor requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An upstream answer, before its body is read.
pub struct OriginResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl fmt::Debug for OriginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Issues GET requests to vendor origins.
#[async_trait]
pub trait Origin: Send + Sync + 'static {
    /// GET `url`. Any HTTP status is a successful fetch; only transport
    /// failures are errors.
    async fn fetch(&self, url: &str) -> Result<OriginResponse, OriginError>;
}

/// [`Origin`] backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
}

impl HttpOrigin {
    /// Build a client with the given connect and whole-request timeouts.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, OriginError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| OriginError::Connection(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, url: &str) -> Result<OriginResponse, OriginError> {
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;

        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(OriginResponse {
            status: response.status(),
            content_type,
            content_length: response.content_length(),
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(body_error))
                .boxed(),
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> OriginError {
    if err.is_timeout() {
        OriginError::Timeout(err.to_string())
    } else {
        OriginError::Connection(err.to_string())
    }
}

fn body_error(err: reqwest::Error) -> io::Error {
    let kind = if err.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, err)
}
