//! Authenticated HTTP access to the archive API.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{HeaderName, HeaderValue};
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::config::Config;
use crate::error::{Error, Result};

/// Environment variable holding the API token
pub const TOKEN_ENV_VAR: &str = "PAPERTRAIL_API_TOK";

/// Response body of an archive download
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// API token used to authorize catalog and download requests
#[derive(Clone)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Wrap an explicit token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read the token from [`TOKEN_ENV_VAR`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_value(std::env::var(TOKEN_ENV_VAR).ok())
    }

    /// Accept a token looked up elsewhere, rejecting missing or blank values
    pub fn from_value(value: Option<String>) -> Result<Self> {
        value
            .filter(|t| !t.trim().is_empty())
            .map(Self::new)
            .ok_or_else(|| {
                Error::config("api_token", format!("{} env var required", TOKEN_ENV_VAR))
            })
    }

    /// The raw token
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Opens archive bodies for reading
///
/// A successful return means the body can be read to completion; any other
/// outcome is an error.
#[async_trait]
pub trait ArchiveTransport: Send + Sync {
    /// Issue one read request for `locator`
    async fn open_for_read(&self, locator: &str) -> Result<ByteStream>;
}

/// reqwest-backed client that sends the API token on every request
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    token_header: HeaderName,
    token: HeaderValue,
}

impl HttpClient {
    /// Build a client from the run configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the header name or token are not valid
    /// HTTP header text, and [`Error::Network`] if the client cannot be built.
    pub fn new(config: &Config, credentials: &Credentials) -> Result<Self> {
        let token_header = HeaderName::from_bytes(config.token_header.as_bytes()).map_err(|e| {
            Error::config(
                "token_header",
                format!("invalid header name '{}': {}", config.token_header, e),
            )
        })?;

        let mut token = HeaderValue::from_str(credentials.token())
            .map_err(|e| Error::config("api_token", format!("invalid token: {}", e)))?;
        token.set_sensitive(true);

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            token_header,
            token,
        })
    }

    /// Authenticated GET that only returns successful responses
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .header(self.token_header.clone(), self.token.clone())
            .send()
            .await
            .map_err(|e| request_error(url, &e))?;

        if !response.status().is_success() {
            return Err(Error::status(response.status(), url));
        }

        Ok(response)
    }
}

#[async_trait]
impl ArchiveTransport for HttpClient {
    async fn open_for_read(&self, locator: &str) -> Result<ByteStream> {
        let response = self.get(locator).await?;
        tracing::debug!(
            url = locator,
            status = response.status().as_u16(),
            content_length = ?response.content_length(),
            "Archive response received"
        );

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let stream: ByteStream = Box::pin(StreamReader::new(body));
        Ok(stream)
    }
}

pub(crate) fn request_error(url: &str, e: &reqwest::Error) -> Error {
    let message = if e.is_timeout() {
        format!("timeout fetching '{}'", url)
    } else if e.is_connect() {
        format!("connection failed for '{}': {}", url, e)
    } else {
        format!("failed to fetch '{}': {}", url, e)
    };
    Error::Transport {
        status: e.status().map(|s| s.as_u16()),
        message,
    }
}
