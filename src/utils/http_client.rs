use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::errors::{AppResult, ResolveError};

/// Fetches raw image bytes for the worker pool
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download `url`, abandoning the transfer as soon as `cancel` fires
    async fn fetch_image(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes, ResolveError>;
}

/// Transport-level failures from [`StandardHttpClient`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status} {reason}")]
    Status { status: u16, reason: String },

    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("cancelled")]
    Cancelled,
}

impl From<FetchError> for ResolveError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => ResolveError::Cancelled,
            other => ResolveError::Transport(other.to_string()),
        }
    }
}

/// reqwest-backed client shared by the listing source and the image fetcher
#[derive(Debug, Clone)]
pub struct StandardHttpClient {
    client: Client,
    max_body_bytes: usize,
}

impl StandardHttpClient {
    /// Build a client with the upstream timeouts and a `wikicolor/<version>`
    /// user agent unless one is configured
    pub fn new(config: &UpstreamConfig, max_body_bytes: usize) -> AppResult<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")));

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            max_body_bytes,
        })
    }

    /// Same connection pool with a different body size limit
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// GET `url` and collect the body, refusing bodies over the size limit.
    ///
    /// Dropping the returned future aborts the underlying read.
    pub async fn get_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        if let Some(length) = response.content_length()
            && length > self.max_body_bytes as u64
        {
            return Err(FetchError::TooLarge {
                limit: self.max_body_bytes,
            });
        }

        let mut body = BytesMut::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| FetchError::Request(e.to_string()))?;
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body.freeze())
    }
}

#[async_trait]
impl ImageFetcher for StandardHttpClient {
    async fn fetch_image(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes, ResolveError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            result = self.get_bytes(url) => result.map_err(ResolveError::from),
        }
    }
}
