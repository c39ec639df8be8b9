//! Wikimedia Commons `list=allimages` listing client

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::traits::{ListingClient, ListingPage, PageCursor, PageRequest};
use crate::errors::{AppError, AppResult, SourceError, SourceResult};
use crate::utils::StandardHttpClient;

/// Mirrors the parts of the query response we read
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(rename = "continue", default)]
    continuation: Option<ContinueBlock>,
    #[serde(default)]
    query: Option<QueryBlock>,
    #[serde(default)]
    error: Option<ApiErrorBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct ContinueBlock {
    #[serde(rename = "continue", default)]
    continue_token: String,
    #[serde(default)]
    aicontinue: String,
}

#[derive(Debug, Default, Deserialize)]
struct QueryBlock {
    #[serde(default)]
    allimages: Vec<ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBlock {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

/// Parse a listing body into a page. A partial continuation pair yields no cursor.
pub fn parse_listing(body: &[u8]) -> SourceResult<ListingPage> {
    let response: QueryResponse =
        serde_json::from_slice(body).map_err(|e| SourceError::parse(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(SourceError::parse(format!(
            "API error {}: {}",
            error.code, error.info
        )));
    }

    let urls = response
        .query
        .map(|q| q.allimages.into_iter().map(|img| img.url).collect())
        .unwrap_or_default();
    let cursor = response
        .continuation
        .and_then(|c| PageCursor::new(c.continue_token, c.aicontinue));

    Ok(ListingPage::new(urls, cursor))
}

/// Lists the most recent uploads, newest first
#[derive(Debug, Clone)]
pub struct CommonsListingClient {
    http: StandardHttpClient,
    api_url: Url,
}

impl CommonsListingClient {
    pub fn new(http: StandardHttpClient, api_url: &str) -> AppResult<Self> {
        let api_url = Url::parse(api_url)
            .map_err(|e| AppError::configuration(format!("invalid listing URL '{api_url}': {e}")))?;
        Ok(Self { http, api_url })
    }

    /// Full request URL for one page
    pub fn page_url(&self, request: &PageRequest) -> Url {
        let mut url = self.api_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("action", "query")
                .append_pair("format", "json")
                .append_pair("list", "allimages")
                .append_pair("aidir", "descending")
                .append_pair("aisort", "timestamp")
                .append_pair("aiprop", "url")
                .append_pair("ailimit", &request.limit.to_string());

            if let Some(cursor) = &request.cursor {
                query
                    .append_pair("continue", cursor.continue_token())
                    .append_pair("aicontinue", cursor.aicontinue());
            }
        }
        url
    }
}

#[async_trait]
impl ListingClient for CommonsListingClient {
    async fn fetch_page(&self, request: &PageRequest) -> SourceResult<ListingPage> {
        let url = self.page_url(request);
        debug!(
            "Fetching listing page (limit {}, continued: {})",
            request.limit,
            request.cursor.is_some()
        );

        let body = self
            .http
            .get_bytes(url.as_str())
            .await
            .map_err(|e| SourceError::transport(url.as_str(), e.to_string()))?;

        parse_listing(&body)
    }
}
