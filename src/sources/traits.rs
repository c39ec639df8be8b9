//! Listing source abstractions
//!
//! The pager only needs "give me the next page after this cursor". Keeping that
//! behind [`ListingClient`] lets the pipeline run against the live Commons API
//! or an in-memory listing.

use async_trait::async_trait;

use crate::errors::SourceResult;

/// Two-part continuation token handed back by the listing API.
///
/// The API only continues where it left off when both parts are echoed back
/// together, so a cursor cannot be built from a partial pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCursor {
    continue_token: String,
    aicontinue: String,
}

impl PageCursor {
    /// Returns `None` unless both parts are non-empty
    pub fn new(continue_token: impl Into<String>, aicontinue: impl Into<String>) -> Option<Self> {
        let continue_token = continue_token.into();
        let aicontinue = aicontinue.into();
        if continue_token.is_empty() || aicontinue.is_empty() {
            return None;
        }
        Some(Self {
            continue_token,
            aicontinue,
        })
    }

    pub fn continue_token(&self) -> &str {
        &self.continue_token
    }

    pub fn aicontinue(&self) -> &str {
        &self.aicontinue
    }
}

/// Parameters for one listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Number of results asked for
    pub limit: usize,
    /// Where to continue from; `None` starts at the newest upload
    pub cursor: Option<PageCursor>,
}

/// One page of image URLs plus the cursor for the next page, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub urls: Vec<String>,
    pub cursor: Option<PageCursor>,
}

impl ListingPage {
    pub fn new(urls: Vec<String>, cursor: Option<PageCursor>) -> Self {
        Self { urls, cursor }
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Paginated media listing
#[async_trait]
pub trait ListingClient: Send + Sync {
    /// Fetch a single page. Implementations do not retry.
    async fn fetch_page(&self, request: &PageRequest) -> SourceResult<ListingPage>;
}
