//! Flattens the paginated listing into a sequence of image URLs

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::traits::{ListingClient, PageCursor, PageRequest};
use crate::errors::{SourceError, SourceResult};

/// Stateful iterator over at most `max` listing URLs.
///
/// A page is fetched only when the previous one has been handed out in full.
/// Once the pager returns `Ok(None)` or an error it stays finished.
pub struct Pager {
    client: Arc<dyn ListingClient>,
    page: Vec<String>,
    index: usize,
    cursor: Option<PageCursor>,
    count: usize,
    max: usize,
    page_limit_max: usize,
    pages_fetched: usize,
    finished: bool,
}

impl Pager {
    pub fn new(client: Arc<dyn ListingClient>, max: usize, page_limit_max: usize) -> Self {
        Self {
            client,
            page: Vec::new(),
            index: 0,
            cursor: None,
            count: 0,
            max,
            page_limit_max: page_limit_max.max(1),
            pages_fetched: 0,
            finished: max == 0,
        }
    }

    /// URLs handed out so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Upstream calls made so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next URL, `Ok(None)` at end of results.
    ///
    /// Checks `cancel` before starting a fetch and abandons an in-flight fetch
    /// when it fires. Failures are not retried.
    pub async fn next_url(&mut self, cancel: &CancellationToken) -> SourceResult<Option<String>> {
        if self.finished || self.count >= self.max {
            self.finished = true;
            return Ok(None);
        }

        if self.index >= self.page.len() {
            // A missing cursor after the first page means the listing is done
            if self.pages_fetched > 0 && self.cursor.is_none() {
                debug!(
                    "Listing ended after {} pages ({} urls)",
                    self.pages_fetched, self.count
                );
                self.finished = true;
                return Ok(None);
            }

            if cancel.is_cancelled() {
                self.finished = true;
                return Err(SourceError::Cancelled);
            }

            let request = PageRequest {
                limit: self.page_limit_max.min(self.max - self.count),
                cursor: self.cursor.clone(),
            };

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SourceError::Cancelled),
                result = self.client.fetch_page(&request) => result,
            };
            self.pages_fetched += 1;

            let page = match fetched {
                Ok(page) => page,
                Err(e) => {
                    if !matches!(e, SourceError::Cancelled) {
                        warn!("Listing page {} failed: {}", self.pages_fetched, e);
                    }
                    self.finished = true;
                    return Err(e);
                }
            };

            if page.is_empty() {
                debug!("Listing returned an empty page, no more results");
                self.finished = true;
                return Ok(None);
            }

            debug!(
                "Fetched listing page {} with {} urls (more: {})",
                self.pages_fetched,
                page.urls.len(),
                page.cursor.is_some()
            );
            self.page = page.urls;
            self.cursor = page.cursor;
            self.index = 0;
        }

        let url = std::mem::take(&mut self.page[self.index]);
        self.index += 1;
        self.count += 1;
        Ok(Some(url))
    }
}
