//! In-memory listing and image backends shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use wikicolor::{
    config::Config,
    errors::{ResolveError, SourceError, SourceResult},
    sources::{ListingClient, ListingPage, PageCursor, PageRequest},
    utils::ImageFetcher,
};

pub fn png(color: [u8; 4]) -> Bytes {
    let image = RgbaImage::from_pixel(8, 8, Rgba(color));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    Bytes::from(buffer.into_inner())
}

pub fn image_url(index: usize) -> String {
    format!("https://upload.test/{index}.png")
}

/// Listing of `total` numbered uploads
pub struct FakeListing {
    total: usize,
    calls: AtomicUsize,
    limits: Mutex<Vec<usize>>,
    /// 1-based call number that fails with a parse error
    fail_on_call: Option<usize>,
    /// Serve this URL for every entry instead of numbered ones
    repeat_url: Option<String>,
}

impl FakeListing {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            calls: AtomicUsize::new(0),
            limits: Mutex::new(Vec::new()),
            fail_on_call: None,
            repeat_url: None,
        }
    }

    pub fn with_repeat_url(mut self, url: impl Into<String>) -> Self {
        self.repeat_url = Some(url.into());
        self
    }

    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn limits(&self) -> Vec<usize> {
        self.limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingClient for FakeListing {
    async fn fetch_page(&self, request: &PageRequest) -> SourceResult<ListingPage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.limits.lock().unwrap().push(request.limit);
        if self.fail_on_call == Some(call) {
            return Err(SourceError::parse("expected value at line 1 column 1"));
        }

        let start = request
            .cursor
            .as_ref()
            .map(|c| c.aicontinue().parse::<usize>().unwrap())
            .unwrap_or(0);
        let end = (start + request.limit).min(self.total);
        let urls = (start..end)
            .map(|i| self.repeat_url.clone().unwrap_or_else(|| image_url(i)))
            .collect();
        let cursor = if end < self.total {
            PageCursor::new("-||", end.to_string())
        } else {
            None
        };
        Ok(ListingPage::new(urls, cursor))
    }
}

/// Serves the same image for every URL, optionally after a delay
pub struct FakeFetcher {
    body: Bytes,
    delay: Option<Duration>,
    calls: AtomicUsize,
    per_url: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn new(color: [u8; 4]) -> Self {
        Self {
            body: png(color),
            delay: None,
            calls: AtomicUsize::new(0),
            per_url: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.per_url.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch_image(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.per_url.lock().unwrap().entry(url.to_string()).or_default() += 1;

        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(self.body.clone())
    }
}

pub fn test_config(workers: usize, queue_capacity: usize, page_limit_max: usize) -> Config {
    let mut config = Config::default();
    config.pipeline.workers = workers;
    config.pipeline.queue_capacity = queue_capacity;
    config.upstream.page_limit_max = page_limit_max;
    config.cache.capacity = 64;
    config
}
