//! Owns the cache, the worker pool and the listing client, and opens sessions

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::color_cache::{CacheStats, ColorCache};
use crate::config::Config;
use crate::errors::AppResult;
use crate::models::ResolveRequest;
use crate::pipeline::{ColorStream, PoolStats, SessionSettings, WorkerPool, open_session};
use crate::sources::{CommonsListingClient, ListingClient};
use crate::utils::{ImageFetcher, StandardHttpClient};

/// Snapshot served by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub strategy: String,
    pub cache: CacheStats,
    pub pool: PoolStats,
    pub shutting_down: bool,
}

/// Entry point for resolving colors.
///
/// One service holds one cache and one worker pool; every session opened
/// through [`resolve`](Self::resolve) shares both.
pub struct ColorService {
    config: Config,
    cache: ColorCache,
    pool: Arc<WorkerPool>,
    listing: Arc<dyn ListingClient>,
    shutdown: CancellationToken,
    settings: SessionSettings,
}

impl ColorService {
    /// Build a service against the configured Commons endpoint
    pub fn new(config: Config) -> AppResult<Self> {
        let http = StandardHttpClient::new(&config.upstream, config.pipeline.max_image_bytes)?;
        let listing = CommonsListingClient::new(
            http.clone().with_max_body_bytes(config.upstream.max_listing_bytes),
            &config.upstream.api_url,
        )?;
        Ok(Self::with_components(
            config,
            Arc::new(listing),
            Arc::new(http),
        ))
    }

    /// Build a service over custom listing and image backends
    pub fn with_components(
        config: Config,
        listing: Arc<dyn ListingClient>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        let cache = ColorCache::new(config.cache.capacity);
        let pool = Arc::new(WorkerPool::new(
            config.pipeline.workers,
            config.pipeline.queue_capacity,
            fetcher,
            config.color.strategy.build(),
            cache.clone(),
        ));
        let settings = SessionSettings {
            submit_mode: config.pipeline.submit_mode,
            page_limit_max: config.upstream.page_limit_max,
        };

        info!(
            "Color service ready: {} workers, cache capacity {}, strategy {}, submit mode {}",
            config.pipeline.workers,
            cache.capacity(),
            config.color.strategy,
            settings.submit_mode
        );

        Self {
            config,
            cache,
            pool,
            listing,
            shutdown: CancellationToken::new(),
            settings,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ColorCache {
        &self.cache
    }

    /// Parent of every session token
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request with the configured defaults, the image count and the deadline
    /// clamped to their caps
    pub fn request(&self, max_images: Option<usize>, deadline: Option<Duration>) -> ResolveRequest {
        ResolveRequest::new(
            self.config.session.clamp_max_images(max_images),
            self.config.session.clamp_deadline(deadline),
        )
    }

    /// Open a session. The returned stream yields exactly one result per
    /// submitted URL; dropping it cancels the session.
    pub fn resolve(&self, request: ResolveRequest) -> ColorStream {
        open_session(
            Arc::clone(&self.pool),
            Arc::clone(&self.listing),
            self.settings,
            &self.shutdown,
            request,
        )
    }

    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            strategy: self.config.color.strategy.to_string(),
            cache: self.cache.stats().await,
            pool: self.pool.stats().await,
            shutting_down: self.shutdown.is_cancelled(),
        }
    }

    /// Cancel all sessions and stop the workers
    pub async fn shutdown(&self) {
        info!("Shutting down color service");
        self.shutdown.cancel();
        self.pool.shutdown().await;
    }
}
