//! Background cache warming

use futures::StreamExt;
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::color_service::ColorService;
use crate::config::PrefetchConfig;
use crate::models::ResolveRequest;

/// Periodically runs a large session whose results are discarded; the
/// worker pool stores every success in the shared cache as a side effect.
pub struct Prefetcher {
    service: Arc<ColorService>,
    config: PrefetchConfig,
}

impl Prefetcher {
    pub fn new(service: Arc<ColorService>, config: PrefetchConfig) -> Self {
        Self { service, config }
    }

    /// Warm immediately, then every `interval` until `cancellation_token` fires
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!(
            "Starting cache prefetch ({} images every {:?})",
            self.config.max_images, self.config.interval
        );
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.warm().await;
                }
                _ = cancellation_token.cancelled() => {
                    info!("Cache prefetch received cancellation signal");
                    break;
                }
            }
        }

        info!("Cache prefetch stopped");
    }

    /// One warming pass. Returns the number of successful results.
    pub async fn warm(&self) -> usize {
        let request = ResolveRequest::new(self.config.max_images, self.config.deadline);
        let mut stream = self.service.resolve(request);

        let mut succeeded = 0;
        let mut failed = 0;
        while let Some(result) = stream.next().await {
            if result.is_success() {
                succeeded += 1;
            } else {
                failed += 1;
            }
        }

        debug!("Prefetch pass done: {} succeeded, {} failed", succeeded, failed);
        succeeded
    }
}
