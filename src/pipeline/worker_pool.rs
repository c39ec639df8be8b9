//! Fixed-size worker pool shared by every session
//!
//! All workers pull from one bounded queue through a shared receiver. Each
//! [`WorkItem`] carries its session's cancellation token and response sender,
//! so one pool serves any number of concurrent sessions.

use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::SubmitMode;
use crate::color::{Color, ColorStrategy};
use crate::errors::ResolveError;
use crate::models::{ColorResult, Ticket};
use crate::services::ColorCache;
use crate::utils::ImageFetcher;

/// One URL to resolve on behalf of a session
#[derive(Debug)]
pub struct WorkItem {
    pub ticket: Ticket,
    pub url: String,
    pub cancel: CancellationToken,
    pub reply: mpsc::Sender<WorkerReply>,
}

/// Result sent back to the owning session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReply {
    pub ticket: Ticket,
    pub result: ColorResult,
    /// Served from the cache without touching the network
    pub cache_hit: bool,
}

/// Pool counters exposed on the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub active: usize,
    pub processed: u64,
    pub panics: u64,
}

/// Everything a worker needs to turn a URL into a result
struct WorkerContext {
    fetcher: Arc<dyn ImageFetcher>,
    strategy: Arc<dyn ColorStrategy>,
    cache: ColorCache,
    active: AtomicUsize,
    processed: AtomicU64,
    panics: AtomicU64,
}

pub struct WorkerPool {
    sender: RwLock<Option<mpsc::Sender<WorkItem>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    context: Arc<WorkerContext>,
    worker_count: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    /// Spawn `workers` tasks on the current runtime
    pub fn new(
        workers: usize,
        queue_capacity: usize,
        fetcher: Arc<dyn ImageFetcher>,
        strategy: Arc<dyn ColorStrategy>,
        cache: ColorCache,
    ) -> Self {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let context = Arc::new(WorkerContext {
            fetcher,
            strategy,
            cache,
            active: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            panics: AtomicU64::new(0),
        });

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let context = Arc::clone(&context);
                tokio::spawn(async move { context.run(worker_id, receiver).await })
            })
            .collect();

        info!(
            "Started {} color workers (queue capacity {}, strategy {})",
            workers,
            queue_capacity,
            context.strategy.name()
        );

        Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(handles),
            context,
            worker_count: workers,
            queue_capacity,
        }
    }

    /// Enqueue an item.
    ///
    /// `Block` waits for queue space and gives up when the item's session is
    /// cancelled. `Reject` fails at once with `QueueFull` when the queue is full.
    /// A pool that has been shut down reports `Cancelled`.
    pub async fn submit(&self, item: WorkItem, mode: SubmitMode) -> Result<(), ResolveError> {
        let Some(sender) = self.sender.read().await.clone() else {
            return Err(ResolveError::Cancelled);
        };

        match mode {
            SubmitMode::Block => {
                let cancel = item.cancel.clone();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ResolveError::Cancelled),
                    sent = sender.send(item) => sent.map_err(|_| ResolveError::Cancelled),
                }
            }
            SubmitMode::Reject => match sender.try_send(item) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => Err(ResolveError::QueueFull {
                    capacity: self.queue_capacity,
                }),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(ResolveError::Cancelled),
            },
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let queued = match self.sender.read().await.as_ref() {
            Some(sender) => self.queue_capacity - sender.capacity(),
            None => 0,
        };
        PoolStats {
            workers: self.worker_count,
            queue_capacity: self.queue_capacity,
            queued,
            active: self.context.active.load(Ordering::Relaxed),
            processed: self.context.processed.load(Ordering::Relaxed),
            panics: self.context.panics.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and wait for workers to drain what is already queued
    pub async fn shutdown(&self) {
        self.sender.write().await.take();

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Color worker ended abnormally: {}", e);
            }
        }
        info!("Color worker pool stopped");
    }
}

impl WorkerContext {
    async fn run(&self, worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkItem>>>) {
        debug!("Color worker {} started", worker_id);

        loop {
            let item = {
                let mut receiver = receiver.lock().await;
                receiver.recv().await
            };
            let Some(item) = item else {
                break;
            };

            self.active.fetch_add(1, Ordering::Relaxed);
            let (result, cache_hit) = self.process(&item).await;
            self.active.fetch_sub(1, Ordering::Relaxed);
            self.processed.fetch_add(1, Ordering::Relaxed);

            let reply = WorkerReply {
                ticket: item.ticket,
                result,
                cache_hit,
            };
            match item.reply.try_send(reply) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Session for {} already closed", item.ticket);
                }
                Err(mpsc::error::TrySendError::Full(reply)) => {
                    // A full reply queue must not pin this worker past cancellation
                    tokio::select! {
                        biased;
                        sent = item.reply.send(reply) => {
                            if sent.is_err() {
                                debug!("Session for {} already closed", item.ticket);
                            }
                        }
                        _ = item.cancel.cancelled() => {
                            debug!("Dropping result for {} after cancellation", item.ticket);
                        }
                    }
                }
            }
        }

        debug!("Color worker {} stopped", worker_id);
    }

    async fn process(&self, item: &WorkItem) -> (ColorResult, bool) {
        if item.cancel.is_cancelled() {
            return (ColorResult::cancelled(&item.url), false);
        }

        if let Some(cached) = self.cache.get(&item.url).await {
            debug!("Cache hit for {}", item.url);
            return (cached, true);
        }

        let result = match self.resolve(item).await {
            Ok(color) => ColorResult::success(&item.url, color),
            Err(e) => {
                if !e.is_cancelled() {
                    warn!("Failed to resolve {}: {}", item.url, e);
                }
                ColorResult::failure(&item.url, e)
            }
        };

        self.cache.add(result.clone()).await;
        (result, false)
    }

    async fn resolve(&self, item: &WorkItem) -> Result<Color, ResolveError> {
        let bytes = self.fetcher.fetch_image(&item.url, &item.cancel).await?;

        let strategy = Arc::clone(&self.strategy);
        let cancel = item.cancel.clone();
        let computed = tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes)
                .map_err(|e| ResolveError::Parse(format!("undecodable image: {e}")))?
                .to_rgba8();
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            strategy.compute(&image, &cancel).map_err(ResolveError::from)
        })
        .await;

        match computed {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                self.panics.fetch_add(1, Ordering::Relaxed);
                let message = panic_message(e.into_panic());
                error!("Color computation for {} panicked: {}", item.url, message);
                Err(ResolveError::Invariant(format!(
                    "color computation panicked: {message}"
                )))
            }
            Err(e) => Err(ResolveError::Invariant(e.to_string())),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::StrategyKind;
    use crate::errors::ColorError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;

    fn png(color: [u8; 4]) -> Bytes {
        let image = RgbaImage::from_pixel(4, 4, Rgba(color));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        Bytes::from(buffer.into_inner())
    }

    struct FakeFetcher {
        body: Bytes,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch_image(&self, _url: &str, _cancel: &CancellationToken) -> Result<Bytes, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    #[derive(Debug)]
    struct PanickingStrategy;

    impl ColorStrategy for PanickingStrategy {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn compute(&self, _image: &RgbaImage, _cancel: &CancellationToken) -> Result<Color, ColorError> {
            panic!("palette table corrupted")
        }
    }

    fn pool_with(body: Bytes, strategy: Arc<dyn ColorStrategy>, queue: usize) -> (WorkerPool, Arc<FakeFetcher>) {
        let fetcher = Arc::new(FakeFetcher {
            body,
            calls: AtomicUsize::new(0),
        });
        let pool = WorkerPool::new(2, queue, fetcher.clone(), strategy, ColorCache::new(16));
        (pool, fetcher)
    }

    fn item(ticket: u64, url: &str, cancel: &CancellationToken, reply: &mpsc::Sender<WorkerReply>) -> WorkItem {
        WorkItem {
            ticket: Ticket(ticket),
            url: url.to_string(),
            cancel: cancel.clone(),
            reply: reply.clone(),
        }
    }

    #[tokio::test]
    async fn test_resolves_and_caches_success() {
        let (pool, fetcher) = pool_with(png([255, 0, 0, 255]), StrategyKind::FirstNonGray.build(), 8);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        pool.submit(item(0, "https://img.test/red.png", &cancel, &tx), SubmitMode::Block)
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.ticket, Ticket(0));
        assert_eq!(first.result.color().unwrap().xterm, 9);
        assert!(!first.cache_hit);

        pool.submit(item(1, "https://img.test/red.png", &cancel, &tx), SubmitMode::Block)
            .await
            .unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.result, first.result);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_parse_failure() {
        let (pool, _) = pool_with(Bytes::from_static(b"not an image"), StrategyKind::Mean.build(), 8);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        pool.submit(item(0, "https://img.test/x.png", &cancel, &tx), SubmitMode::Block)
            .await
            .unwrap();
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.result.error().unwrap().kind(), "parse");
    }

    #[tokio::test]
    async fn test_compute_panic_becomes_invariant_and_pool_survives() {
        let (pool, _) = pool_with(png([0, 0, 255, 255]), Arc::new(PanickingStrategy), 8);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        for ticket in 0..3 {
            pool.submit(item(ticket, &format!("https://img.test/{ticket}.png"), &cancel, &tx), SubmitMode::Block)
                .await
                .unwrap();
        }
        for _ in 0..3 {
            let reply = rx.recv().await.unwrap();
            assert_eq!(reply.result.error().unwrap().kind(), "invariant");
        }
        assert_eq!(pool.stats().await.panics, 3);
    }

    #[tokio::test]
    async fn test_cancelled_session_is_refused_at_submit() {
        let (pool, fetcher) = pool_with(png([0, 255, 0, 255]), StrategyKind::FirstNonGray.build(), 8);
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pool
            .submit(item(0, "https://img.test/g.png", &cancel, &tx), SubmitMode::Block)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_item_cancelled_while_queued_skips_network() {
        let (pool, fetcher) = pool_with(png([0, 255, 0, 255]), StrategyKind::FirstNonGray.build(), 8);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        pool.submit(item(0, "https://img.test/g.png", &cancel, &tx), SubmitMode::Block)
            .await
            .unwrap();
        cancel.cancel();
        pool.shutdown().await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        drop(tx);
        let reply = rx.recv().await.unwrap();
        assert!(reply.result.error().is_some_and(|e| e.is_cancelled()));
        assert!(rx.recv().await.is_none());
    }

    /// Cancels the item's token from inside the computation, then succeeds
    #[derive(Debug)]
    struct CancelThenSucceed;

    impl ColorStrategy for CancelThenSucceed {
        fn name(&self) -> &'static str {
            "cancel-then-succeed"
        }

        fn compute(&self, _image: &RgbaImage, cancel: &CancellationToken) -> Result<Color, ColorError> {
            cancel.cancel();
            Ok(crate::color::palette::color(9).unwrap())
        }
    }

    #[tokio::test]
    async fn test_result_completed_before_cancellation_is_delivered() {
        let (pool, _) = pool_with(png([255, 0, 0, 255]), Arc::new(CancelThenSucceed), 8);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        pool.submit(item(0, "https://img.test/red.png", &cancel, &tx), SubmitMode::Block)
            .await
            .unwrap();
        let reply = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(cancel.is_cancelled());
        assert!(reply.result.is_success());
        assert_eq!(reply.result.color().unwrap().xterm, 9);
    }

    #[tokio::test]
    async fn test_full_reply_queue_releases_worker_on_cancellation() {
        let (pool, _) = pool_with(png([0, 0, 255, 255]), StrategyKind::Mean.build(), 8);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        for ticket in 0..4 {
            pool.submit(item(ticket, &format!("https://img.test/{ticket}.png"), &cancel, &tx), SubmitMode::Block)
                .await
                .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(5), pool.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reject_mode_reports_queue_full() {
        let pool = WorkerPool::new(
            1,
            1,
            Arc::new(FakeFetcher {
                body: png([1, 2, 3, 255]),
                calls: AtomicUsize::new(0),
            }),
            StrategyKind::Mean.build(),
            ColorCache::new(4),
        );
        // The single worker cannot run between two non-blocking submits
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let mut outcomes = Vec::new();
        for ticket in 0..16 {
            outcomes.push(
                pool.submit(item(ticket, &format!("u{ticket}"), &cancel, &tx), SubmitMode::Reject)
                    .await,
            );
        }
        assert!(
            outcomes
                .iter()
                .any(|o| matches!(o, Err(ResolveError::QueueFull { capacity: 1 })))
        );
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let (pool, _) = pool_with(png([9, 9, 9, 255]), StrategyKind::Mean.build(), 8);
        pool.shutdown().await;

        let (tx, _rx) = mpsc::channel(1);
        let err = pool
            .submit(item(0, "u", &CancellationToken::new(), &tx), SubmitMode::Block)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
