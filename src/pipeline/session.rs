//! One "resolve N images" request: producer task plus result aggregator

use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::coordinator::{CancelReason, SessionCoordinator};
use super::worker_pool::{WorkItem, WorkerPool, WorkerReply};
use super::SubmitMode;
use crate::errors::{ResolveError, SourceError};
use crate::models::{ColorResult, ResolveRequest, SessionSummary, Ticket};
use crate::sources::{ListingClient, Pager};

/// Lazy, single-pass stream of results for one session
pub type ColorStream = Pin<Box<dyn Stream<Item = ColorResult> + Send>>;

/// Service-wide knobs every session shares
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub submit_mode: SubmitMode,
    pub page_limit_max: usize,
}

/// Producer → aggregator notifications
#[derive(Debug)]
enum SessionEvent {
    /// Sent before the item is queued, so it always precedes the worker reply
    Submitted { ticket: Ticket, url: String },
    /// The pool refused the item
    Rejected { ticket: Ticket, result: ColorResult },
    /// The pager failed; counts as one submitted item
    Failed(ColorResult),
    Exhausted { pages: usize },
}

/// Bookkeeping for submitted and finalized tickets
#[derive(Debug, Default)]
struct Ledger {
    pending: HashMap<Ticket, String>,
    summary: SessionSummary,
    producer_done: bool,
}

impl Ledger {
    fn on_event(&mut self, event: Option<SessionEvent>) -> Option<ColorResult> {
        match event {
            Some(SessionEvent::Submitted { ticket, url }) => {
                self.summary.submitted += 1;
                self.pending.insert(ticket, url);
                None
            }
            Some(SessionEvent::Rejected { ticket, result }) => {
                self.pending.remove(&ticket)?;
                self.record(&result, false);
                Some(result)
            }
            Some(SessionEvent::Failed(result)) => {
                self.summary.submitted += 1;
                self.record(&result, false);
                Some(result)
            }
            Some(SessionEvent::Exhausted { pages }) => {
                debug!("Producer finished after {} listing pages", pages);
                self.producer_done = true;
                None
            }
            None => {
                self.producer_done = true;
                None
            }
        }
    }

    fn on_reply(&mut self, reply: WorkerReply) -> Option<ColorResult> {
        if self.pending.remove(&reply.ticket).is_none() {
            debug!("Dropping late result for {}", reply.ticket);
            return None;
        }
        self.record(&reply.result, reply.cache_hit);
        Some(reply.result)
    }

    fn record(&mut self, result: &ColorResult, cache_hit: bool) {
        self.summary.received += 1;
        if result.is_success() {
            self.summary.succeeded += 1;
        } else {
            self.summary.failed += 1;
        }
        if cache_hit {
            self.summary.cache_hits += 1;
        }
    }

    /// Close every outstanding ticket with `error`, in submission order
    fn finalize_pending(&mut self, error: ResolveError) -> Vec<ColorResult> {
        let mut outstanding: Vec<(Ticket, String)> = self.pending.drain().collect();
        outstanding.sort_by_key(|(ticket, _)| *ticket);

        self.summary.synthesized += outstanding.len();
        self.summary.failed += outstanding.len();
        outstanding
            .into_iter()
            .map(|(_, url)| ColorResult::failure(url, error.clone()))
            .collect()
    }

    fn is_complete(&self) -> bool {
        self.producer_done && self.pending.is_empty()
    }
}

/// Cancels the session when the caller drops the stream
struct CancelOnDrop(Arc<SessionCoordinator>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel(CancelReason::Caller);
    }
}

enum Step {
    Cancelled,
    Event(Option<SessionEvent>),
    Reply(Option<WorkerReply>),
}

/// Start a session. Nothing runs until the stream is first polled.
///
/// The stream ends once every submitted item has produced a result, or right
/// after cancellation, when a `Cancelled` result is synthesized for each item
/// still outstanding. Either way, emitted equals submitted.
pub fn open_session(
    pool: Arc<WorkerPool>,
    listing: Arc<dyn ListingClient>,
    settings: SessionSettings,
    shutdown: &CancellationToken,
    request: ResolveRequest,
) -> ColorStream {
    let coordinator = SessionCoordinator::new(shutdown, request.deadline);
    let id = Uuid::new_v4();
    let span = info_span!("session", id = %id);

    let stream = async_stream::stream! {
        let _cancel_on_drop = CancelOnDrop(Arc::clone(&coordinator));
        info!(
            parent: &span,
            "Resolving up to {} images (deadline {:?})", request.max_images, request.deadline
        );

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        // Room for every ticket the session can issue, so a worker's reply
        // never waits on a caller that stopped reading
        let reply_capacity = request.max_images.clamp(1, Semaphore::MAX_PERMITS);
        let (reply_tx, mut reply_rx) = mpsc::channel(reply_capacity);
        let pager = Pager::new(listing, request.max_images, settings.page_limit_max);

        tokio::spawn(
            produce(
                pager,
                pool,
                settings.submit_mode,
                Arc::clone(&coordinator),
                event_tx,
                reply_tx,
            )
            .instrument(span.clone()),
        );

        let mut ledger = Ledger::default();
        let mut replies_closed = false;

        while !ledger.is_complete() && !(ledger.producer_done && replies_closed) {
            let step = tokio::select! {
                biased;
                _ = coordinator.cancelled() => Step::Cancelled,
                event = event_rx.recv(), if !ledger.producer_done => Step::Event(event),
                reply = reply_rx.recv(), if !replies_closed => Step::Reply(reply),
            };

            match step {
                Step::Event(event) => {
                    if let Some(result) = ledger.on_event(event) {
                        yield result;
                    }
                }
                Step::Reply(Some(reply)) => {
                    if let Some(result) = ledger.on_reply(reply) {
                        yield result;
                    }
                }
                Step::Reply(None) => replies_closed = true,
                Step::Cancelled => {
                    // Let the producer notice and account for what it already sent
                    while !ledger.producer_done {
                        let event = event_rx.recv().await;
                        if let Some(result) = ledger.on_event(event) {
                            yield result;
                        }
                    }
                    while let Ok(reply) = reply_rx.try_recv() {
                        if let Some(result) = ledger.on_reply(reply) {
                            yield result;
                        }
                    }
                    for result in ledger.finalize_pending(ResolveError::Cancelled) {
                        yield result;
                    }
                }
            }
        }

        if !ledger.pending.is_empty() {
            warn!(parent: &span, "{} tasks ended without a result", ledger.pending.len());
            for result in ledger.finalize_pending(ResolveError::Invariant(
                "task finished without reporting a result".to_string(),
            )) {
                yield result;
            }
        }

        let summary = ledger.summary;
        let reason = coordinator.reason();
        info!(
            parent: &span,
            submitted = summary.submitted,
            emitted = summary.emitted(),
            synthesized = summary.synthesized,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cache_hits = summary.cache_hits,
            cancelled = ?reason,
            "Session finished"
        );
    };

    Box::pin(stream)
}

/// Drives the pager and submits each URL to the pool
async fn produce(
    mut pager: Pager,
    pool: Arc<WorkerPool>,
    mode: SubmitMode,
    coordinator: Arc<SessionCoordinator>,
    events: mpsc::UnboundedSender<SessionEvent>,
    replies: mpsc::Sender<WorkerReply>,
) {
    let cancel = coordinator.token().clone();
    let mut next_ticket = 0u64;

    loop {
        let url = match pager.next_url(&cancel).await {
            Ok(Some(url)) => url,
            Ok(None) | Err(SourceError::Cancelled) => break,
            Err(e) => {
                let url = match &e {
                    SourceError::Transport { url, .. } => url.clone(),
                    _ => String::new(),
                };
                let _ = events.send(SessionEvent::Failed(ColorResult::failure(url, e.into())));
                break;
            }
        };

        let ticket = Ticket(next_ticket);
        next_ticket += 1;

        coordinator.arm();
        if events
            .send(SessionEvent::Submitted {
                ticket,
                url: url.clone(),
            })
            .is_err()
        {
            break;
        }

        let item = WorkItem {
            ticket,
            url: url.clone(),
            cancel: cancel.clone(),
            reply: replies.clone(),
        };
        if let Err(e) = pool.submit(item, mode).await {
            let stop = e.is_cancelled();
            debug!("Submission of {} refused: {}", ticket, e);
            let _ = events.send(SessionEvent::Rejected {
                ticket,
                result: ColorResult::failure(url, e),
            });
            if stop {
                break;
            }
        }
    }

    let _ = events.send(SessionEvent::Exhausted {
        pages: pager.pages_fetched(),
    });
}
