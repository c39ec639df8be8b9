//! Per-session cancellation and deadline

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use strum::Display;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Why a session stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CancelReason {
    Deadline,
    Caller,
    Shutdown,
}

/// Owns one session's cancellation token.
///
/// The token is a child of the service shutdown token. It is cancelled at most
/// once and the first reason recorded wins. The deadline clock starts on
/// [`arm`](Self::arm), which the session calls at its first submission.
#[derive(Debug)]
pub struct SessionCoordinator {
    token: CancellationToken,
    deadline: Duration,
    armed: AtomicBool,
    expires_at: OnceLock<Instant>,
    reason: OnceLock<CancelReason>,
}

impl SessionCoordinator {
    pub fn new(shutdown: &CancellationToken, deadline: Duration) -> Arc<Self> {
        Arc::new(Self {
            token: shutdown.child_token(),
            deadline,
            armed: AtomicBool::new(false),
            expires_at: OnceLock::new(),
            reason: OnceLock::new(),
        })
    }

    /// Token observed by the pager, workers and strategies
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Start the deadline timer. Later calls are no-ops.
    pub fn arm(self: &Arc<Self>) {
        if self.armed.swap(true, Ordering::AcqRel) {
            return;
        }

        let expires_at = Instant::now() + self.deadline;
        let _ = self.expires_at.set(expires_at);

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(expires_at) => {
                    if coordinator.cancel(CancelReason::Deadline) {
                        info!("Session deadline of {:?} reached", coordinator.deadline);
                    }
                }
                _ = coordinator.token.cancelled() => {}
            }
        });
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Time left before the deadline fires, `None` until armed
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .get()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Cancel the session. Returns `true` only for the call that cancelled it.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        if self.token.is_cancelled() || self.reason.set(reason).is_err() {
            return false;
        }
        debug!("Cancelling session ({})", reason);
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The recorded reason. A token cancelled through its parent reports `Shutdown`.
    pub fn reason(&self) -> Option<CancelReason> {
        match self.reason.get() {
            Some(reason) => Some(*reason),
            None if self.token.is_cancelled() => Some(CancelReason::Shutdown),
            None => None,
        }
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
