//! Resolution pipeline
//!
//! A session pulls URLs from the pager, hands them to the shared
//! [`WorkerPool`] and aggregates replies into a [`ColorStream`]. Every session
//! runs under its own [`SessionCoordinator`], which carries the deadline and
//! the cancellation signal.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub mod coordinator;
pub mod session;
pub mod worker_pool;

pub use coordinator::{CancelReason, SessionCoordinator};
pub use session::{ColorStream, SessionSettings, open_session};
pub use worker_pool::{PoolStats, WorkItem, WorkerPool, WorkerReply};

/// What a submitter does when the work queue is full
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubmitMode {
    /// Wait for space, giving up if the session is cancelled
    #[default]
    Block,
    /// Fail the item immediately with a queue-full error
    Reject,
}
