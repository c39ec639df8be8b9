//! Values that flow through the resolution pipeline

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

use crate::color::Color;
use crate::errors::ResolveError;

/// Position of an item within its session, assigned at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome for one submitted image URL, produced exactly once per submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorResult {
    pub url: String,
    pub outcome: Result<Color, ResolveError>,
}

impl ColorResult {
    pub fn success(url: impl Into<String>, color: Color) -> Self {
        Self {
            url: url.into(),
            outcome: Ok(color),
        }
    }

    pub fn failure(url: impl Into<String>, error: ResolveError) -> Self {
        Self {
            url: url.into(),
            outcome: Err(error),
        }
    }

    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::failure(url, ResolveError::Cancelled)
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn color(&self) -> Option<&Color> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ResolveError> {
        self.outcome.as_ref().err()
    }
}

/// Flat wire form: `{url, hex, xterm, error, error_kind}`
#[derive(Serialize)]
struct ColorResultRecord<'a> {
    url: &'a str,
    hex: Option<String>,
    xterm: Option<u8>,
    error: Option<String>,
    error_kind: Option<&'static str>,
}

impl Serialize for ColorResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let record = match &self.outcome {
            Ok(color) => ColorResultRecord {
                url: &self.url,
                hex: Some(color.hex()),
                xterm: Some(color.xterm),
                error: None,
                error_kind: None,
            },
            Err(err) => ColorResultRecord {
                url: &self.url,
                hex: None,
                xterm: None,
                error: Some(err.to_string()),
                error_kind: Some(err.kind()),
            },
        };
        record.serialize(serializer)
    }
}

/// One "resolve N images" request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Upper bound on URLs pulled from the listing
    pub max_images: usize,
    /// Session deadline, measured from the first submission
    pub deadline: Duration,
}

impl ResolveRequest {
    pub fn new(max_images: usize, deadline: Duration) -> Self {
        Self {
            max_images,
            deadline,
        }
    }
}

/// Counters reported when a session's stream finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub submitted: usize,
    /// Real results delivered from workers or the pager
    pub received: usize,
    /// Cancelled results made up for tasks that never reported back
    pub synthesized: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Results served from the color cache
    pub cache_hits: usize,
}

impl SessionSummary {
    pub fn emitted(&self) -> usize {
        self.received + self.synthesized
    }
}
