//! Error type definitions for wikicolor
//!
//! Errors are split by the layer that raises them. `SourceError` belongs to the
//! listing pager, `ResolveError` is the per-item outcome carried inside a
//! [`ColorResult`](crate::models::ColorResult), and `ColorError` is raised by
//! the color strategies. `AppError` sits on top for service construction and
//! the binary.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Listing source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Rejected request parameters
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Socket and file errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised while paging through the upstream listing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Network failure or non-success status from the listing endpoint
    #[error("Transport error: {url} - {message}")]
    Transport { url: String, message: String },

    /// The listing body was not the JSON we expect
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// The session was cancelled before or during a page fetch
    #[error("Pagination cancelled")]
    Cancelled,
}

/// Failure kind recorded against a single submitted URL
///
/// Cloneable so the same outcome can be delivered to the caller and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Network failure fetching the image or the listing page
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed listing JSON or an undecodable image
    #[error("Parse error: {0}")]
    Parse(String),

    /// Deadline or caller cancellation observed before completion
    #[error("Cancelled before completion")]
    Cancelled,

    /// Internal contract violation, fatal to the task only
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Rejected at submission because the work queue was full
    #[error("Work queue full (capacity {capacity})")]
    QueueFull { capacity: usize },
}

/// Errors raised by a color strategy while reducing a pixel grid
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    /// Decoded image has zero width or height
    #[error("Image has no pixels")]
    EmptyImage,

    /// The scan observed cancellation
    #[error("Cancelled during pixel scan")]
    Cancelled,

    /// A strategy produced an index outside the palette
    #[error("Palette index {0} out of range")]
    PaletteIndex(usize),
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl SourceError {
    /// Create a transport error for the given request URL
    pub fn transport<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

impl ResolveError {
    /// Stable machine-readable name for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Parse(_) => "parse",
            Self::Cancelled => "cancelled",
            Self::Invariant(_) => "invariant",
            Self::QueueFull { .. } => "queue_full",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<SourceError> for ResolveError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Transport { .. } => Self::Transport(err.to_string()),
            SourceError::Parse { message } => Self::Parse(message),
            SourceError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<ColorError> for ResolveError {
    fn from(err: ColorError) -> Self {
        match err {
            ColorError::EmptyImage => Self::Parse(err.to_string()),
            ColorError::Cancelled => Self::Cancelled,
            ColorError::PaletteIndex(_) => Self::Invariant(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_maps_to_item_kind() {
        let transport = SourceError::transport("https://example.org/api", "connection reset");
        assert_eq!(ResolveError::from(transport).kind(), "transport");

        let parse = SourceError::parse("expected value at line 1");
        assert_eq!(
            ResolveError::from(parse),
            ResolveError::Parse("expected value at line 1".to_string())
        );

        assert!(ResolveError::from(SourceError::Cancelled).is_cancelled());
    }

    #[test]
    fn test_color_error_maps_to_item_kind() {
        assert_eq!(ResolveError::from(ColorError::EmptyImage).kind(), "parse");
        assert_eq!(ResolveError::from(ColorError::Cancelled).kind(), "cancelled");
        assert_eq!(ResolveError::from(ColorError::PaletteIndex(300)).kind(), "invariant");
    }
}
