//! Centralized error handling for wikicolor
//!
//! # Error Categories
//!
//! - **Source Errors**: listing pagination transport and parsing failures
//! - **Resolve Errors**: per-image outcomes that travel inside results
//! - **Color Errors**: failures inside a color strategy's pixel scan
//! - **App Errors**: configuration and service wiring
//!
//! # Usage
//!
//! ```rust
//! use wikicolor::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for listing source Results
pub type SourceResult<T> = Result<T, SourceError>;
