//! wikicolor library
//!
//! Pages through the most recent Wikimedia Commons uploads, fetches each image
//! under bounded concurrency and reduces it to one xterm-256 color. Results are
//! memoized in a bounded cache and delivered per session as a stream.

pub mod color;
pub mod config;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod sources;
pub mod utils;
pub mod web;
