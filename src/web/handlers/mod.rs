//! HTTP request handlers

pub mod colors;
pub mod health;
