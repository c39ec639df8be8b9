//! Color streaming and cache listing handlers

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::errors::AppError;
use crate::models::ColorResult;
use crate::web::{AppState, responses::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct ColorsQuery {
    /// Number of images to resolve, clamped to the configured cap
    pub max: Option<usize>,
    /// Session deadline as a human-readable duration, e.g. `20s`
    pub deadline: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CachedQuery {
    pub max: Option<usize>,
}

fn parse_deadline(raw: Option<&str>) -> Result<Option<Duration>, AppError> {
    raw.map(|value| {
        humantime::parse_duration(value)
            .map_err(|e| AppError::validation(format!("invalid deadline '{value}': {e}")))
    })
    .transpose()
}

/// Stream results as newline-delimited JSON while the session runs.
///
/// Closing the connection drops the stream, which cancels the session.
pub async fn stream_colors(
    State(state): State<AppState>,
    Query(query): Query<ColorsQuery>,
) -> Result<Response, ApiError> {
    let deadline = parse_deadline(query.deadline.as_deref())?;
    let request = state.service.request(query.max, deadline);
    debug!(
        "Opening color stream for {} images (deadline {:?})",
        request.max_images, request.deadline
    );

    let lines = state.service.resolve(request).map(|result| {
        let mut line = serde_json::to_vec(&result)?;
        line.push(b'\n');
        Ok::<_, serde_json::Error>(Bytes::from(line))
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}

/// Most recently cached colors, newest first, without touching the network
pub async fn cached_colors(
    State(state): State<AppState>,
    Query(query): Query<CachedQuery>,
) -> Json<Vec<ColorResult>> {
    let limit = state.service.config().session.clamp_max_images(query.max);
    Json(state.service.cache().snapshot(limit).await)
}
