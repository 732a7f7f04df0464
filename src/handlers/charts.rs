//! Stateless chart rendering API
//!
//! - `POST /barchart`, `POST /linechart`, `POST /piechart` with `{"numbers": [..]}`
//! - `POST /wordcloud` with `{"text": ".."}`
//!
//! Each returns `{"image": <base64 PNG>}` rendered by the same renderer the
//! live sessions use.

use axum::{extract::State, response::Json};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::tools::{ChartKind, RenderResult};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NumbersRequest {
    #[serde(default)]
    pub numbers: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    /// Base64 encoded PNG
    pub image: String,
}

pub async fn bar_chart(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NumbersRequest>,
) -> AppResult<Json<ImageResponse>> {
    render_chart(&state, ChartKind::Bar, request.numbers).await
}

pub async fn line_chart(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NumbersRequest>,
) -> AppResult<Json<ImageResponse>> {
    render_chart(&state, ChartKind::Line, request.numbers).await
}

pub async fn pie_chart(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NumbersRequest>,
) -> AppResult<Json<ImageResponse>> {
    render_chart(&state, ChartKind::Pie, request.numbers).await
}

pub async fn word_cloud(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextRequest>,
) -> AppResult<Json<ImageResponse>> {
    if request.text.trim().is_empty() {
        return Err(AppError::BadRequest("No text provided".to_string()));
    }
    let renderer = Arc::clone(state.tools.renderer());
    encode(move || renderer.render_word_cloud(&request.text)).await
}

async fn render_chart(
    state: &AppState,
    kind: ChartKind,
    numbers: Vec<f64>,
) -> AppResult<Json<ImageResponse>> {
    if numbers.is_empty() {
        return Err(AppError::BadRequest("No numbers provided".to_string()));
    }
    tracing::debug!(chart = %kind, points = numbers.len(), "Rendering chart");
    let renderer = Arc::clone(state.tools.renderer());
    encode(move || renderer.render_chart(kind, &numbers)).await
}

/// Run `render` on the blocking pool and wrap the PNG for the response.
async fn encode<F>(render: F) -> AppResult<Json<ImageResponse>>
where
    F: FnOnce() -> RenderResult<Vec<u8>> + Send + 'static,
{
    let png = tokio::task::spawn_blocking(render)
        .await
        .map_err(|e| AppError::Internal(format!("render task failed: {e}")))??;
    Ok(Json(ImageResponse {
        image: BASE64.encode(png),
    }))
}
