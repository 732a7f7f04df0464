use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, charts};
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router: health check and chart rendering
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(api::health_check))
        .route("/barchart", post(charts::bar_chart))
        .route("/linechart", post(charts::line_chart))
        .route("/piechart", post(charts::pie_chart))
        .route("/wordcloud", post(charts::word_cloud))
        .layer(TraceLayer::new_for_http())
}
