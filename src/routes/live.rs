//! Live WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::live::live_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the live WebSocket router
///
/// # Endpoints
///
/// `GET /` and `GET /live` - WebSocket upgrade for the relayed session
///
/// # Protocol
///
/// The first client message is read and ignored. After that clients send
/// `realtime_input`, `text` or `memory` envelopes and receive `text`,
/// `audio`, `transcription`, UI events and rendered images.
///
/// # Example
///
/// ```json
/// // Client sends
/// {"text": "bar chart: 1, 2, 3"}
///
/// // Server responds
/// {"barchart": "iVBORw0KGgo..."}
/// ```
pub fn create_live_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(live_handler))
        .route("/live", get(live_handler))
        .layer(TraceLayer::new_for_http())
}
