pub mod api;
pub mod live;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Assemble every route.
///
/// Cross-cutting layers (CORS, security headers) are added by the binary.
pub fn create_router(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(live::create_live_router())
        .with_state(state)
}
