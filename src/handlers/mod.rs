//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `charts` - Stateless chart and word cloud rendering
//! - `live` - Live voice/text WebSocket relayed to the upstream session

pub mod api;
pub mod charts;
pub mod live;

pub use live::live_handler;
