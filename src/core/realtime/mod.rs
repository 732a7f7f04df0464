//! Upstream realtime session abstractions.
//!
//! # Supported Providers
//!
//! - **Gemini Live** - Bidirectional audio/text streaming with tool calls
//!   and session resumption
//!
//! # Architecture
//!
//! [`LiveConnector`] opens an [`UpstreamSession`]; the session splits into an
//! [`UpstreamSender`] for the outbound direction and an event receiver for
//! the inbound direction, plus a [`SessionGuard`] that releases the transport.

mod base;
pub mod gemini;

pub use base::{
    LiveConnector, RealtimeError, RealtimeResult, SessionGuard, SessionSetup, SessionState,
    UpstreamSender, UpstreamSession,
};
pub use gemini::{GeminiLive, GeminiLiveConfig};
