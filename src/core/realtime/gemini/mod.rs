//! Gemini Live API module.
//!
//! This module provides the upstream streaming session using Google's
//! Gemini Live (`BidiGenerateContent`) API.
//!
//! # Features
//!
//! - Bidirectional audio and image streaming
//! - Text turns
//! - Input and output transcription
//! - Function calling
//! - Session resumption handles
//!
//! # Audio Format
//!
//! Input audio is PCM 16-bit little-endian (`audio/pcm`); output audio is
//! PCM 16-bit at 24kHz.

mod client;
mod config;
mod messages;

pub use client::GeminiLive;
pub use config::{
    CURRENT_TIME_TOOL, GEMINI_LIVE_API_VERSION, GEMINI_LIVE_BASE_URL, GEMINI_LIVE_MODEL,
    GeminiLiveConfig, default_tools, qualified_model,
};
pub use messages::{
    AudioTranscriptionConfig, Blob, ClientContent, ClientEvent, Content, FunctionCall,
    FunctionDeclaration, FunctionResponse, GenerationConfig, GoAway, MediaChunk, Part,
    RealtimeInput, ServerContent, ServerMessage, SessionResumptionUpdate, Setup, ToolCall,
    ToolCallCancellation, ToolResponse, Transcription, UsageMetadata,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_defaults() {
        assert_eq!(GEMINI_LIVE_BASE_URL, "wss://generativelanguage.googleapis.com");
        assert_eq!(GEMINI_LIVE_API_VERSION, "v1alpha");
        assert_eq!(GEMINI_LIVE_MODEL, "gemini-2.0-flash-live-001");
    }
}
