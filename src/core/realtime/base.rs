//! Base traits and types for the upstream live session.
//!
//! This module defines the foundational abstractions for a bidirectional
//! streaming session with the upstream conversational service:
//!
//! - [`LiveConnector`] establishes a session from a [`SessionSetup`]
//! - [`UpstreamSession`] owns the established session and splits into an
//!   outbound [`UpstreamSender`] and an inbound event receiver
//!
//! The two halves are independent so that the relay can run its outbound and
//! inbound pumps concurrently without one blocking the other.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::gemini::{
    ClientContent, ClientEvent, Content, FunctionDeclaration, FunctionResponse, MediaChunk, Part,
    RealtimeInput, ServerMessage, ToolResponse,
};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Everything needed to open one upstream session.
#[derive(Debug, Clone, Default)]
pub struct SessionSetup {
    /// Model name without the `models/` prefix
    pub model: String,
    /// Prebuilt voice for audio output
    pub voice_name: String,
    /// BCP-47 language code for speech output
    pub language_code: String,
    /// System instruction for the assistant
    pub system_instruction: String,
    /// Resumption handle of a previous session, if any
    pub resumption_handle: Option<String>,
    /// Tools the model may call
    pub tools: Vec<FunctionDeclaration>,
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of one relayed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the upstream session to be established
    #[default]
    Connecting,
    /// Both pumps are running
    Active,
    /// One pump ended; tearing down the other and the upstream session
    Closing,
    /// Everything released
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Session Handles
// =============================================================================

/// Outbound half of an upstream session.
///
/// Cheap to clone; every clone feeds the same connection task. Once the
/// connection task has ended every send fails with [`RealtimeError::NotConnected`].
#[derive(Debug, Clone)]
pub struct UpstreamSender {
    tx: mpsc::Sender<ClientEvent>,
}

impl UpstreamSender {
    pub fn new(tx: mpsc::Sender<ClientEvent>) -> Self {
        Self { tx }
    }

    /// Forward one media chunk exactly as received.
    pub async fn send_media(&self, chunk: MediaChunk) -> RealtimeResult<()> {
        self.send(ClientEvent::RealtimeInput(RealtimeInput {
            media_chunks: vec![chunk],
        }))
        .await
    }

    /// Forward free text as a single complete user turn.
    pub async fn send_text(&self, text: &str) -> RealtimeResult<()> {
        self.send(ClientEvent::ClientContent(ClientContent {
            turns: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(text)],
            }],
            turn_complete: true,
        }))
        .await
    }

    /// Answer one or more tool calls.
    pub async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> RealtimeResult<()> {
        self.send(ClientEvent::ToolResponse(ToolResponse {
            function_responses: responses,
        }))
        .await
    }

    async fn send(&self, event: ClientEvent) -> RealtimeResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| RealtimeError::NotConnected)
    }
}

/// One established upstream session.
pub struct UpstreamSession {
    sender: UpstreamSender,
    events: mpsc::Receiver<ServerMessage>,
    task: Option<JoinHandle<()>>,
}

impl UpstreamSession {
    /// Assemble a session from its channel ends.
    ///
    /// `task` is the connection task driving the transport, if there is one;
    /// it is aborted when the session is closed.
    pub fn new(
        tx: mpsc::Sender<ClientEvent>,
        events: mpsc::Receiver<ServerMessage>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            sender: UpstreamSender::new(tx),
            events,
            task,
        }
    }

    /// Split into the outbound sender, the inbound event stream and a guard
    /// that releases the transport when dropped or closed.
    pub fn split(self) -> (UpstreamSender, mpsc::Receiver<ServerMessage>, SessionGuard) {
        (self.sender, self.events, SessionGuard { task: self.task })
    }
}

/// Releases the upstream transport.
pub struct SessionGuard {
    task: Option<JoinHandle<()>>,
}

impl SessionGuard {
    /// Let the connection task wind down on its own, aborting it after
    /// `grace`.
    ///
    /// Every [`UpstreamSender`] clone must be dropped first: the task only
    /// sends its close frame once the outbound channel is closed.
    pub async fn shutdown(mut self, grace: Duration) {
        if let Some(mut task) = self.task.take()
            && tokio::time::timeout(grace, &mut task).await.is_err()
        {
            tracing::debug!("Upstream connection task still running, aborting");
            task.abort();
        }
    }

    /// Stop the connection task immediately. Idempotent.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Establishes upstream sessions.
///
/// The gateway holds one connector for the whole process and calls
/// [`LiveConnector::connect`] once per client connection.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, setup: SessionSetup) -> RealtimeResult<UpstreamSession>;
}
