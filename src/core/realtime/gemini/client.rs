//! Gemini Live API client implementation.
//!
//! This module provides the connector that opens a `BidiGenerateContent`
//! WebSocket session and exposes it as an [`UpstreamSession`].
//!
//! # API Reference
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.<version>.GenerativeService.BidiGenerateContent?key=<key>`
//! - Protocol: WebSocket with JSON messages (the server may use binary frames)
//! - Audio: PCM 16-bit little-endian, base64 encoded; output at 24kHz
//!
//! # Example
//!
//! ```rust,ignore
//! use livegate::core::realtime::{GeminiLive, GeminiLiveConfig, LiveConnector, SessionSetup};
//!
//! let connector = GeminiLive::new(GeminiLiveConfig {
//!     api_key: "...".to_string(),
//!     ..Default::default()
//! });
//! let session = connector.connect(SessionSetup::default()).await?;
//! let (sender, mut events, _guard) = session.split();
//! sender.send_text("Hello").await?;
//! while let Some(message) = events.recv().await {
//!     println!("{message:?}");
//! }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::config::{GeminiLiveConfig, qualified_model};
use super::messages::{
    AudioTranscriptionConfig, ClientEvent, Content, GenerationConfig, Part, PrebuiltVoiceConfig,
    ServerMessage, SessionResumptionConfig, Setup, SpeechConfig, Tool, VoiceConfig,
};
use crate::core::realtime::base::{
    LiveConnector, RealtimeError, RealtimeResult, SessionSetup, UpstreamSession,
};

/// Channel capacity for outbound messages.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for inbound server messages.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

type LiveSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Gemini Live Connector
// =============================================================================

/// Gemini Live API connector.
///
/// Each call to [`LiveConnector::connect`] opens a fresh WebSocket, sends the
/// `setup` message and waits for `setupComplete` before handing the session
/// over. The returned session is driven by a spawned connection task whose
/// reader and writer loops run independently, so a slow consumer of server
/// messages never holds back outbound sends.
#[derive(Debug, Clone)]
pub struct GeminiLive {
    config: GeminiLiveConfig,
}

impl GeminiLive {
    pub fn new(config: GeminiLiveConfig) -> Self {
        Self { config }
    }

    /// Build the `setup` message for a session.
    pub fn build_setup(setup: &SessionSetup) -> Setup {
        let tools = if setup.tools.is_empty() {
            Vec::new()
        } else {
            vec![Tool {
                function_declarations: setup.tools.clone(),
            }]
        };

        Setup {
            model: qualified_model(&setup.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: setup.voice_name.clone(),
                        },
                    },
                    language_code: setup.language_code.clone(),
                }),
            },
            system_instruction: (!setup.system_instruction.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part::text(setup.system_instruction.clone())],
            }),
            tools,
            session_resumption: SessionResumptionConfig {
                handle: setup.resumption_handle.clone(),
            },
            input_audio_transcription: Some(AudioTranscriptionConfig::default()),
            output_audio_transcription: Some(AudioTranscriptionConfig::default()),
        }
    }

    /// Open the socket, send `setup` and wait for `setupComplete`.
    ///
    /// Server messages arriving before `setupComplete` are returned so they
    /// can be delivered ahead of everything else.
    async fn handshake(&self, setup: Setup) -> RealtimeResult<(LiveSocket, Vec<ServerMessage>)> {
        let url = self.config.ws_url()?;

        let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        tracing::info!(model = %setup.model, "Connected to Gemini Live API");

        let json = serde_json::to_string(&ClientEvent::Setup(setup))
            .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;
        ws.send(Message::Text(json.into()))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))?;

        let mut pending = Vec::new();
        while let Some(frame) = ws.next().await {
            let frame = frame.map_err(|e| RealtimeError::WebSocketError(e.to_string()))?;
            if let Message::Close(close) = &frame {
                let reason = close
                    .as_ref()
                    .map(|c| c.reason.as_str().to_string())
                    .unwrap_or_default();
                return Err(RealtimeError::ConnectionFailed(format!(
                    "closed during setup: {reason}"
                )));
            }
            match parse_frame(&frame) {
                Some(Ok(message)) if message.setup_complete.is_some() => {
                    tracing::debug!("Gemini Live setup complete");
                    return Ok((ws, pending));
                }
                Some(Ok(message)) => pending.push(message),
                Some(Err(e)) => tracing::warn!("Failed to parse server message during setup: {}", e),
                None => {}
            }
        }

        Err(RealtimeError::ConnectionFailed(
            "stream ended before setup completed".to_string(),
        ))
    }
}

#[async_trait]
impl LiveConnector for GeminiLive {
    async fn connect(&self, setup: SessionSetup) -> RealtimeResult<UpstreamSession> {
        if self.config.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let setup = Self::build_setup(&setup);
        let (ws, pending) = tokio::time::timeout(self.config.connect_timeout, self.handshake(setup))
            .await
            .map_err(|_| {
                RealtimeError::Timeout(format!(
                    "setup not completed within {}s",
                    self.config.connect_timeout.as_secs()
                ))
            })??;

        let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<ServerMessage>(EVENT_CHANNEL_CAPACITY);

        for message in pending {
            if events_tx.try_send(message).is_err() {
                tracing::warn!("Dropping server message received before setup completed");
            }
        }

        let handle = tokio::spawn(run_connection(ws, rx, events_tx));
        Ok(UpstreamSession::new(tx, events_rx, Some(handle)))
    }
}

/// Drive one established socket until either direction ends.
async fn run_connection(
    ws: LiveSocket,
    mut outgoing: mpsc::Receiver<ClientEvent>,
    events: mpsc::Sender<ServerMessage>,
) {
    let (mut sink, mut stream) = ws.split();

    let write_loop = async move {
        while let Some(event) = outgoing.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                    continue;
                }
            };

            if let Err(e) = sink.send(Message::Text(json.into())).await {
                tracing::error!("Failed to send WebSocket message: {}", e);
                return;
            }
        }
        tracing::debug!("Upstream sender released, closing Gemini Live socket");
        let _ = sink.send(Message::Close(None)).await;
    };

    let read_loop = async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(close)) => {
                    tracing::info!(?close, "Gemini Live socket closed by server");
                    return;
                }
                Ok(frame) => match parse_frame(&frame) {
                    Some(Ok(message)) => {
                        if events.send(message).await.is_err() {
                            tracing::debug!("Event receiver dropped, stopping reader");
                            return;
                        }
                    }
                    Some(Err(e)) => tracing::warn!("Failed to parse server message: {}", e),
                    None => {}
                },
                Err(e) => {
                    tracing::error!("Gemini Live WebSocket error: {}", e);
                    return;
                }
            }
        }
    };

    tokio::select! {
        _ = write_loop => {}
        _ = read_loop => {}
    }
    tracing::debug!("Gemini Live connection task finished");
}

/// Decode a data frame; control frames yield `None`.
fn parse_frame(frame: &Message) -> Option<Result<ServerMessage, serde_json::Error>> {
    match frame {
        Message::Text(text) => Some(serde_json::from_str(text.as_str())),
        Message::Binary(data) => Some(serde_json::from_slice(data)),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
