//! Live WebSocket message types
//!
//! Client envelopes are untagged JSON objects recognised by their single
//! top-level key (`realtime_input`, `text` or `memory`). Replies use the same
//! convention: `{"text": ...}`, `{"audio": ...}`, `{"barchart": ...}` and so on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::realtime::gemini::MediaChunk;
use crate::core::tools::{ChartKind, ToolResult};
use crate::store::{MemoryRecord, MemoryReply};

/// Value sent with `{"interrupted": ...}`.
pub const INTERRUPTED_FLAG: &str = "True";

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming WebSocket messages from the client
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LiveIncomingMessage {
    /// Audio or image chunks forwarded upstream untouched
    RealtimeInput { realtime_input: RealtimeInput },

    /// Free text, checked against the local intents first
    Text { text: String },

    /// Memory command, always handled locally
    Memory {
        memory: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        value: Option<Value>,
    },
}

#[derive(Debug, Deserialize)]
pub struct RealtimeInput {
    #[serde(default)]
    pub media_chunks: Vec<ClientMediaChunk>,
}

/// A media chunk as the client sends it (snake_case keys).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl ClientMediaChunk {
    /// Only PCM audio and images are accepted by the upstream session.
    pub fn is_forwardable(&self) -> bool {
        self.mime_type == "audio/pcm" || self.mime_type.starts_with("image/")
    }
}

impl From<ClientMediaChunk> for MediaChunk {
    fn from(chunk: ClientMediaChunk) -> Self {
        MediaChunk {
            mime_type: chunk.mime_type,
            data: chunk.data,
        }
    }
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Who produced a transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sender {
    User,
    Gemini,
}

/// Body of `{"memory_status": ...}`: a short label or the full record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MemoryStatus {
    Label(String),
    Record(MemoryRecord),
}

/// Outgoing WebSocket messages to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveOutgoingMessage {
    /// Assistant or tool text
    Text(String),

    /// Base64 PCM audio from the model
    Audio(String),

    /// Transcription delta for either side of the conversation
    Transcription {
        text: String,
        sender: Sender,
        finished: bool,
    },

    /// The model was interrupted by the user
    Interrupted(&'static str),

    /// Carousel navigation (`next` or `prev`)
    Carousel(&'static str),

    /// Device button toggle
    Button { name: String, state: &'static str },

    Wordcloud(String),
    Barchart(String),
    Linechart(String),
    Piechart(String),

    MemoryStatus(MemoryStatus),

    /// Stored preference, `null` when absent
    MemoryValue(Option<Value>),
}

impl LiveOutgoingMessage {
    pub fn interrupted() -> Self {
        Self::Interrupted(INTERRUPTED_FLAG)
    }

    /// The synthetic marker sent when the model finishes a turn.
    pub fn turn_finished() -> Self {
        Self::Transcription {
            text: String::new(),
            sender: Sender::Gemini,
            finished: true,
        }
    }
}

impl From<ToolResult> for LiveOutgoingMessage {
    fn from(result: ToolResult) -> Self {
        match result {
            ToolResult::Text(text) => Self::Text(text),
            ToolResult::Carousel(direction) => Self::Carousel(direction.as_str()),
            ToolResult::Button { name, state } => Self::Button {
                name,
                state: state.as_str(),
            },
            ToolResult::WordCloud(image) => Self::Wordcloud(image),
            ToolResult::Chart { kind, image } => match kind {
                ChartKind::Bar => Self::Barchart(image),
                ChartKind::Line => Self::Linechart(image),
                ChartKind::Pie => Self::Piechart(image),
            },
        }
    }
}

impl LiveOutgoingMessage {
    /// Convert a memory command outcome; `None` means nothing is sent.
    pub fn from_memory_reply(reply: MemoryReply) -> Option<Self> {
        match reply {
            MemoryReply::Status(label) => Some(Self::MemoryStatus(MemoryStatus::Label(label))),
            MemoryReply::Record(record) => Some(Self::MemoryStatus(MemoryStatus::Record(record))),
            MemoryReply::Value(value) => Some(Self::MemoryValue(value)),
            MemoryReply::Silent => None,
        }
    }
}

// =============================================================================
// Message Routing
// =============================================================================

/// Close code and reason sent before the socket is shut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

/// Work items for the per-connection writer task
#[derive(Debug)]
pub enum LiveMessageRoute {
    /// JSON text message
    Outgoing(LiveOutgoingMessage),
    /// Close connection, optionally with a close frame
    Close(Option<CloseReason>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intent::{CarouselDirection, DeviceState};
    use serde_json::json;

    fn to_json(msg: &LiveOutgoingMessage) -> Value {
        serde_json::to_value(msg).unwrap()
    }

    #[test]
    fn test_incoming_text() {
        let msg: LiveIncomingMessage = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert!(matches!(msg, LiveIncomingMessage::Text { text } if text == "hello"));
    }

    #[test]
    fn test_incoming_realtime_input() {
        let msg: LiveIncomingMessage = serde_json::from_str(
            r#"{"realtime_input": {"media_chunks": [{"mime_type": "audio/pcm", "data": "AAA="}]}}"#,
        )
        .unwrap();
        match msg {
            LiveIncomingMessage::RealtimeInput { realtime_input } => {
                assert_eq!(realtime_input.media_chunks.len(), 1);
                assert!(realtime_input.media_chunks[0].is_forwardable());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_incoming_memory() {
        let msg: LiveIncomingMessage = serde_json::from_str(
            r#"{"memory": "set_preference", "key": "color", "value": {"hue": 1}}"#,
        )
        .unwrap();
        match msg {
            LiveIncomingMessage::Memory { memory, key, value } => {
                assert_eq!(memory, "set_preference");
                assert_eq!(key.as_deref(), Some("color"));
                assert_eq!(value, Some(json!({"hue": 1})));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_incoming_unknown_shape_rejected() {
        assert!(serde_json::from_str::<LiveIncomingMessage>(r#"{"foo": 1}"#).is_err());
        assert!(serde_json::from_str::<LiveIncomingMessage>("not json").is_err());
    }

    #[test]
    fn test_media_mime_filter() {
        let chunk = |mime: &str| ClientMediaChunk {
            mime_type: mime.to_string(),
            data: String::new(),
        };
        assert!(chunk("image/jpeg").is_forwardable());
        assert!(!chunk("video/mp4").is_forwardable());
        assert!(!chunk("audio/wav").is_forwardable());
    }

    #[test]
    fn test_outgoing_shapes() {
        assert_eq!(
            to_json(&LiveOutgoingMessage::Text("hi".into())),
            json!({"text": "hi"})
        );
        assert_eq!(
            to_json(&LiveOutgoingMessage::interrupted()),
            json!({"interrupted": "True"})
        );
        assert_eq!(
            to_json(&LiveOutgoingMessage::turn_finished()),
            json!({"transcription": {"text": "", "sender": "Gemini", "finished": true}})
        );
        assert_eq!(
            to_json(&LiveOutgoingMessage::MemoryValue(None)),
            json!({"memory_value": null})
        );
        assert_eq!(
            to_json(&LiveOutgoingMessage::Barchart("png".into())),
            json!({"barchart": "png"})
        );
    }

    #[test]
    fn test_tool_results_convert() {
        let msg: LiveOutgoingMessage = ToolResult::Carousel(CarouselDirection::Prev).into();
        assert_eq!(to_json(&msg), json!({"carousel": "prev"}));

        let msg: LiveOutgoingMessage = ToolResult::Button {
            name: "Light 1".into(),
            state: DeviceState::On,
        }
        .into();
        assert_eq!(
            to_json(&msg),
            json!({"button": {"name": "Light 1", "state": "on"}})
        );

        let msg: LiveOutgoingMessage = ToolResult::Chart {
            kind: ChartKind::Pie,
            image: "abc".into(),
        }
        .into();
        assert_eq!(to_json(&msg), json!({"piechart": "abc"}));
    }

    #[test]
    fn test_memory_replies_convert() {
        let status =
            LiveOutgoingMessage::from_memory_reply(MemoryReply::Status("cleared".into())).unwrap();
        assert_eq!(to_json(&status), json!({"memory_status": "cleared"}));

        let record = LiveOutgoingMessage::from_memory_reply(MemoryReply::Record(
            MemoryRecord::default(),
        ))
        .unwrap();
        assert_eq!(
            to_json(&record),
            json!({"memory_status": {"enabled": false, "preferences": {}, "context": {}, "knowledge": {}}})
        );

        assert!(LiveOutgoingMessage::from_memory_reply(MemoryReply::Silent).is_none());
    }
}
