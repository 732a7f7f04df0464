//! Gemini Live API WebSocket message types.
//!
//! This module defines the client and server messages of the
//! `BidiGenerateContent` streaming protocol. All messages are JSON objects
//! with a single top-level key naming the message kind.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server):
//! - setup - Session configuration, must be the first message
//! - realtimeInput - Streamed media chunks (audio, images)
//! - clientContent - Conversation turns (text)
//! - toolResponse - Results of tool calls
//!
//! Server messages (received from server), several may share one frame:
//! - setupComplete - Session is ready
//! - serverContent - Model output, transcriptions, turn markers
//! - toolCall - The model requests one or more function calls
//! - toolCallCancellation - Previously issued calls are cancelled
//! - usageMetadata - Token accounting
//! - sessionResumptionUpdate - New resumption handle
//! - goAway - The server will disconnect soon

use base64::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Client Messages
// =============================================================================

/// Client messages sent to the Gemini Live API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEvent {
    /// Session configuration
    Setup(Setup),
    /// Streamed media input
    RealtimeInput(RealtimeInput),
    /// Conversation content
    ClientContent(ClientContent),
    /// Tool call results
    ToolResponse(ToolResponse),
}

/// Session setup sent as the first message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model name (`models/...`)
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    pub session_resumption: SessionResumptionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
}

/// Generation parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Response modalities ("AUDIO" or "TEXT")
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
    pub language_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Session resumption request.
///
/// A `None` handle starts a new resumable session.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumptionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

/// Enables transcription in one direction. Carries no options.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AudioTranscriptionConfig {}

/// Tool bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// Function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Streamed media input.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

/// One media chunk, base64 payload passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

/// Conversation content sent by the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

/// Role-tagged list of parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A single content part: text or inline binary data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

/// Inline binary payload, base64 encoded on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

impl Blob {
    /// Decode the base64 payload.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.data)
    }
}

/// Tool call results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Result of one function call, correlated by call id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: serde_json::Value,
}

// =============================================================================
// Server Messages
// =============================================================================

/// One message pushed by the server.
///
/// The fields are independent; a single message may carry several of them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub session_resumption_update: Option<SessionResumptionUpdate>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

/// Model output and turn markers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
    #[serde(default)]
    pub interrupted: Option<bool>,
    #[serde(default)]
    pub generation_complete: Option<bool>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

/// Incremental transcription of one direction's audio.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub finished: bool,
}

/// Function calls requested by the model.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// One requested function call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Token accounting.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u64>,
    #[serde(default)]
    pub response_token_count: Option<u64>,
    #[serde(default)]
    pub total_token_count: Option<u64>,
}

/// New resumption state for the running session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumptionUpdate {
    #[serde(default)]
    pub new_handle: Option<String>,
    #[serde(default)]
    pub resumable: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_realtime_input_serialization() {
        let event = ClientEvent::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: "audio/pcm".to_string(),
                data: "AAEC".to_string(),
            }],
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"realtimeInput": {"mediaChunks": [{"mimeType": "audio/pcm", "data": "AAEC"}]}})
        );
    }

    #[test]
    fn test_tool_response_serialization() {
        let event = ClientEvent::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: Some("call-1".to_string()),
                name: "current_time".to_string(),
                response: json!({"result": "now"}),
            }],
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["toolResponse"]["functionResponses"][0]["id"], "call-1");
        assert_eq!(
            value["toolResponse"]["functionResponses"][0]["response"]["result"],
            "now"
        );
    }

    #[test]
    fn test_setup_omits_absent_handle() {
        let setup = Setup {
            model: "models/test".to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: None,
            },
            system_instruction: None,
            tools: Vec::new(),
            session_resumption: SessionResumptionConfig::default(),
            input_audio_transcription: Some(AudioTranscriptionConfig::default()),
            output_audio_transcription: None,
        };

        let value = serde_json::to_value(ClientEvent::Setup(setup)).unwrap();
        assert_eq!(value["setup"]["sessionResumption"], json!({}));
        assert_eq!(value["setup"]["inputAudioTranscription"], json!({}));
        assert!(value["setup"].get("tools").is_none());
        assert!(value["setup"].get("outputAudioTranscription").is_none());
    }

    #[test]
    fn test_server_content_deserialization() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {"parts": [{"text": "hi"}, {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAEC"}}]},
                "outputTranscription": {"text": "hi"},
                "turnComplete": true
            },
            "usageMetadata": {"totalTokenCount": 42}
        }"#;

        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let content = msg.server_content.unwrap();
        let parts = content.model_turn.unwrap().parts;
        assert_eq!(parts[0].text.as_deref(), Some("hi"));
        assert_eq!(parts[1].inline_data.as_ref().unwrap().decode().unwrap(), vec![0, 1, 2]);
        assert_eq!(content.turn_complete, Some(true));
        assert!(!content.output_transcription.unwrap().finished);
        assert_eq!(msg.usage_metadata.unwrap().total_token_count, Some(42));
    }

    #[test]
    fn test_tool_call_deserialization() {
        let raw = r#"{"toolCall": {"functionCalls": [{"id": "abc", "name": "current_time", "args": {}}]}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let call = &msg.tool_call.unwrap().function_calls[0];
        assert_eq!(call.id.as_deref(), Some("abc"));
        assert_eq!(call.name, "current_time");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = r#"{"setupComplete": {}, "somethingNew": {"x": 1}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(msg.server_content.is_none());
    }
}
