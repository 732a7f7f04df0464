//! Translation of upstream events into client messages and side effects.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use super::messages::{LiveOutgoingMessage, Sender};
use crate::core::realtime::gemini::{FunctionResponse, ServerMessage, ToolCall};
use crate::core::tools::LocalToolExecutor;

/// What the relay must do for one upstream event, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamAction {
    /// Send to the client
    Client(LiveOutgoingMessage),
    /// Answer a tool call upstream
    ToolResponse(Vec<FunctionResponse>),
    /// Replace the stored resumption handle
    PersistHandle(String),
}

/// Translate one upstream event.
///
/// A tool call is answered and nothing else from the event is used. An
/// interruption is reported and suppresses the rest of the event's content.
/// Otherwise resumption updates, transcriptions, model parts and the
/// turn-complete marker are handled in that order.
pub fn translate(message: &ServerMessage, tools: &LocalToolExecutor) -> Vec<UpstreamAction> {
    if let Some(call) = &message.tool_call {
        return vec![UpstreamAction::ToolResponse(answer_tool_call(call, tools))];
    }

    let mut actions = Vec::new();

    if let Some(content) = &message.server_content
        && content.interrupted.is_some()
    {
        actions.push(UpstreamAction::Client(LiveOutgoingMessage::interrupted()));
        return actions;
    }

    if let Some(usage) = &message.usage_metadata {
        tracing::debug!(
            prompt_tokens = ?usage.prompt_token_count,
            response_tokens = ?usage.response_token_count,
            total_tokens = ?usage.total_token_count,
            "Upstream usage"
        );
    }

    if let Some(update) = &message.session_resumption_update
        && update.resumable.unwrap_or(false)
        && let Some(handle) = update.new_handle.as_ref().filter(|h| !h.is_empty())
    {
        actions.push(UpstreamAction::PersistHandle(handle.clone()));
    }

    if let Some(cancel) = &message.tool_call_cancellation {
        tracing::info!(ids = ?cancel.ids, "Upstream cancelled tool calls");
    }

    if let Some(go_away) = &message.go_away {
        tracing::warn!(time_left = ?go_away.time_left, "Upstream is closing the session soon");
    }

    let Some(content) = &message.server_content else {
        return actions;
    };

    if let Some(output) = &content.output_transcription {
        actions.push(UpstreamAction::Client(LiveOutgoingMessage::Transcription {
            text: output.text.clone(),
            sender: Sender::Gemini,
            finished: output.finished,
        }));
    }

    if let Some(input) = &content.input_transcription {
        actions.push(UpstreamAction::Client(LiveOutgoingMessage::Transcription {
            text: input.text.clone(),
            sender: Sender::User,
            finished: input.finished,
        }));
    }

    if let Some(turn) = &content.model_turn {
        for part in &turn.parts {
            if let Some(text) = &part.text {
                actions.push(UpstreamAction::Client(LiveOutgoingMessage::Text(
                    text.clone(),
                )));
            } else if let Some(blob) = &part.inline_data {
                match blob.decode() {
                    Ok(bytes) if !bytes.is_empty() => {
                        actions.push(UpstreamAction::Client(LiveOutgoingMessage::Audio(
                            BASE64.encode(bytes),
                        )));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Dropping undecodable inline data: {}", e);
                    }
                }
            }
        }
    }

    if content.turn_complete.unwrap_or(false) {
        actions.push(UpstreamAction::Client(LiveOutgoingMessage::turn_finished()));
    }

    actions
}

fn answer_tool_call(call: &ToolCall, tools: &LocalToolExecutor) -> Vec<FunctionResponse> {
    call.function_calls
        .iter()
        .map(|fc| {
            tracing::info!(tool = %fc.name, "Upstream tool call");
            let args = fc.args.clone().unwrap_or(Value::Null);
            FunctionResponse {
                id: fc.id.clone(),
                name: fc.name.clone(),
                response: tools.call_tool(&fc.name, &args),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::WeatherConfig;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn tools() -> LocalToolExecutor {
        LocalToolExecutor::new(WeatherConfig::default(), MemoryStore::in_memory())
    }

    fn parse(value: Value) -> ServerMessage {
        serde_json::from_value(value).unwrap()
    }

    fn client(action: &UpstreamAction) -> &LiveOutgoingMessage {
        match action {
            UpstreamAction::Client(msg) => msg,
            other => panic!("expected client message, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_call_answered_and_nothing_else() {
        let msg = parse(json!({
            "toolCall": {"functionCalls": [
                {"id": "call-1", "name": "current_time", "args": {}},
                {"id": "call-2", "name": "launch_rockets"}
            ]},
            "serverContent": {"turnComplete": true}
        }));

        let actions = translate(&msg, &tools());
        assert_eq!(actions.len(), 1);
        let UpstreamAction::ToolResponse(responses) = &actions[0] else {
            panic!("expected tool response");
        };
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id.as_deref(), Some("call-1"));
        assert!(responses[0].response["result"].is_string());
        assert_eq!(
            responses[1].response,
            json!({"error": "unknown tool: launch_rockets"})
        );
    }

    #[test]
    fn test_interruption_suppresses_payload() {
        let msg = parse(json!({
            "serverContent": {
                "interrupted": true,
                "modelTurn": {"parts": [{"text": "ignored"}]},
                "turnComplete": true
            }
        }));
        let actions = translate(&msg, &tools());
        assert_eq!(actions.len(), 1);
        assert_eq!(client(&actions[0]), &LiveOutgoingMessage::interrupted());
    }

    #[test]
    fn test_resumption_update_requires_resumable_handle() {
        let persisted = parse(json!({
            "sessionResumptionUpdate": {"newHandle": "h-1", "resumable": true}
        }));
        assert_eq!(
            translate(&persisted, &tools()),
            vec![UpstreamAction::PersistHandle("h-1".into())]
        );

        let not_resumable = parse(json!({
            "sessionResumptionUpdate": {"newHandle": "h-2", "resumable": false}
        }));
        assert!(translate(&not_resumable, &tools()).is_empty());

        let no_handle = parse(json!({"sessionResumptionUpdate": {"resumable": true}}));
        assert!(translate(&no_handle, &tools()).is_empty());
    }

    #[test]
    fn test_content_order() {
        let msg = parse(json!({
            "serverContent": {
                "inputTranscription": {"text": "what time"},
                "outputTranscription": {"text": "It is", "finished": false},
                "modelTurn": {"parts": [
                    {"text": "Hello"},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQID"}}
                ]},
                "turnComplete": true
            }
        }));

        let actions = translate(&msg, &tools());
        let messages: Vec<_> = actions.iter().map(client).cloned().collect();
        assert_eq!(
            messages,
            vec![
                LiveOutgoingMessage::Transcription {
                    text: "It is".into(),
                    sender: Sender::Gemini,
                    finished: false,
                },
                LiveOutgoingMessage::Transcription {
                    text: "what time".into(),
                    sender: Sender::User,
                    finished: false,
                },
                LiveOutgoingMessage::Text("Hello".into()),
                LiveOutgoingMessage::Audio("AQID".into()),
                LiveOutgoingMessage::turn_finished(),
            ]
        );
    }

    #[test]
    fn test_bad_inline_data_dropped() {
        let msg = parse(json!({
            "serverContent": {"modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm", "data": "!!not base64!!"}}
            ]}}
        }));
        assert!(translate(&msg, &tools()).is_empty());
    }

    #[test]
    fn test_usage_only_has_no_effect() {
        let msg = parse(json!({"usageMetadata": {"totalTokenCount": 42}}));
        assert!(translate(&msg, &tools()).is_empty());
    }
}
