//! Message shapes exchanged with the remote inference service.
//!
//! The wire format belongs to the service's SDK; these types only mirror the
//! fields the session reads or writes. Unknown fields are ignored on input.
//!
//! | Direction | Message | Carries |
//! |---|---|---|
//! | Client → Server | `setup` | model, voice, tool declarations |
//! | Client → Server | `realtimeInput` | one `media` blob (PCM16 or JPEG) |
//! | Client → Server | `toolResponse` | `functionResponses[]` |
//! | Server → Client | `setupComplete` | handshake acknowledgement |
//! | Server → Client | `serverContent` | transcript, audio parts, interrupted, turnComplete |
//! | Server → Client | `toolCall` | `functionCalls[]` |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use glair_media::MediaBlob;

use crate::event::{AudioChunk, InboundEvent};

// ── Outbound ───────────────────────────────────────────────────────

/// A message sent to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message of a connection.
    Setup(SetupRequest),

    /// A captured microphone block or camera snapshot.
    RealtimeInput { media: MediaBlob },

    /// Answers to a `toolCall`.
    ToolResponse {
        #[serde(rename = "functionResponses")]
        function_responses: Vec<FunctionResponse>,
    },
}

impl ClientMessage {
    /// Short label for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::RealtimeInput { .. } => "realtimeInput",
            Self::ToolResponse { .. } => "toolResponse",
        }
    }
}

/// Session configuration sent at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    pub model: String,
    pub response_modalities: Vec<String>,
    pub voice_name: String,
    /// Ask the service to stream a transcript of its spoken output.
    pub output_audio_transcription: bool,
    pub tools: Vec<FunctionDeclaration>,
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    pub behavior: Behavior,
}

/// Whether the model waits for a tool result before continuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Behavior {
    Blocking,
    NonBlocking,
}

/// One answer to a function call, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub id: Option<String>,
    pub name: String,
    pub response: ToolResult,
}

/// The body of a [`FunctionResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<Scheduling>,
}

/// How a non-blocking tool result is folded into the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scheduling {
    /// Interrupt the current turn and speak about the result now.
    Interrupt,
    /// Mention the result once the model is idle.
    WhenIdle,
    /// Absorb the result without speaking.
    Silent,
}

// ── Inbound ────────────────────────────────────────────────────────

/// A message received from the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Option<Value>,
}

impl ServerMessage {
    /// Parse one JSON message.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Flatten the message into inbound events, in processing order:
    /// handshake, transcript, audio, interruption, tool calls, turn end.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(InboundEvent::Opened);
        }

        if let Some(content) = self.server_content {
            if let Some(text) = content
                .output_transcription
                .and_then(|t| t.text)
                .filter(|t| !t.is_empty())
            {
                events.push(InboundEvent::Transcript(text));
            }

            let parts = content.model_turn.map(|turn| turn.parts).unwrap_or_default();
            for blob in parts.into_iter().filter_map(|p| p.inline_data) {
                if blob.is_pcm() {
                    events.push(InboundEvent::AudioChunk(AudioChunk::from(blob)));
                } else {
                    tracing::debug!(mime = %blob.mime_type, "Ignoring non-audio inline data");
                }
            }

            if content.interrupted {
                events.push(InboundEvent::Interrupted);
            }
            if content.turn_complete {
                events.push(InboundEvent::TurnComplete);
            }
        }

        if let Some(call) = self.tool_call {
            if !call.function_calls.is_empty() {
                // Keep turn completion last.
                let at = events
                    .iter()
                    .position(|e| matches!(e, InboundEvent::TurnComplete))
                    .unwrap_or(events.len());
                events.insert(at, InboundEvent::ToolCallRequested(call.function_calls));
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn realtime_input_serializes_media_field() {
        let msg = ClientMessage::RealtimeInput {
            media: MediaBlob::jpeg(&[1, 2, 3]),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({ "realtimeInput": { "media": { "data": "AQID", "mimeType": "image/jpeg" } } })
        );
    }

    #[test]
    fn tool_response_serializes_scheduling() {
        let msg = ClientMessage::ToolResponse {
            function_responses: vec![FunctionResponse {
                id: Some("call-1".into()),
                name: "get_weather_vegas".into(),
                response: ToolResult {
                    result: json!({ "weather": "Sunny" }),
                    scheduling: Some(Scheduling::Interrupt),
                },
            }],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value["toolResponse"]["functionResponses"][0]["response"]["scheduling"],
            "INTERRUPT"
        );
        assert_eq!(value["toolResponse"]["functionResponses"][0]["id"], "call-1");
    }

    #[test]
    fn server_content_flattens_in_order() {
        let raw = json!({
            "serverContent": {
                "outputTranscription": { "text": "Hello" },
                "modelTurn": { "parts": [
                    { "inlineData": { "data": "AAAA", "mimeType": "audio/pcm;rate=24000" } },
                    { "text": "ignored" }
                ] },
                "turnComplete": true
            },
            "toolCall": { "functionCalls": [ { "id": "a", "name": "get_weather_vegas" } ] }
        })
        .to_string();

        let events = ServerMessage::from_json(&raw).unwrap().into_events();
        assert!(matches!(events[0], InboundEvent::Transcript(ref t) if t == "Hello"));
        assert!(matches!(events[1], InboundEvent::AudioChunk(_)));
        assert!(matches!(events[2], InboundEvent::ToolCallRequested(ref calls) if calls.len() == 1));
        assert!(matches!(events[3], InboundEvent::TurnComplete));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn interruption_and_setup_complete() {
        let events = ServerMessage::from_json(r#"{"setupComplete":{}}"#)
            .unwrap()
            .into_events();
        assert!(matches!(events.as_slice(), [InboundEvent::Opened]));

        let events = ServerMessage::from_json(r#"{"serverContent":{"interrupted":true}}"#)
            .unwrap()
            .into_events();
        assert!(matches!(events.as_slice(), [InboundEvent::Interrupted]));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let msg = ServerMessage::from_json(r#"{"usageMetadata":{"totalTokenCount":3}}"#).unwrap();
        assert!(msg.into_events().is_empty());
    }
}
