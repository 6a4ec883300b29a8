// JSON message shapes shared by the server handlers and the play client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Player id used when a request does not name one.
pub const DEFAULT_PLAYER_ID: &str = "default_player";

/// Endpoint name that marks the start of a new game.
pub const START_GAME: &str = "/start_game";
pub const PLAYER_ACTION: &str = "/player_action";

/// A narration request, over HTTP or as the single WebSocket message.
///
/// Either `text` carries the prompt directly, or `endpoint` and `payload`
/// describe a structured game action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

impl AiRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn action(endpoint: &str, payload: Value, player_id: Option<String>) -> Self {
        Self {
            text: None,
            endpoint: Some(endpoint.to_string()),
            payload: Some(payload),
            player_id,
        }
    }

    /// The prompt handed to the model, or `None` if the request is empty.
    ///
    /// Structured actions are flattened to `endpoint|payload-json`.
    pub fn prompt(&self) -> Option<String> {
        if let Some(text) = self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Some(text.to_string());
        }
        match (&self.endpoint, &self.payload) {
            (Some(endpoint), Some(payload)) => Some(format!("{endpoint}|{payload}")),
            (Some(endpoint), None) => Some(endpoint.clone()),
            (None, Some(payload)) => Some(payload.to_string()),
            (None, None) => None,
        }
    }

    pub fn player_id(&self) -> &str {
        player_id_or_default(self.player_id.as_deref())
    }

    pub fn is_game_start(&self) -> bool {
        self.endpoint.as_deref() == Some(START_GAME)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiReply {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearMemoryRequest {
    #[serde(default)]
    pub player_id: Option<String>,
}

impl ClearMemoryRequest {
    pub fn player_id(&self) -> &str {
        player_id_or_default(self.player_id.as_deref())
    }
}

/// Blank or missing ids share the default conversation.
pub fn player_id_or_default(id: Option<&str>) -> &str {
    id.map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_PLAYER_ID)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearMemoryReply {
    pub message: String,
    pub memory_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEvent {
    End,
}

/// One server-to-client frame on the streaming socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamFrame {
    Chunk { text: String },
    Event { event: StreamEvent },
    Error { error: String },
}

impl StreamFrame {
    pub fn chunk(text: impl Into<String>) -> Self {
        StreamFrame::Chunk { text: text.into() }
    }

    pub fn end() -> Self {
        StreamFrame::Event {
            event: StreamEvent::End,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        StreamFrame::Error {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_text_prompt() {
        let req: AiRequest = serde_json::from_value(json!({ "text": "I open the door" })).unwrap();
        assert_eq!(req.prompt().as_deref(), Some("I open the door"));
        assert_eq!(req.player_id(), DEFAULT_PLAYER_ID);
        assert!(!req.is_game_start());
    }

    #[test]
    fn test_structured_prompt() {
        let req: AiRequest = serde_json::from_value(json!({
            "endpoint": "/start_game",
            "payload": { "playerData": { "username": "Aria" } },
            "playerId": "aria-1"
        }))
        .unwrap();
        assert_eq!(
            req.prompt().as_deref(),
            Some(r#"/start_game|{"playerData":{"username":"Aria"}}"#)
        );
        assert_eq!(req.player_id(), "aria-1");
        assert!(req.is_game_start());
    }

    #[test]
    fn test_empty_request_has_no_prompt() {
        assert!(AiRequest::default().prompt().is_none());
        assert!(AiRequest::text("   ").prompt().is_none());
    }

    #[test]
    fn test_stream_frames_wire_format() {
        assert_eq!(
            serde_json::to_value(StreamFrame::chunk("You ")).unwrap(),
            json!({ "text": "You " })
        );
        assert_eq!(
            serde_json::to_value(StreamFrame::end()).unwrap(),
            json!({ "event": "end" })
        );
        let parsed: StreamFrame = serde_json::from_str(r#"{"error":"quota exceeded"}"#).unwrap();
        assert_eq!(parsed, StreamFrame::error("quota exceeded"));
    }
}
