// Google Gemini generateContent client.

use futures::future::{self, BoxFuture};
use futures::StreamExt;
use serde_json::{json, Value};

use super::{check_status, sse, ChunkStream, LlmClient, LlmError};
use crate::memory::{ConversationTurn, Role};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    system_prompt: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str, system_prompt: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    fn request_body(&self, history: &[ConversationTurn], prompt: &str) -> Value {
        build_body(&self.system_prompt, history, prompt)
    }
}

pub(crate) fn build_body(system_prompt: &str, history: &[ConversationTurn], prompt: &str) -> Value {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.content }] })
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": prompt }] }));

    let mut body = json!({ "contents": contents });
    if !system_prompt.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system_prompt }] });
    }
    body
}

/// Concatenate the text parts of the first candidate. `None` when the
/// candidate carries no text (e.g. a usage-only stream event).
pub(crate) fn candidate_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn vendor_error(response: &Value) -> Option<LlmError> {
    response["error"]["message"]
        .as_str()
        .map(|m| LlmError::Vendor(format!("Gemini: {m}")))
}

impl LlmClient for GeminiClient {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    fn generate<'a>(
        &'a self,
        history: &'a [ConversationTurn],
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move {
            let response = self
                .http
                .post(self.url("generateContent"))
                .query(&[("key", self.api_key.as_str())])
                .json(&self.request_body(history, prompt))
                .send()
                .await?;
            let response = check_status(response).await?;
            let value: Value = response.json().await?;
            if let Some(err) = vendor_error(&value) {
                return Err(err);
            }
            candidate_text(&value).ok_or_else(|| {
                LlmError::Malformed("Gemini response had no candidate text".to_string())
            })
        })
    }

    fn stream<'a>(
        &'a self,
        history: &'a [ConversationTurn],
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<ChunkStream, LlmError>> {
        Box::pin(async move {
            let response = self
                .http
                .post(self.url("streamGenerateContent"))
                .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
                .json(&self.request_body(history, prompt))
                .send()
                .await?;
            let response = check_status(response).await?;

            let chunks = sse::data_events(response.bytes_stream()).filter_map(|event| {
                future::ready(match event {
                    Ok(data) => match serde_json::from_str::<Value>(&data) {
                        Ok(value) => match vendor_error(&value) {
                            Some(err) => Some(Err(err)),
                            None => candidate_text(&value).map(Ok),
                        },
                        Err(e) => Some(Err(e.into())),
                    },
                    Err(e) => Some(Err(e)),
                })
            });
            Ok(chunks.boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_maps_roles_and_system_prompt() {
        let history = vec![
            ConversationTurn::new(Role::User, "hello"),
            ConversationTurn::new(Role::Assistant, "Great to meet you"),
        ];
        let body = build_body("Be the GM", &history, "I look around");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "I look around");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be the GM");

        let bare = build_body("", &[], "hi");
        assert!(bare.get("systemInstruction").is_none());
    }

    #[test]
    fn test_candidate_text_joins_parts() {
        let value = json!({
            "candidates": [{ "content": { "parts": [{ "text": "You awaken " }, { "text": "in a cave." }] } }]
        });
        assert_eq!(candidate_text(&value).as_deref(), Some("You awaken in a cave."));
    }

    #[test]
    fn test_usage_only_event_has_no_text() {
        let value = json!({ "usageMetadata": { "totalTokenCount": 12 } });
        assert!(candidate_text(&value).is_none());
        assert!(vendor_error(&value).is_none());
    }

    #[test]
    fn test_vendor_error_detected() {
        let value = json!({ "error": { "code": 429, "message": "Resource exhausted" } });
        assert!(matches!(
            vendor_error(&value),
            Some(LlmError::Vendor(m)) if m.contains("Resource exhausted")
        ));
    }
}
