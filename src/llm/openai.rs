// OpenAI-compatible chat completions client.

use futures::future::{self, BoxFuture};
use futures::StreamExt;
use serde_json::{json, Value};

use super::{check_status, sse, ChunkStream, LlmClient, LlmError};
use crate::memory::{ConversationTurn, Role};

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    system_prompt: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: &str, model: &str, system_prompt: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .http
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

pub(crate) fn build_messages(
    system_prompt: &str,
    history: &[ConversationTurn],
    prompt: &str,
) -> Vec<Value> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if !system_prompt.is_empty() {
        messages.push(json!({ "role": "system", "content": system_prompt }));
    }
    for turn in history {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": turn.content }));
    }
    messages.push(json!({ "role": "user", "content": prompt }));
    messages
}

/// Text delta of one streamed completion chunk, if it has any.
pub(crate) fn delta_content(chunk: &Value) -> Option<String> {
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl LlmClient for OpenAiClient {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn generate<'a>(
        &'a self,
        history: &'a [ConversationTurn],
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move {
            let body = json!({
                "model": self.model,
                "messages": build_messages(&self.system_prompt, history, prompt),
            });
            let response = self.post(&body).await?;
            let value: Value = response.json().await?;
            value["choices"][0]["message"]["content"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| LlmError::Malformed("completion had no message content".to_string()))
        })
    }

    fn stream<'a>(
        &'a self,
        history: &'a [ConversationTurn],
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<ChunkStream, LlmError>> {
        Box::pin(async move {
            let body = json!({
                "model": self.model,
                "messages": build_messages(&self.system_prompt, history, prompt),
                "stream": true,
            });
            let response = self.post(&body).await?;

            let chunks = sse::data_events(response.bytes_stream()).filter_map(|event| {
                future::ready(match event {
                    Ok(data) => match serde_json::from_str::<Value>(&data) {
                        Ok(value) => delta_content(&value).map(Ok),
                        Err(e) => Some(Err(e.into())),
                    },
                    Err(e) => Some(Err(e)),
                })
            });
            Ok(chunks.boxed())
        })
    }
}
