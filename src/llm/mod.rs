// Clients for the hosted language models that narrate the game.

pub mod gemini;
pub mod openai;
pub mod scripted;
pub mod sse;

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::config::{Config, Provider};
use crate::memory::ConversationTurn;
use crate::metrics;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use scripted::ScriptedNarrator;

/// Text chunks produced by a streaming vendor call.
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured; set {0}")]
    MissingApiKey(&'static str),
    #[error("request to LLM vendor failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM vendor returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("LLM vendor reported an error: {0}")]
    Vendor(String),
    #[error("malformed LLM response: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        LlmError::Malformed(e.to_string())
    }
}

/// A narrator backed by some language model.
pub trait LlmClient: Send + Sync {
    /// Short provider name used in logs and metric labels.
    fn provider(&self) -> &'static str;

    /// One blocking completion for `prompt`, given the prior turns.
    fn generate<'a>(
        &'a self,
        history: &'a [ConversationTurn],
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, LlmError>>;

    /// A streamed completion. Chunks arrive in order; an `Err` item ends the
    /// stream.
    fn stream<'a>(
        &'a self,
        history: &'a [ConversationTurn],
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<ChunkStream, LlmError>>;
}

/// Build the client selected by the configuration.
pub fn build_client(config: &Config) -> Result<Arc<dyn LlmClient>, LlmError> {
    let client: Arc<dyn LlmClient> = match config.provider {
        Provider::Gemini => {
            let key = config
                .api_key
                .clone()
                .ok_or(LlmError::MissingApiKey("GEMINI_API_KEY"))?;
            Arc::new(GeminiClient::new(key, &config.model, &config.system_prompt))
        }
        Provider::OpenAi => {
            let key = config
                .api_key
                .clone()
                .ok_or(LlmError::MissingApiKey("OPENAI_API_KEY"))?;
            Arc::new(OpenAiClient::new(
                key,
                &config.openai_base_url,
                &config.model,
                &config.system_prompt,
            ))
        }
        Provider::Offline => Arc::new(ScriptedNarrator::new()),
    };
    tracing::info!(provider = client.provider(), model = %config.model, "LLM client ready");
    Ok(client)
}

/// Run a vendor call, recording its latency.
pub async fn timed_generate(
    client: &dyn LlmClient,
    history: &[ConversationTurn],
    prompt: &str,
) -> Result<String, LlmError> {
    let started = Instant::now();
    let result = client.generate(history, prompt).await;
    metrics::LLM_CALL_DURATION_SECONDS
        .with_label_values(&[client.provider()])
        .observe(started.elapsed().as_secs_f64());
    result
}

/// Turn a non-success HTTP response into an error carrying the vendor's body.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_requires_key() {
        let args = vec!["rpg-narrator".to_string()];
        let config = Config::from_sources(&args, |_| None).unwrap();
        assert!(matches!(
            build_client(&config),
            Err(LlmError::MissingApiKey("GEMINI_API_KEY"))
        ));
    }

    #[test]
    fn test_build_offline_client() {
        let args = vec!["rpg-narrator".to_string(), "--offline".to_string()];
        let config = Config::from_sources(&args, |_| None).unwrap();
        let client = build_client(&config).unwrap();
        assert_eq!(client.provider(), "offline");
    }
}
