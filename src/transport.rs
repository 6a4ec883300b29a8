// Client side of the narration protocol: one request in, one narration out.

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::protocol::{AiReply, AiRequest, ErrorBody, StreamFrame};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("narration failed: {0}")]
    Remote(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sends one turn to the narrator and returns the full narration.
pub trait Transport: Send {
    fn exchange<'a>(&'a mut self, request: &'a AiRequest)
        -> BoxFuture<'a, Result<String, TransportError>>;
}

/// `POST /ai_response`, one JSON object each way.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(server: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/ai_response", server.trim_end_matches('/')),
        }
    }
}

impl Transport for HttpTransport {
    fn exchange<'a>(
        &'a mut self,
        request: &'a AiRequest,
    ) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(async move {
            let response = self.client.post(&self.endpoint).json(request).send().await?;
            let status = response.status();
            let body = response.bytes().await?;

            if status.is_success() {
                let reply: AiReply = serde_json::from_slice(&body)?;
                return Ok(reply.text);
            }
            let message = match serde_json::from_slice::<ErrorBody>(&body) {
                Ok(ErrorBody {
                    error,
                    details: Some(details),
                }) => format!("{error}: {details}"),
                Ok(ErrorBody { error, .. }) => error,
                Err(_) => String::from_utf8_lossy(&body).into_owned(),
            };
            Err(TransportError::Server {
                status: status.as_u16(),
                message,
            })
        })
    }
}

type ChunkHandler = Box<dyn FnMut(&str) + Send>;

/// Streaming transport: a fresh socket per turn, chunks accumulated until the
/// end event.
pub struct WsTransport {
    url: String,
    on_chunk: Option<ChunkHandler>,
}

impl WsTransport {
    /// `server` is an `http(s)://` or `ws(s)://` base URL.
    pub fn new(server: &str) -> Self {
        let base = server.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        Self {
            url: format!("{base}/ws"),
            on_chunk: None,
        }
    }

    /// Call `handler` with every chunk as it arrives.
    pub fn with_chunk_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_chunk = Some(Box::new(handler));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WsTransport {
    fn exchange<'a>(
        &'a mut self,
        request: &'a AiRequest,
    ) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(async move {
            let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
            let (mut sink, mut stream) = ws.split();
            sink.send(Message::Text(serde_json::to_string(request)?))
                .await?;

            let mut narration = String::new();
            while let Some(message) = stream.next().await {
                let text = match message? {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                match serde_json::from_str::<StreamFrame>(&text)? {
                    StreamFrame::Chunk { text } => {
                        if let Some(handler) = self.on_chunk.as_mut() {
                            handler(&text);
                        }
                        narration.push_str(&text);
                    }
                    StreamFrame::Event { .. } => {
                        let _ = sink.close().await;
                        return Ok(narration);
                    }
                    StreamFrame::Error { error } => return Err(TransportError::Remote(error)),
                }
            }
            Err(TransportError::Protocol(
                "connection closed before the end of the narration".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_from_http_base() {
        assert_eq!(WsTransport::new("http://localhost:8080").url(), "ws://localhost:8080/ws");
        assert_eq!(WsTransport::new("https://rpg.example/").url(), "wss://rpg.example/ws");
        assert_eq!(WsTransport::new("ws://127.0.0.1:9000").url(), "ws://127.0.0.1:9000/ws");
    }

    #[test]
    fn test_http_endpoint() {
        let transport = HttpTransport::new("http://localhost:8080/");
        assert_eq!(transport.endpoint, "http://localhost:8080/ai_response");
    }
}
