// WebSocket handler for streamed narration.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::StreamExt;
use uuid::Uuid;

use super::AppState;
use crate::metrics;
use crate::protocol::{AiRequest, StreamFrame};

/// WebSocket upgrade handler. Each connection carries exactly one turn.
pub async fn ws_narrate(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    metrics::CONNECTED_WEBSOCKETS.inc();
    tracing::info!(%connection_id, "client connected");

    if let Some(request) = read_request(&mut socket, connection_id).await {
        let ok = relay(&mut socket, &state, &request, connection_id).await;
        let outcome = if ok { "ok" } else { "error" };
        metrics::AI_REQUESTS_TOTAL
            .with_label_values(&["ws", outcome])
            .inc();
    }

    // The client may already be gone; nothing to do about a failed close
    let _ = socket.send(Message::Close(None)).await;
    metrics::CONNECTED_WEBSOCKETS.dec();
    tracing::info!(%connection_id, "client disconnected");
}

/// Wait for the client's single request message.
async fn read_request(socket: &mut WebSocket, connection_id: Uuid) -> Option<AiRequest> {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => {
                return match serde_json::from_str::<AiRequest>(text.as_str()) {
                    Ok(request) => Some(request),
                    Err(e) => {
                        tracing::warn!(%connection_id, "unreadable request: {e}");
                        send_frame(socket, &StreamFrame::error(format!("invalid request: {e}")))
                            .await;
                        None
                    }
                };
            }
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Err(e)) => {
                tracing::warn!(%connection_id, "WebSocket error: {e}");
                return None;
            }
            // Pings are answered by axum; binary frames are ignored
            Some(Ok(_)) => {}
        }
    }
}

/// Stream one narration to the client. Returns whether it ended cleanly.
///
/// Exactly one terminal frame is sent: `{event: "end"}` on success, or a
/// single `{error}` after which no further chunks follow.
async fn relay(
    socket: &mut WebSocket,
    state: &AppState,
    request: &AiRequest,
    connection_id: Uuid,
) -> bool {
    let Some(prompt) = request.prompt() else {
        send_frame(socket, &StreamFrame::error("text is required")).await;
        return false;
    };

    // Only requests naming a player take part in conversation memory
    let player_id = request.player_id.as_ref().map(|_| request.player_id());
    if let Some(player_id) = player_id {
        if request.is_game_start() {
            state.memory.clear(player_id);
        }
    }
    let history = player_id
        .map(|id| state.memory.get(id))
        .unwrap_or_default();

    let mut chunks = match state.llm.stream(&history, &prompt).await {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::error!(%connection_id, "LLM vendor error: {e}");
            send_frame(socket, &StreamFrame::error(e.to_string())).await;
            return false;
        }
    };

    let mut narration = String::new();
    while let Some(item) = chunks.next().await {
        match item {
            Ok(chunk) => {
                if !send_frame(socket, &StreamFrame::chunk(chunk.as_str())).await {
                    tracing::info!(%connection_id, "client left mid-stream");
                    return false;
                }
                narration.push_str(&chunk);
            }
            Err(e) => {
                tracing::error!(%connection_id, "LLM stream failed: {e}");
                send_frame(socket, &StreamFrame::error(e.to_string())).await;
                return false;
            }
        }
    }

    if let Some(player_id) = player_id {
        state.memory.record_exchange(player_id, &prompt, &narration);
    }
    send_frame(socket, &StreamFrame::end()).await
}

/// Serialize and send one frame. Returns false if the client is gone.
async fn send_frame(socket: &mut WebSocket, frame: &StreamFrame) -> bool {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("failed to encode frame: {e}");
            return false;
        }
    };
    if socket.send(Message::Text(json.into())).await.is_err() {
        return false;
    }
    metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
    true
}
