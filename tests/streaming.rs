// End-to-end tests against a live server: WebSocket framing and full game
// sessions over both transports.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::SinkExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::protocol::Message;

use rpg_narrator::api::{router, AppState};
use rpg_narrator::game::GameSession;
use rpg_narrator::llm::{ChunkStream, LlmClient, LlmError, ScriptedNarrator};
use rpg_narrator::memory::{ConversationMemory, ConversationTurn};
use rpg_narrator::session::{PlayerData, SessionStore, Stats};
use rpg_narrator::transport::{HttpTransport, Transport, TransportError, WsTransport};

/// Streams two chunks, then fails.
struct FlakyVendor;

impl LlmClient for FlakyVendor {
    fn provider(&self) -> &'static str {
        "flaky"
    }

    fn generate<'a>(
        &'a self,
        _history: &'a [ConversationTurn],
        _prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async { Err(LlmError::Malformed("unused".into())) })
    }

    fn stream<'a>(
        &'a self,
        _history: &'a [ConversationTurn],
        _prompt: &'a str,
    ) -> BoxFuture<'a, Result<ChunkStream, LlmError>> {
        let items: Vec<Result<String, LlmError>> = vec![
            Ok("The ".into()),
            Ok("goblin ".into()),
            Err(LlmError::Malformed("connection reset".into())),
        ];
        Box::pin(async move { Ok(stream::iter(items).boxed()) })
    }
}

/// Start a server on an ephemeral port and return its base URL.
async fn spawn_server(llm: Arc<dyn LlmClient>, memory: ConversationMemory) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState::new(llm, memory));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Send one request over a raw socket and collect every text frame until the
/// server closes.
async fn ws_frames(base: &str, request: Value) -> Vec<Value> {
    let url = format!("{}/ws", base.replacen("http://", "ws://", 1));
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    ws.send(Message::Text(request.to_string())).await.unwrap();

    let mut frames = Vec::new();
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Text(text)) => frames.push(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    frames
}

fn saved_character(dir: &tempfile::TempDir) -> SessionStore {
    let store = SessionStore::new(dir.path());
    let player = PlayerData::create(
        "Aria",
        Stats {
            str: 10,
            dex: 16,
            int: 11,
        },
    );
    store.save(&player).unwrap();
    store
}

#[tokio::test]
async fn test_ws_streams_chunks_then_end() {
    let memory = ConversationMemory::new(10, 100);
    let base = spawn_server(Arc::new(ScriptedNarrator::new()), memory.clone()).await;

    let frames = ws_frames(&base, json!({ "text": "I attack", "playerId": "aria" })).await;

    let (last, chunks) = frames.split_last().unwrap();
    assert_eq!(last, &json!({ "event": "end" }));
    assert!(chunks.len() > 1);
    let text: String = chunks.iter().map(|f| f["text"].as_str().unwrap()).collect();
    assert_eq!(text, ScriptedNarrator.narrate("I attack"));
    assert_eq!(memory.len("aria"), 2);
}

#[tokio::test]
async fn test_ws_without_player_id_is_stateless() {
    let memory = ConversationMemory::new(10, 100);
    let base = spawn_server(Arc::new(ScriptedNarrator::new()), memory.clone()).await;

    let frames = ws_frames(&base, json!({ "text": "rest" })).await;
    assert_eq!(frames.last().unwrap(), &json!({ "event": "end" }));
    assert_eq!(memory.player_count(), 0);
}

#[tokio::test]
async fn test_ws_mid_stream_failure_sends_one_error() {
    let memory = ConversationMemory::new(10, 100);
    let base = spawn_server(Arc::new(FlakyVendor), memory.clone()).await;

    let frames = ws_frames(&base, json!({ "text": "hello", "playerId": "aria" })).await;

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], json!({ "text": "The " }));
    assert_eq!(frames[1], json!({ "text": "goblin " }));
    assert!(frames[2]["error"].as_str().unwrap().contains("connection reset"));
    assert_eq!(memory.len("aria"), 0);
}

#[tokio::test]
async fn test_ws_empty_request_is_rejected() {
    let base = spawn_server(Arc::new(ScriptedNarrator::new()), ConversationMemory::default()).await;
    let frames = ws_frames(&base, json!({})).await;
    assert_eq!(frames, vec![json!({ "error": "text is required" })]);
}

#[tokio::test]
async fn test_ws_transport_reports_remote_error() {
    let base = spawn_server(Arc::new(FlakyVendor), ConversationMemory::default()).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut transport = WsTransport::new(&base)
        .with_chunk_handler(move |c| sink.lock().unwrap().push(c.to_string()));

    let request = rpg_narrator::protocol::AiRequest::text("hello");
    let result = transport.exchange(&request).await;

    assert!(matches!(result, Err(TransportError::Remote(_))));
    assert_eq!(*seen.lock().unwrap(), vec!["The ", "goblin "]);
}

async fn play_through(transport: Box<dyn Transport>, dir: &tempfile::TempDir) {
    let mut game = GameSession::new(saved_character(dir), transport)
        .unwrap()
        .with_player_id("aria");

    let outcome = game.start().await.unwrap();
    assert!(outcome.narrative.starts_with("Welcome, Aria!"));
    assert!(!game.waiting_for_roll());

    let outcome = game.submit_text("I look north").await.unwrap();
    assert!(outcome.roll_requested);
    assert_eq!(game.roll_reason(), Some("Roll for Stealth (Dexterity)"));

    let mut rng = StdRng::seed_from_u64(42);
    let outcome = game.roll_dice(&mut rng).await.unwrap();
    assert!(!game.waiting_for_roll());
    // Either the goblin fumbles or it deals 3 damage
    assert!(outcome.hp == 100 || outcome.hp == 97);
    assert_eq!(SessionStore::new(dir.path()).load().unwrap().hp, outcome.hp);

    let outcome = game.select_map("cave").await.unwrap();
    assert!(outcome.narrative.contains("Watcher's Cave"));
}

#[tokio::test]
async fn test_game_session_over_http() {
    let base = spawn_server(Arc::new(ScriptedNarrator::new()), ConversationMemory::default()).await;
    let dir = tempfile::tempdir().unwrap();
    play_through(Box::new(HttpTransport::new(&base)), &dir).await;
}

#[tokio::test]
async fn test_game_session_over_websocket() {
    let memory = ConversationMemory::new(10, 100);
    let base = spawn_server(Arc::new(ScriptedNarrator::new()), memory.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    play_through(Box::new(WsTransport::new(&base)), &dir).await;
    assert_eq!(memory.len("aria"), 8);
}
