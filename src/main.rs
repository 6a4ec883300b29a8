use rpg_narrator::api::{self, AppState, StaticDirs};
use rpg_narrator::config::Config;
use rpg_narrator::llm;
use rpg_narrator::memory::ConversationMemory;
use rpg_narrator::metrics;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let llm = match llm::build_client(&config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Cannot start narrator: {e} (use --offline to play without a vendor)");
            std::process::exit(1);
        }
    };

    metrics::register_metrics();

    let memory = ConversationMemory::new(config.memory_max_turns, config.memory_max_players);
    let state = AppState::new(llm, memory);
    let app = api::app(state, &StaticDirs::from(&config));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(
        provider = %config.provider,
        "Server running at http://localhost:{}/",
        config.port
    );
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
