pub mod api;
pub mod config;
pub mod game;
pub mod interpreter;
pub mod llm;
pub mod memory;
pub mod metrics;
pub mod protocol;
pub mod scene;
pub mod session;
pub mod transport;
