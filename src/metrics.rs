// Prometheus metrics definitions for the narrator backend.

use std::sync::Once;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("narrator_connected_websockets", "Live WebSocket connections").unwrap();

    /// Player ids with a conversation history in memory.
    pub static ref MEMORY_PLAYERS: IntGauge =
        IntGauge::new("narrator_memory_players", "Players with conversation memory").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Narration requests, by transport (http, ws) and outcome (ok, error).
    pub static ref AI_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("narrator_ai_requests_total", "Total narration requests"),
        &["transport", "outcome"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("narrator_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    /// Total WebSocket frames sent to clients.
    pub static ref WEBSOCKET_MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "narrator_websocket_messages_sent_total",
        "Total WebSocket messages sent",
    )
    .unwrap();

    /// Conversations dropped to stay under the player cap.
    pub static ref MEMORY_EVICTIONS_TOTAL: IntCounter = IntCounter::new(
        "narrator_memory_evictions_total",
        "Conversations evicted from memory",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Vendor call latency in seconds, by provider.
    pub static ref LLM_CALL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("narrator_llm_call_duration_seconds", "LLM vendor call duration in seconds")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["provider"],
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "narrator_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(CONNECTED_WEBSOCKETS.clone()),
            Box::new(MEMORY_PLAYERS.clone()),
            Box::new(AI_REQUESTS_TOTAL.clone()),
            Box::new(API_REQUESTS_TOTAL.clone()),
            Box::new(WEBSOCKET_MESSAGES_SENT_TOTAL.clone()),
            Box::new(MEMORY_EVICTIONS_TOTAL.clone()),
            Box::new(LLM_CALL_DURATION_SECONDS.clone()),
            Box::new(API_REQUEST_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::warn!("failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Route middleware recording request counts and latency.
///
/// Labels use the matched route template (`/api/scenes/{map}`), never the raw
/// path, so arbitrary map names cannot blow up label cardinality.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[&endpoint])
        .observe(started.elapsed().as_secs_f64());
    API_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    response
}
