//! Axum HTTP server for the fetch engine: push delivery events (POST /api/events), read the
//! subscription list with its change revision (GET /api/subscriptions), read delivery stats
//! (GET /api/stats). Binds to 127.0.0.1 only.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use rss2tg_core::config::{SharedConfig, Subscription};
use rss2tg_core::im::broadcast::{BroadcastReport, Broadcaster, DeliveryEvent};
use rss2tg_core::stats::Stats;

/// Shared app state: live config, broadcaster, stats, and the subscription revision counter.
#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
    pub broadcaster: Arc<Broadcaster>,
    pub stats: Arc<Stats>,
    /// Bumped by the subscriptions-changed callback; pollers re-read when it moves.
    pub revision: Arc<AtomicU64>,
}

/// GET /api/subscriptions response.
#[derive(serde::Serialize)]
struct SubscriptionsBody {
    revision: u64,
    subscriptions: Vec<Subscription>,
}

/// GET /api/stats response.
#[derive(serde::Serialize)]
struct StatsBody {
    daily: u64,
    weekly: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/events", post(post_event_handler))
        .route("/api/subscriptions", get(list_subscriptions_handler))
        .route("/api/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the Axum server. Binds to 127.0.0.1 (localhost only).
pub async fn run_web_server(port: u16, state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[rss2tg][http] listening on http://{}", addr);
    axum::serve(listener, router(state)).await
}

/// POST /api/events: broadcast one event. Always 200; per-recipient failures are in the report.
async fn post_event_handler(
    State(state): State<AppState>,
    Json(event): Json<DeliveryEvent>,
) -> Json<BroadcastReport> {
    Json(state.broadcaster.broadcast(&event).await)
}

async fn list_subscriptions_handler(State(state): State<AppState>) -> Json<SubscriptionsBody> {
    let subscriptions = state.config.read().await.rss.clone();
    Json(SubscriptionsBody {
        revision: state.revision.load(Ordering::SeqCst),
        subscriptions,
    })
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsBody> {
    let (daily, weekly) = state.stats.message_counts();
    Json(StatsBody { daily, weekly })
}
