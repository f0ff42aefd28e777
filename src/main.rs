//! Conveyor - rule-driven message routing service
//!
//! Inbound JSON messages are matched against declarative rules and driven
//! through chains of remote HTTP steps, with per-conversation progress kept
//! on disk.

mod api;
mod config;
mod context;
mod engine;
mod index;
mod query;
mod remote;
mod store;

use api::{create_router, AppState};
use config::Config;
use engine::Engine;
use remote::{HttpStepInvoker, LoggingInvoker};
use std::net::SocketAddr;
use std::sync::Arc;
use store::ContextStore;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        data_dir = %config.data_dir.display(),
        step_timeout_secs = config.step_timeout.as_secs(),
        max_hops = config.max_hops,
        "Configuration loaded"
    );

    // Contexts and rules
    let store = ContextStore::open(&config.data_dir)?;
    let rules = store.load_rules()?;
    if rules.is_empty() {
        tracing::warn!("No rules configured, every message will be rejected");
    }

    let invoker = LoggingInvoker::new(Arc::new(HttpStepInvoker::new(config.step_timeout)?));
    let engine = Engine::new(rules, store.clone(), invoker).with_max_hops(config.max_hops);
    tracing::info!(
        rules = engine.rules().len(),
        active_contexts = store.active_count(),
        "Engine initialized"
    );

    let app = create_router(AppState::new(engine, store)).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Conveyor listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
