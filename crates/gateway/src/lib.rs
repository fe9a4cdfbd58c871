//! HTTP gateway for FinMentor.
//!
//! Exposes the orchestrator over REST. Authentication happens upstream; the
//! caller's identity arrives in the `X-User-Id` header.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use finmentor_agent::{Orchestrator, RandomRewardGranter, StaticBehaviorProvider};
use finmentor_config::AppConfig;
use finmentor_core::behavior::Persona;
use finmentor_core::cache::ResponseCache;
use finmentor_core::store::Store;
use finmentor_store::{InMemoryCache, InMemoryStore, NoopCache, SqliteStore};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Build the full router: `/health` plus the v1 API.
///
/// Layers applied:
/// - CORS restricted to the local web client
/// - Request body size limit (64 KB)
/// - HTTP trace logging
pub fn build_router(state: api_v1::SharedApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:8080"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(api_v1::USER_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Open the configured store. Needs no provider credentials.
pub async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.store.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        _ => {
            let path = config.store.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(SqliteStore::new(&path.to_string_lossy()).await?)
        }
    };
    Ok(store)
}

/// Assemble the orchestrator and its collaborators from configuration.
///
/// Fails when the provider is not configured or the store cannot be opened.
pub async fn build_orchestrator(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let provider = finmentor_providers::build_from_config(config)?;
    let model = finmentor_providers::resolve_model(config);
    let store = build_store(config).await?;

    let cache: Arc<dyn ResponseCache> = if config.cache.enabled {
        Arc::new(InMemoryCache::new(config.cache.ttl_secs, config.cache.max_entries))
    } else {
        Arc::new(NoopCache)
    };

    info!(
        store = store.name(),
        cache = cache.name(),
        provider = provider.name(),
        model = %model,
        "Orchestrator assembled"
    );

    let behavior = Arc::new(StaticBehaviorProvider::new(Persona::Mentor));
    let mut orchestrator = Orchestrator::from_config(config, store, cache, provider, behavior, model);
    if let Some(granter) = RandomRewardGranter::from_config(&config.reward) {
        orchestrator = orchestrator.with_reward(Arc::new(granter));
    }
    Ok(orchestrator)
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let orchestrator = build_orchestrator(&config).await?;
    let state = Arc::new(api_v1::ApiState::new(orchestrator));

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
