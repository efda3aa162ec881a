//! HTTP API gateway for notegraph.
//!
//! Exposes the health check and the v1 API: streaming chat, tool listing,
//! workflow definitions and streaming workflow runs, and a server-sent
//! event feed of domain events.
//!
//! Built on Axum.

pub mod api_v1;
pub mod error;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{Json, Response};
use axum::{Router, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use notegraph_agent::AgentLoop;
use notegraph_config::AppConfig;
use notegraph_core::error::{ProviderError, StoreError};
use notegraph_core::event::EventBus;
use notegraph_core::principal::Principal;
use notegraph_core::store::EntityStore;
use notegraph_core::tool::ToolRegistry;
use notegraph_providers::router::{ProviderRouter, build_from_config};
use notegraph_store::{InMemoryStore, JsonFileStore};
use notegraph_workflow::WorkflowEngine;

/// Shared application state, built once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub providers: ProviderRouter,
    pub tools: Arc<ToolRegistry>,
    pub store: Arc<dyn EntityStore>,
    pub event_bus: Arc<EventBus>,
    pub engine: WorkflowEngine,
    pub start_time: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Assemble state from already-built providers and store.
    pub fn new(
        config: AppConfig,
        providers: ProviderRouter,
        store: Arc<dyn EntityStore>,
    ) -> Result<Self, notegraph_core::error::ToolError> {
        let tools = Arc::new(notegraph_tools::default_registry(store.clone())?);
        let event_bus = Arc::new(EventBus::default());
        let engine = WorkflowEngine::new().with_event_bus(event_bus.clone());
        Ok(Self {
            config,
            providers,
            tools,
            store,
            event_bus,
            engine,
            start_time: Utc::now(),
        })
    }

    /// Build providers and the configured store backend from config.
    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let providers = build_from_config(&config);
        let store = open_store(&config)?;
        Ok(Self::new(config, providers, store)?)
    }

    /// An agent loop for one request, honouring per-request overrides.
    ///
    /// The model falls back to the provider's configured default, then to
    /// the global default.
    pub fn agent_for(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<AgentLoop, ProviderError> {
        let adapter = self.providers.resolve(provider, api_key)?;
        let provider_name = provider
            .filter(|p| !p.is_empty())
            .unwrap_or(self.providers.default_provider());
        let model = model
            .filter(|m| !m.is_empty())
            .or_else(|| self.providers.default_model_for(provider_name))
            .unwrap_or(self.config.default_model.as_str())
            .to_string();

        Ok(AgentLoop::new(adapter, model, self.tools.clone())
            .with_config(&self.config)
            .with_event_bus(self.event_bus.clone()))
    }
}

/// Open the entity store named by `[store]`.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn EntityStore>, StoreError> {
    match config.store.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        _ => {
            let path = config.store.resolved_path();
            info!(path = %path.display(), "Opening JSON file store");
            Ok(Arc::new(JsonFileStore::open(path)?))
        }
    }
}

/// Build the full router.
///
/// Layers applied:
/// - Bearer token authentication on all /v1 routes
/// - CORS limited to local origins
/// - Request body size limit from `[gateway]`
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.config.gateway.body_limit_bytes;
    let v1 = api_v1::v1_router(state.clone())
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            is_local_origin(origin)
        }))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn is_local_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let host = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    matches!(host, "localhost" | "127.0.0.1")
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let auth_enabled = !config.gateway.bearer_tokens.is_empty();

    let state = Arc::new(AppState::from_config(config)?);
    let app = build_router(state);

    info!(addr = %addr, auth_enabled, "Gateway starting");
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

/// Authentication middleware for the /v1 API.
///
/// With no tokens configured every request runs as the anonymous
/// principal. Otherwise a valid `Authorization: Bearer <token>` is
/// required and identifies the caller by token position.
async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let tokens = &state.config.gateway.bearer_tokens;
    if tokens.is_empty() {
        req.extensions_mut().insert(Principal::anonymous());
        return Ok(next.run(req).await);
    }

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented.and_then(|token| tokens.iter().position(|t| t == token)) {
        Some(index) => {
            req.extensions_mut()
                .insert(Principal::new(format!("token-{index}")));
            Ok(next.run(req).await)
        }
        None => {
            warn!("Unauthorized request to /v1 API, missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
