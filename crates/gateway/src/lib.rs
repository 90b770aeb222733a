//! HTTP surface for askgate.
//!
//! Exposes `POST /ask`, `GET|DELETE /history`, and `GET /health` over a
//! shared [`RequestPipeline`]. Built on Axum.

pub mod api;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use askgate_config::{AppConfig, GatewayConfig};
use askgate_pipeline::RequestPipeline;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub pipeline: RequestPipeline,
    pub history_default_limit: usize,
    pub history_max_limit: usize,
}

impl GatewayState {
    pub fn new(pipeline: RequestPipeline, config: &GatewayConfig) -> Self {
        Self {
            pipeline,
            history_default_limit: config.history_default_limit.max(1),
            history_max_limit: config.history_max_limit.max(1),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with every gateway route.
///
/// Layers applied:
/// - CORS limited to `gateway.cors_origins` (none = same-origin only)
/// - Request body size limit from `gateway.body_limit_bytes`
/// - HTTP tracing
pub fn build_router(state: SharedState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/ask", post(api::ask_handler))
        .route(
            "/history",
            get(api::history_handler).delete(api::forget_handler),
        )
        .route("/health", get(api::health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| {
            // AllowOrigin::list rejects the wildcard
            let wildcard = origin.trim() == "*";
            if wildcard {
                warn!("Ignoring wildcard CORS origin; list origins explicitly");
            }
            !wildcard
        })
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server and serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let pipeline = askgate_pipeline::build_pipeline(&config).await?;
    if !pipeline.credentials_configured() {
        warn!("Completion credentials are not configured; /ask will fail until they are");
    }

    let state = Arc::new(GatewayState::new(pipeline, &config.gateway));
    let app = build_router(state, &config.gateway);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
}
