//! # imgrelay: image upload relay
//!
//! `imgrelay` sits between a browser and a third-party image host. The browser posts an image
//! to `POST /api/upload`; the relay validates the multipart body, re-packages the file into a
//! fresh multipart form, attaches the host's API key, and forwards it. Whatever the host
//! answers (status code and JSON body) goes back to the browser unchanged. The API key lives
//! only in the relay's configuration and in the outbound request header.
//!
//! ## Request Flow
//!
//! `Received → Validated → Forwarded → Completed`, or `Received → Rejected`:
//!
//! 1. The [`api::handlers::upload`] handler reads the `source` field, rejecting requests with no
//!    file (400) or a file over `limits.max_file_size` (413) before anything leaves the process.
//! 2. The [`provider::ImageHost`] implementation posts the file to the configured host with the
//!    credential header, under a deadline of `provider.timeout`.
//! 3. The host's response is relayed verbatim. Transport failures, timeouts and unreadable host
//!    responses become a 500 with a `{ "error": ... }` body that never includes the raw error.
//!
//! The [`client`] module is the other side of the contract: it turns a selected file into a
//! relay call and extracts the hosted URL from the relayed response.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use imgrelay::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = imgrelay::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     imgrelay::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod errors;
mod openapi;
pub mod provider;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;
#[cfg(test)]
pub mod test_utils;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::{
    Json, Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::config::{CorsConfig, CorsOrigin};
use crate::openapi::ApiDoc;
use crate::provider::{ImageHost, ReqwestImageHost};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// Nothing in here is mutable: the configuration is read-only and the image host only holds
/// a pooled HTTP client and the credential header.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub image_host: Arc<dyn ImageHost>,
}

/// Install the process-wide rustls crypto provider, if nobody has yet.
///
/// reqwest is built without a bundled provider, so this must run before any client is built.
pub fn ensure_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn create_cors_layer(config: &CorsConfig) -> anyhow::Result<Option<CorsLayer>> {
    if config.allowed_origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if let Some(max_age) = config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(Some(cors))
}

/// Build the main application router.
///
/// - `POST /api/upload` with a body limit sized to `limits.max_file_size`
/// - `GET /healthz`
/// - `GET /docs` and `GET /api-docs/openapi.json`
/// - `GET /internal/metrics` when `enable_metrics` is set
/// - CORS (when origins are configured) and request tracing
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let body_limit = usize::try_from(state.config.limits.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let upload_router = Router::new().route(
        "/api/upload",
        post(api::handlers::upload::upload_image).layer(DefaultBodyLimit::max(body_limit)),
    );

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(upload_router)
        .with_state(state.clone())
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if let Some(cors_layer) = create_cors_layer(&state.config.cors)? {
        router = router.layer(cors_layer);
    }

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router and configuration.
///
/// 1. **Create**: [`Application::new`] builds the image host client and the router
/// 2. **Serve**: [`Application::serve`] binds to the configured address and handles requests
///    until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application forwarding to the configured image host
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let image_host = ReqwestImageHost::new(&config.provider)?;
        Self::with_image_host(config, Arc::new(image_host))
    }

    /// Create a new application forwarding to a caller-supplied image host
    pub fn with_image_host(config: Config, image_host: Arc<dyn ImageHost>) -> anyhow::Result<Self> {
        debug!("Starting upload relay with configuration: {:#?}", config);

        let app_state = AppState::builder().config(config.clone()).image_host(image_host).build();
        let router = build_router(&app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application on the configured address
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        self.serve_with_listener(listener, shutdown).await
    }

    /// Serve on an already-bound listener
    pub async fn serve_with_listener<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!(
            "Upload relay listening on http://{}, forwarding to {}",
            listener.local_addr()?,
            self.config.provider.url
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
