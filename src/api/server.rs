// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP server: shared state, router and lifecycle

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::extract::{extract_handler, scan_handler};
use super::handlers::{health_handler, metrics_handler, version_handler};
use super::metrics::ServiceMetrics;
use crate::config::ServiceConfig;
use crate::label::LabelParser;
use crate::version;
use crate::vision::pipeline::ExtractionPipeline;
use crate::vision::recognition::{RecognitionEngine, RxingDecoder, SymbolDecoder, TextRecognizer};

/// Slack on top of the image limit for multipart framing and hint fields
const ENVELOPE_OVERHEAD_BYTES: usize = 64 * 1024;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: ExtractionPipeline,
    pub config: Arc<ServiceConfig>,
    pub metrics: Arc<ServiceMetrics>,
    pub label_parser: Arc<LabelParser>,
}

impl AppState {
    /// Build the engines described by `config`.
    ///
    /// Symbol decoding is always available. Text recognition needs the
    /// `tesseract` feature and a usable tessdata install; without them the
    /// service still starts and text requests report `EngineUnavailable`.
    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        let symbols: Arc<dyn SymbolDecoder> = Arc::new(RxingDecoder::new());
        let text = text_recognizer(&config);
        let engine = RecognitionEngine::new(text, Some(symbols), config.recognition_settings());
        Self::with_engine(config, engine)
    }

    /// Build state around an explicit engine
    pub fn with_engine(config: ServiceConfig, engine: RecognitionEngine) -> Result<Self> {
        let pipeline =
            ExtractionPipeline::new(engine, config.pipeline_config(), config.worker_pool_size);
        Ok(Self {
            pipeline,
            config: Arc::new(config),
            metrics: Arc::new(ServiceMetrics::new().context("failed to register metrics")?),
            label_parser: Arc::new(LabelParser::new().context("failed to compile label patterns")?),
        })
    }
}

#[cfg(feature = "tesseract")]
fn text_recognizer(config: &ServiceConfig) -> Option<Arc<dyn TextRecognizer>> {
    use crate::vision::recognition::TesseractRecognizer;

    match TesseractRecognizer::new(config.tessdata_dir.as_deref(), &config.ocr_language) {
        Ok(recognizer) => Some(Arc::new(recognizer)),
        Err(e) => {
            warn!("Text recognition disabled: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "tesseract"))]
fn text_recognizer(_config: &ServiceConfig) -> Option<Arc<dyn TextRecognizer>> {
    warn!("Text recognition disabled: built without the `tesseract` feature");
    None
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    // Above the image limit so oversized images reach the pipeline's
    // size check and get the structured error body
    let body_limit = state
        .config
        .max_payload_bytes
        .saturating_mul(2)
        .saturating_add(ENVELOPE_OVERHEAD_BYTES);

    Router::new()
        .route("/extract", post(extract_handler))
        .route("/v1/extract", post(extract_handler))
        .route("/api/scan", post(scan_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/version", get(version_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A running server bound to a local address
pub struct ApiServer {
    addr: SocketAddr,
    state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Bind `bind_addr` and serve in the background
    pub async fn start(state: AppState, bind_addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", bind_addr))?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = create_router(state.clone());

        let handle = tokio::spawn(async move {
            let serve_future = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve_future.await {
                warn!("HTTP server error: {}", e);
            }
        });

        info!("{} listening on {}", version::get_version_string(), addr);

        Ok(Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stop accepting connections, drain in-flight requests and close the pool
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.state.pipeline.pool().close();
        info!("Server stopped");
    }
}

/// Run until Ctrl-C
pub async fn serve(config: ServiceConfig) -> Result<()> {
    let bind_addr = config.bind_addr();
    let state = AppState::from_config(config)?;
    info!(
        text = ?state.pipeline.engine().text_engine_name(),
        symbols = ?state.pipeline.engine().symbol_engine_name(),
        workers = state.pipeline.pool().size(),
        "Engines ready"
    );

    let server = ApiServer::start(state, &bind_addr).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    server.shutdown().await;
    Ok(())
}
