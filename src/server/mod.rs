//! HTTP surface: viewer page, MJPEG feed, and JSON snapshots
//!
//! Every `/video_feed` connection owns a [`FrameSubscriber`] and pulls the
//! freshest frame at its own pace. Nothing is queued per client, so a slow
//! viewer skips frames instead of building a backlog.

pub mod mjpeg;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::detection::Detection;
use crate::frame_store::{FrameStore, FrameSubscriber};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listener settings
#[derive(Debug, Clone)]
pub struct StreamServerConfig {
    pub ip: String,
    pub port: u16,
    /// Concurrent `/video_feed` viewers, unlimited when `None`
    pub max_clients: Option<usize>,
}

impl From<&ServerConfig> for StreamServerConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ip: config.ip.clone(),
            port: config.port,
            max_clients: config.max_clients,
        }
    }
}

impl StreamServerConfig {
    fn bind_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Bookkeeping for connected stream viewers
#[derive(Debug)]
pub struct ClientRegistry {
    max_clients: Option<usize>,
    active: AtomicUsize,
    total: AtomicU64,
}

impl ClientRegistry {
    pub fn new(max_clients: Option<usize>) -> Self {
        Self {
            max_clients,
            active: AtomicUsize::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Reserve a viewer slot, `None` when the cap is reached
    pub fn try_acquire(self: &Arc<Self>) -> Option<ClientGuard> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if self.max_clients.is_some_and(|max| current >= max) {
                return None;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let id = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        Some(ClientGuard {
            registry: Arc::clone(self),
            id,
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Viewers accepted since start
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Holds a viewer slot; released on drop, i.e. when the response body is
/// dropped after the client goes away
#[derive(Debug)]
pub struct ClientGuard {
    registry: Arc<ClientRegistry>,
    id: u64,
}

impl ClientGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.registry.active.fetch_sub(1, Ordering::AcqRel);
        debug!(client = self.id, "Stream client disconnected");
    }
}

#[derive(Clone)]
struct AppState {
    store: Arc<FrameStore>,
    clients: Arc<ClientRegistry>,
}

/// Build the router over an existing store and registry
pub fn router(store: Arc<FrameStore>, clients: Arc<ClientRegistry>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/video_feed", get(video_feed_handler))
        .route("/frame.jpg", get(frame_handler))
        .route("/detections", get(detections_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { store, clients })
}

/// Bound HTTP server, ready to serve
pub struct StreamServer {
    listener: TcpListener,
    store: Arc<FrameStore>,
    clients: Arc<ClientRegistry>,
}

impl StreamServer {
    pub async fn bind(
        config: &StreamServerConfig,
        store: Arc<FrameStore>,
    ) -> Result<Self, ServerError> {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            store,
            clients: Arc::new(ClientRegistry::new(config.max_clients)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves and every open stream has ended
    ///
    /// Streams end when the store is closed, so callers should close it as
    /// part of their shutdown signal.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(
            "Serving detection stream on http://{} (max clients: {})",
            addr,
            self.clients
                .max_clients
                .map_or_else(|| "unlimited".to_string(), |max| max.to_string())
        );

        let app = router(self.store, self.clients);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>Object detection stream</title>
  </head>
  <body>
    <h1>Object detection</h1>
    <img src="video_feed" alt="live detection stream">
  </body>
</html>
"#;

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn video_feed_handler(State(state): State<AppState>) -> Response {
    let Some(guard) = state.clients.try_acquire() else {
        warn!(
            active = state.clients.active(),
            "Rejecting stream client, at capacity"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many stream clients\n").into_response();
    };

    info!(
        client = guard.id(),
        active = state.clients.active(),
        "Stream client connected"
    );

    let subscriber = state.store.subscribe();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mjpeg::CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .body(Body::from_stream(part_stream(subscriber, guard)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// One multipart chunk per new frame until the store closes or the body is
/// dropped
fn part_stream(
    subscriber: FrameSubscriber,
    guard: ClientGuard,
) -> impl futures_util::Stream<Item = Result<bytes::Bytes, Infallible>> + Send + 'static {
    futures_util::stream::unfold((subscriber, guard), |(mut subscriber, guard)| async move {
        let frame = subscriber.next().await?;
        Some((Ok(mjpeg::encode_part(&frame.jpeg)), (subscriber, guard)))
    })
}

async fn frame_handler(State(state): State<AppState>) -> Response {
    match state.store.get() {
        Some(frame) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            frame.jpeg.clone(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "No frame available yet\n").into_response(),
    }
}

#[derive(Debug, Serialize)]
struct DetectionsResponse {
    sequence: u64,
    timestamp_ms: u128,
    fps: f32,
    detections: Vec<Detection>,
}

async fn detections_handler(State(state): State<AppState>) -> Response {
    let Some(frame) = state.store.get() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "No frame available yet\n").into_response();
    };

    let timestamp_ms = frame
        .captured_at
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    Json(DetectionsResponse {
        sequence: frame.sequence,
        timestamp_ms,
        fps: frame.fps,
        detections: frame.detections.clone(),
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    frames_published: u64,
    fps: f32,
    active_clients: usize,
    total_clients: u64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.store.is_closed() {
            "stopping"
        } else {
            "ok"
        },
        version: env!("CARGO_PKG_VERSION"),
        frames_published: state.store.published_count(),
        fps: state.store.get().map_or(0.0, |frame| frame.fps),
        active_clients: state.clients.active(),
        total_clients: state.clients.total(),
    })
}
