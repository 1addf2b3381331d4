//! `HuddleServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use huddle_hub::RoomRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse, ReadinessResponse};
use crate::presence::{self, RoomInfo};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::websocket::upgrade::ws_upgrade;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Room registry shared by the front door and presence queries.
    pub registry: RoomRegistry,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The hub server.
pub struct HuddleServer {
    config: Arc<ServerConfig>,
    registry: RoomRegistry,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
}

impl HuddleServer {
    /// Create a server with a fresh, empty registry.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let registry = RoomRegistry::new();
        Self {
            config: Arc::new(config),
            shutdown: Arc::new(ShutdownCoordinator::new(registry.clone())),
            registry,
            metrics,
        }
    }

    /// Handler state snapshot.
    pub fn state(&self) -> AppState {
        AppState {
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws/{room_name}", get(ws_upgrade))
            .route("/rooms/{room_name}/info", get(room_info_handler))
            .route("/healthz", get(health_handler))
            .route("/readyz", get(ready_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// The task ends once the shutdown token fires and in-flight HTTP
    /// requests finish.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(%local_addr, "huddle server listening");
        Ok((local_addr, handle))
    }

    /// Stop accepting connections, close every live session and wait for
    /// them and `handles` to finish, bounded by `shutdown_timeout`.
    pub async fn shutdown_gracefully(&self, handles: Vec<JoinHandle<()>>) -> ShutdownReport {
        let report = self
            .shutdown
            .graceful_shutdown(handles, self.config.shutdown_timeout)
            .await;
        info!(
            sessions = report.sessions_closed,
            clean = report.is_clean(),
            "shutdown complete"
        );
        report
    }

    /// Get the room registry.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /rooms/{room_name}/info
async fn room_info_handler(
    Path(room_name): Path<String>,
    State(state): State<AppState>,
) -> Json<RoomInfo> {
    Json(presence::room_info(&state.registry, &room_name))
}

/// GET /healthz
async fn health_handler() -> Json<HealthResponse> {
    Json(health::health_check())
}

/// GET /readyz
async fn ready_handler(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let resp = health::readiness(state.shutdown.is_shutting_down());
    let status = if resp.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(resp))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use huddle_hub::Session;
    use tower::ServiceExt;

    fn make_server() -> HuddleServer {
        HuddleServer::new(ServerConfig::default(), crate::metrics::detached_handle())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.registry().room_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (status, body) = get_json(make_server().router(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn readyz_flips_on_shutdown() {
        let server = make_server();
        let (status, body) = get_json(server.router(), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");

        let _ = server.shutdown().begin();
        let (status, body) = get_json(server.router(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "shutting_down");
    }

    #[tokio::test]
    async fn room_info_for_unknown_room_is_zero() {
        let server = make_server();
        let (status, body) = get_json(server.router(), "/rooms/ghost/info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["room_name"], "ghost");
        assert_eq!(body["active_connections"], 0);
        assert!(!server.registry().contains_room("ghost"));
    }

    #[tokio::test]
    async fn room_info_counts_members() {
        let server = make_server();
        let (a, _rx_a) = Session::new("lobby", 4);
        let (b, _rx_b) = Session::new("lobby", 4);
        let _ = server.registry().join(&a);
        let _ = server.registry().join(&b);

        let (_, body) = get_json(server.router(), "/rooms/lobby/info").await;
        assert_eq!(body["active_connections"], 2);
    }

    #[tokio::test]
    async fn metrics_endpoint_is_text() {
        let app = make_server().router();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        let report = server.shutdown_gracefully(vec![handle]).await;
        assert!(report.is_clean());
        assert!(server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn shutdown_closes_joined_sessions() {
        let server = make_server();
        let (session, _rx) = Session::new("lobby", 4);
        let (room, _) = server.registry().join(&session);

        // Stand-in for the session task: leave once asked to close.
        let leaver = tokio::spawn(async move {
            session.closed().await;
            let _ = session.begin_closing();
            let _ = room.leave(&session);
        });

        let report = server.shutdown_gracefully(Vec::new()).await;
        leaver.await.unwrap();
        assert_eq!(report.sessions_closed, 1);
        assert!(report.is_clean());
        assert_eq!(server.registry().session_count(), 0);
        assert!(!server.registry().contains_room("lobby"));
    }
}
