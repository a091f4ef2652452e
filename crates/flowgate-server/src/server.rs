//! `GatewayServer` — axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use flowgate_auth::IdentityResolver;
use flowgate_bus::EventBus;
use flowgate_gateway::{
    ChannelHub, EventCatalog, GatewayError, LifecycleManager, SubscriptionRegistry,
};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::ws::ws_handler;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Fan-out hub holding every open channel.
    pub hub: Arc<ChannelHub>,
    /// Subscription registry (for health reporting).
    pub registry: Arc<SubscriptionRegistry>,
    /// Lifecycle manager driving channel open/close.
    pub lifecycle: Arc<LifecycleManager>,
    /// Identity resolver for handshake credentials.
    pub resolver: Arc<dyn IdentityResolver>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// The gateway server: owns the hub, registry and lifecycle manager and
/// serves `/ws`, `/health` and `/metrics`.
pub struct GatewayServer {
    config: Arc<ServerConfig>,
    hub: Arc<ChannelHub>,
    registry: Arc<SubscriptionRegistry>,
    lifecycle: Arc<LifecycleManager>,
    resolver: Arc<dyn IdentityResolver>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl GatewayServer {
    /// Wire a server over an event bus and an identity resolver.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        bus: Arc<dyn EventBus>,
        resolver: Arc<dyn IdentityResolver>,
        metrics: PrometheusHandle,
    ) -> Self {
        let hub = Arc::new(ChannelHub::new());
        let registry = Arc::new(SubscriptionRegistry::new(
            bus,
            hub.clone(),
            EventCatalog::standard(),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(hub.clone(), registry.clone()));
        Self {
            config: Arc::new(config),
            hub,
            registry,
            lifecycle,
            resolver,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Create the global subscriptions. Call once before serving.
    pub async fn start(&self) -> Result<(), GatewayError> {
        self.registry.create_global_scope().await
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            registry: self.registry.clone(),
            lifecycle: self.lifecycle.clone(),
            resolver: self.resolver.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve. Returns the bound address and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "gateway listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "server exited with error");
            }
        });
        Ok((addr, handle))
    }

    /// Stop serving: cancel every session, then detach every
    /// subscription from the bus. Idempotent.
    pub async fn stop(&self) {
        self.shutdown.shutdown();
        self.registry.dispose_all().await;
    }

    /// The fan-out hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }

    /// The subscription registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let channels = state.hub.channel_count();
    let scopes = state.registry.identity_scope_count().await;
    Json(health::health_check(state.start_time, channels, scopes))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
