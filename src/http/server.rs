//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, body limit, body read/write timeouts)
//! - Bind server to listener
//! - Start health checking while serving, stop it on shutdown
//! - Dispatch every request to the routing core

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::{RequestBodyTimeoutLayer, ResponseBodyTimeoutLayer};

use crate::config::ProxyConfig;
use crate::http::forward::{append_forwarded_for, HttpForwarder};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, trace_layer};
use crate::lifecycle::shutdown::signalled;
use crate::load_balancer::pool::PoolError;
use crate::routing::RoutingCore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RoutingCore>,
}

/// HTTP server for the load-balancing proxy.
pub struct HttpServer {
    router: Router,
    core: Arc<RoutingCore>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, PoolError> {
        let forwarder = Arc::new(HttpForwarder::new(&config.timeouts));
        let core = Arc::new(RoutingCore::from_config(&config, forwarder)?);
        Ok(Self::with_core(core, &config))
    }

    /// Create a server around an already-built routing core.
    pub fn with_core(core: Arc<RoutingCore>, config: &ProxyConfig) -> Self {
        let state = AppState { core: core.clone() };
        let router = Self::build_router(config, state);
        Self { router, core }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(trace_layer())
                    .layer(propagate_request_id_layer())
                    .layer(RequestBodyLimitLayer::new(config.limits.max_request_body_size))
                    .layer(RequestBodyTimeoutLayer::new(Duration::from_secs(
                        config.timeouts.read_secs,
                    )))
                    .layer(ResponseBodyTimeoutLayer::new(Duration::from_secs(
                        config.timeouts.write_secs,
                    ))),
            )
    }

    pub fn core(&self) -> &Arc<RoutingCore> {
        &self.core
    }

    /// Run the server, accepting connections on the given listener until shutdown.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            algorithm = %self.core.algorithm(),
            "HTTP server starting"
        );

        self.core.start_health_checking();

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(signalled(shutdown))
            .await;

        self.core.stop_health_checking();
        served?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
) -> Response {
    append_forwarded_for(request.headers_mut(), peer.ip());
    state.core.handle(request).await.into_response()
}
