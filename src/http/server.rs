//! Edge HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router and wire middleware (request ID, tracing,
//!   preflight short-circuit, body limit, load shedding)
//! - Serve over plain TCP or TLS
//! - Forward non-preflight requests to the upstream
//! - Apply hot-reloaded settings without dropping connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::{EdgeConfig, ServerConfig};
use crate::http::cors::{CorsPolicy, CorsPolicyError};
use crate::http::request;
use crate::http::upstream::{self, ForwardTarget, Upstream, UpstreamClient, UpstreamError};
use crate::lifecycle::shutdown::{self, GRACE_PERIOD};
use crate::net::InFlightTracker;
use crate::observability::metrics;

/// Error building runtime settings from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Cors(#[from] CorsPolicyError),
}

/// Error while serving.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings that may change on reload.
#[derive(Debug, Clone)]
pub struct EdgeSettings {
    pub upstream: Upstream,
    pub cors: CorsPolicy,
    pub forwarded_proto: String,
    pub upstream_timeout: Duration,
}

impl EdgeSettings {
    pub fn from_config(config: &EdgeConfig) -> Result<Self, SettingsError> {
        Ok(Self {
            upstream: Upstream::parse(&config.upstream)?,
            cors: CorsPolicy::from_config(&config.cors)?,
            forwarded_proto: config.effective_forwarded_proto().to_string(),
            upstream_timeout: Duration::from_secs(config.timeouts.upstream_secs),
        })
    }

    fn target(&self) -> ForwardTarget<'_> {
        ForwardTarget {
            upstream: &self.upstream,
            forwarded_proto: &self.forwarded_proto,
            timeout: self.upstream_timeout,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct EdgeState {
    pub settings: Arc<ArcSwap<EdgeSettings>>,
    pub client: UpstreamClient,
    pub in_flight: InFlightTracker,
}

/// TLS-terminating edge proxy.
pub struct EdgeServer {
    router: Router,
    state: EdgeState,
    config: EdgeConfig,
    tls: Option<RustlsConfig>,
}

impl EdgeServer {
    /// Create a new edge server. Call [`EdgeServer::with_tls`] to serve HTTPS.
    pub fn new(config: EdgeConfig) -> Result<Self, SettingsError> {
        let settings = EdgeSettings::from_config(&config)?;
        let state = EdgeState {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            client: upstream::build_client(Duration::from_secs(config.timeouts.connect_secs)),
            in_flight: InFlightTracker::new(config.max_connections),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
            tls: None,
        })
    }

    /// Serve HTTPS with the given certificate material.
    pub fn with_tls(mut self, tls: RustlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &EdgeConfig, state: EdgeState) -> Router {
        Router::new()
            .route("/", any(forward_handler))
            .route("/{*path}", any(forward_handler))
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(state.clone(), shed_load))
            .layer(RequestBodyLimitLayer::new(config.max_body_size))
            .layer(request::propagate_request_id_layer())
            .layer(middleware::from_fn_with_state(state, preflight))
            .layer(TraceLayer::new_for_http().make_span_with(request::make_span))
            .layer(request::set_request_id_layer())
    }

    /// The router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Currently active settings.
    pub fn settings(&self) -> Arc<EdgeSettings> {
        self.state.settings.load_full()
    }

    /// Handle to the live settings, for reload from outside `run`.
    pub fn settings_handle(&self) -> Arc<ArcSwap<EdgeSettings>> {
        Arc::clone(&self.state.settings)
    }

    /// Run the server on `listener` until `shutdown` fires.
    ///
    /// Configuration received on `config_updates` replaces the reloadable
    /// settings; listener and TLS changes are ignored with a warning.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServeError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            tls = self.tls.is_some(),
            upstream = %self.state.settings.load().upstream,
            "Edge server starting"
        );

        tokio::spawn(apply_updates(
            Arc::clone(&self.state.settings),
            self.config.clone(),
            config_updates,
        ));

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        match self.tls {
            None => {
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown::wait(shutdown))
                    .await?;
            }
            Some(tls) => {
                let handle = axum_server::Handle::new();
                let trigger = handle.clone();
                tokio::spawn(async move {
                    shutdown::wait(shutdown).await;
                    trigger.graceful_shutdown(Some(GRACE_PERIOD));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, tls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
        }

        tracing::info!("Edge server stopped");
        Ok(())
    }
}

/// Swap in settings from each received configuration.
async fn apply_updates(
    settings: Arc<ArcSwap<EdgeSettings>>,
    running: EdgeConfig,
    mut updates: mpsc::UnboundedReceiver<ServerConfig>,
) {
    while let Some(config) = updates.recv().await {
        let edge = config.edge;
        if edge.bind_address != running.bind_address
            || edge.tls != running.tls
            || edge.max_connections != running.max_connections
            || edge.max_body_size != running.max_body_size
            || edge.timeouts.connect_secs != running.timeouts.connect_secs
        {
            tracing::warn!("Listener, TLS, limit or connect timeout changes require a restart");
        }

        match EdgeSettings::from_config(&edge) {
            Ok(new_settings) => {
                tracing::info!(upstream = %new_settings.upstream, "Edge settings reloaded");
                settings.store(Arc::new(new_settings));
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected reloaded settings, keeping current");
            }
        }
    }
}

/// Answer every `OPTIONS` request locally.
async fn preflight(
    State(state): State<EdgeState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        tracing::debug!(path = %request.uri().path(), "Answering preflight");
        metrics::record_preflight();
        return state.settings.load().cors.preflight_response();
    }
    next.run(request).await
}

/// Reject requests once the in-flight ceiling is reached.
///
/// The slot is held until the response body has been fully sent.
async fn shed_load(
    State(state): State<EdgeState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(guard) = state.in_flight.try_acquire() else {
        tracing::warn!(
            limit = state.in_flight.limit(),
            "In-flight limit reached, shedding request"
        );
        metrics::record_upstream_error("overloaded");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many in-flight requests").into_response();
    };

    let (parts, body) = next.run(request).await.into_parts();
    let body = body.map_frame(move |frame| {
        let _held = &guard;
        frame
    });
    Response::from_parts(parts, Body::new(body))
}

/// Forward a request to the upstream and relay its response.
async fn forward_handler(
    State(state): State<EdgeState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let settings = state.settings.load_full();

    match upstream::forward(&state.client, &settings.target(), client_addr, request).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), start_time);
            response
        }
        Err(e) if !e.is_upstream_fault() => {
            tracing::warn!(error = %e, client = %client_addr, "Rejected request");
            metrics::record_request(&method, e.status().as_u16(), start_time);
            e.into_response()
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                upstream = %settings.upstream,
                client = %client_addr,
                "Upstream error"
            );
            metrics::record_upstream_error(e.reason());
            metrics::record_request(&method, e.status().as_u16(), start_time);
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn edge_config() -> EdgeConfig {
        EdgeConfig {
            bind_address: "127.0.0.1:0".into(),
            ..EdgeConfig::default()
        }
    }

    #[tokio::test]
    async fn preflight_never_reaches_upstream() {
        // Default upstream (127.0.0.1:8080) is not expected to be running; a
        // forwarded request would fail, the preflight must not.
        let server = EdgeServer::new(edge_config()).unwrap();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/compile")
                    .header("origin", "https://example.com")
                    .header("access-control-request-method", "POST")
                    .body(Body::from("ignored"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert!(response.headers().get("x-request-id").is_none());
    }

    #[test]
    fn settings_follow_config() {
        let mut config = edge_config();
        config.upstream = "http://10.0.0.5:9000".into();
        config.forwarded_proto = Some("https".into());
        config.timeouts.upstream_secs = 5;

        let server = EdgeServer::new(config).unwrap();
        let settings = server.settings();
        assert_eq!(settings.upstream.to_string(), "http://10.0.0.5:9000");
        assert_eq!(settings.forwarded_proto, "https");
        assert_eq!(settings.upstream_timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_upstream_is_rejected() {
        let mut config = edge_config();
        config.upstream = "https://10.0.0.5".into();
        assert!(matches!(
            EdgeServer::new(config),
            Err(SettingsError::Upstream(UpstreamError::Scheme(_)))
        ));
    }

    #[tokio::test]
    async fn reload_swaps_settings() {
        let server = EdgeServer::new(edge_config()).unwrap();
        let handle = server.settings_handle();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(apply_updates(handle.clone(), edge_config(), rx));

        let mut updated = ServerConfig::default();
        updated.edge = edge_config();
        updated.edge.upstream = "http://127.0.0.1:9999".into();
        updated.edge.cors.max_age_secs = 60;
        tx.send(updated).unwrap();

        let mut bad = ServerConfig::default();
        bad.edge.upstream = "ftp://nope".into();
        tx.send(bad).unwrap();
        drop(tx);
        task.await.unwrap();

        let settings = handle.load();
        assert_eq!(settings.upstream.to_string(), "http://127.0.0.1:9999");
        let preflight = settings.cors.preflight_response();
        assert_eq!(preflight.headers()["access-control-max-age"], "60");
    }
}
