//! Backend HTTP server setup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::backend::compiler::Compiler;
use crate::backend::cors;
use crate::backend::handlers::{self, BackendState};
use crate::backend::store::ResultStore;
use crate::config::BackendConfig;
use crate::http::request;
use crate::http::server::ServeError;
use crate::lifecycle::shutdown;

/// Compilation service behind the edge.
pub struct BackendServer {
    router: Router,
    store: ResultStore,
    config: BackendConfig,
}

impl BackendServer {
    /// `version` is shown on the index page.
    pub fn new(config: &BackendConfig, compiler: Arc<dyn Compiler>, version: String) -> Self {
        let store = ResultStore::new();
        let state = BackendState {
            compiler,
            store: store.clone(),
            permits: Arc::new(Semaphore::new(config.compiler.max_concurrent)),
            version: Arc::from(version),
        };

        Self {
            router: Self::build_router(config, state),
            store,
            config: config.clone(),
        }
    }

    /// `/compile` is bounded by the compiler timeout instead of the request
    /// timeout, so every compilation it starts is stored.
    #[allow(deprecated)]
    fn build_router(config: &BackendConfig, state: BackendState) -> Router {
        let lookups = Router::new()
            .route("/", get(handlers::index))
            .route("/status/{id}", get(handlers::status))
            .route("/artifacts/{id}", get(handlers::artifacts))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)));

        let router = Router::new()
            .route("/compile", post(handlers::compile))
            .merge(lookups)
            .with_state(state);

        cors::apply(router, config.variant)
            .layer(RequestBodyLimitLayer::new(config.max_body_size))
            .layer(request::propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(request::make_span))
            .layer(request::set_request_id_layer())
    }

    /// The router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Stored compilation results.
    pub fn store(&self) -> ResultStore {
        self.store.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServeError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            variant = ?self.config.variant,
            max_concurrent = self.config.compiler.max_concurrent,
            "Backend server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("Backend server stopped");
        Ok(())
    }
}
