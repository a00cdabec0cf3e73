use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    extract::FromRef,
    middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use tollgate_auth::{
    AuthResult, ClientCache, CredentialAuthority, CredentialStore, DeadlineStore,
    MemoryCredentialStore, OAuthState, SystemClock, TokenBatchWriter, revoke_handler,
    token_handler, validate_handler,
};
use tollgate_auth_postgres::PostgresCredentialStore;

use crate::config::{AppConfig, ServerConfig, StorageBackend};
use crate::{handlers, middleware as app_middleware};

// =============================================================================
// Router
// =============================================================================

/// Router state. Handlers extract the parts they need through [`FromRef`].
#[derive(Clone, FromRef)]
pub struct AppState {
    pub oauth: OAuthState,
    /// Cancelled when the supervisor begins shutting down.
    pub shutdown: CancellationToken,
    pub storage_backend: &'static str,
}

pub fn build_app(state: AppState, cfg: &ServerConfig) -> Router {
    let router = Router::new()
        // Health endpoints
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // OAuth endpoints
        .route("/oauth/token", post(token_handler))
        .route("/oauth/validate", post(validate_handler))
        .route("/oauth/revoke", post(revoke_handler))
        .with_state(state);
    with_transport_layers(router, cfg)
}

/// Wraps `router` in the transport middleware stack.
///
/// Outermost first: body limit, request id, panic catcher, trace.
pub fn with_transport_layers(router: Router, cfg: &ServerConfig) -> Router {
    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(CatchPanicLayer::custom(app_middleware::panic_response))
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(cfg.body_limit_bytes))
}

// =============================================================================
// Supervisor
// =============================================================================

/// Owns the long-lived components and tears them down in order.
pub struct Supervisor {
    root: CancellationToken,
    shutting_down: AtomicBool,
    shutdown_started: CancellationToken,
    store: DeadlineStore,
    authority: Arc<CredentialAuthority>,
    step_timeout: Duration,
}

impl Supervisor {
    /// Builds storage, cache, batch writer and authority, in that order.
    ///
    /// `store` overrides the configured backend.
    pub async fn start(
        config: &AppConfig,
        store: Option<Arc<dyn CredentialStore>>,
    ) -> anyhow::Result<Self> {
        let root = CancellationToken::new();
        let backend = match store {
            Some(store) => store,
            None => open_store(config).await?,
        };
        let store = DeadlineStore::new(backend, root.clone(), config.storage.timeouts());

        let cache = Arc::new(ClientCache::new(&config.auth.cache));
        let batch = Arc::new(TokenBatchWriter::new(&config.auth.batch, store.clone()));
        let authority = Arc::new(CredentialAuthority::new(
            &config.auth,
            cache,
            store.clone(),
            batch,
            Arc::new(SystemClock),
        ));

        tracing::info!(
            storage = store.backend_name(),
            durability = ?config.auth.batch.durability,
            cache_max_size = config.auth.cache.max_size,
            "Token service started"
        );

        Ok(Self {
            root,
            shutting_down: AtomicBool::new(false),
            shutdown_started: CancellationToken::new(),
            store,
            authority,
            step_timeout: config.server.shutdown_timeout,
        })
    }

    pub fn authority(&self) -> &Arc<CredentialAuthority> {
        &self.authority
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_started.is_cancelled()
    }

    /// Stops the batch writer (final flush), the cache sweep and storage,
    /// then cancels the root token. Each step is bounded by the shutdown
    /// timeout. Only the first call tears down and returns `true`; concurrent
    /// and later calls return `false` immediately.
    pub async fn shutdown(&self) -> bool {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown_started.cancel();
        tracing::info!("Shutting down token service");

        if let Some(written) = self
            .step("token batch writer", self.authority.batch().stop())
            .await
        {
            tracing::info!(written, "Write-behind buffer flushed");
        }
        self.step("client cache", self.authority.cache().stop()).await;
        self.step("storage", async {
            self.store.close().await;
            Ok(())
        })
        .await;
        self.root.cancel();

        tracing::info!("Token service stopped");
        true
    }

    async fn step<T>(
        &self,
        component: &'static str,
        stop: impl Future<Output = AuthResult<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.step_timeout, stop).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(component, error = %e, "Shutdown step failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    component,
                    timeout_ms = self.step_timeout.as_millis() as u64,
                    "Shutdown step timed out"
                );
                None
            }
        }
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            let store = MemoryCredentialStore::new();
            for client in &config.storage.clients {
                store.insert_client(client.clone());
            }
            if config.storage.clients.is_empty() {
                tracing::warn!("Memory storage has no registered clients");
            }
            Ok(Arc::new(store))
        }
        StorageBackend::Postgres => {
            let store = PostgresCredentialStore::connect(&config.storage.postgres)
                .await
                .context("failed to connect to PostgreSQL")?;
            store
                .ensure_schema()
                .await
                .context("failed to create credential tables")?;
            Ok(Arc::new(store))
        }
    }
}

// =============================================================================
// Server
// =============================================================================

pub struct TollgateServer {
    addr: SocketAddr,
    app: Router,
    supervisor: Arc<Supervisor>,
    drain_timeout: Duration,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<Arc<dyn CredentialStore>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses `store` instead of opening the configured backend.
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> anyhow::Result<TollgateServer> {
        let supervisor = Arc::new(Supervisor::start(&self.config, self.store).await?);
        let oauth = OAuthState::new(
            Arc::clone(supervisor.authority()),
            &self.config.server.resource_header,
        )?;
        let state = AppState {
            oauth,
            shutdown: supervisor.shutdown_started.clone(),
            storage_backend: supervisor.store.backend_name(),
        };
        let app = build_app(state, &self.config.server);

        Ok(TollgateServer {
            addr: self.addr,
            app,
            supervisor,
            drain_timeout: self.config.server.shutdown_timeout,
        })
    }
}

impl TollgateServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Serves on the configured address until Ctrl+C or SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `signal` resolves, then shuts the token
    /// service down and drains in-flight requests within the shutdown
    /// timeout.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            app,
            supervisor,
            drain_timeout,
            ..
        } = self;
        tracing::info!("listening on {}", listener.local_addr()?);

        let drain = CancellationToken::new();
        let graceful = drain.clone().cancelled_owned();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
        });

        tokio::select! {
            () = signal => {}
            exited = &mut server => {
                supervisor.shutdown().await;
                exited??;
                return Ok(());
            }
        }

        supervisor.shutdown().await;
        drain.cancel();
        match tokio::time::timeout(drain_timeout, &mut server).await {
            Ok(exited) => exited??,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "In-flight requests did not drain in time"
                );
                server.abort();
            }
        }
        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
