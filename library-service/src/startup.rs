use axum::{
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::{ClientRateLimiter, ReaperHandle};
use service_core::middleware::{
    recover::panic_response, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::auth::{Authenticator, Authorizer};
use crate::config::LibraryConfig;
use crate::handlers;
use crate::middleware::{authenticate_middleware, http_metrics_middleware, rate_limit_middleware};
use crate::services::{ConcurrencyGuard, LogMailer, Mailer};
use crate::store::{Database, MemoryStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LibraryConfig>,
    pub store: Arc<dyn Store>,
    pub authenticator: Authenticator,
    pub authorizer: Authorizer,
    pub guard: ConcurrencyGuard,
    pub limiter: Arc<ClientRateLimiter>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        config: LibraryConfig,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, AppError> {
        let deadline = config.store_timeout;
        let limiter = Arc::new(ClientRateLimiter::new(config.limiter)?);

        Ok(Self {
            authenticator: Authenticator::new(store.clone(), deadline),
            authorizer: Authorizer::new(store.clone(), deadline),
            guard: ConcurrencyGuard::new(deadline),
            config: Arc::new(config),
            store,
            limiter,
            mailer,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    with_middleware(api_routes(), state)
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/v1/info", get(handlers::health::info))
        .route("/v1/metrics", get(handlers::health::metrics_endpoint))
        .route("/v1/users", post(handlers::users::register_user))
        .route("/v1/users/activated", put(handlers::users::activate_user))
        .route(
            "/v1/tokens/activation",
            post(handlers::tokens::create_activation_token),
        )
        .route(
            "/v1/tokens/authentication",
            post(handlers::tokens::create_authentication_token),
        )
        .route(
            "/v1/events",
            get(handlers::events::list_events).post(handlers::events::create_event),
        )
        .route(
            "/v1/events/:id",
            get(handlers::events::show_event)
                .patch(handlers::events::update_event)
                .delete(handlers::events::delete_event),
        )
        .route("/v1/cards", post(handlers::cards::create_card))
        .route(
            "/v1/cards/:id",
            get(handlers::cards::show_card).patch(handlers::cards::update_card),
        )
}

/// Wrap `routes` in the request pipeline. Innermost first: panic recovery,
/// authentication, rate limiting, metrics, tracing, request id, security
/// headers, CORS.
pub fn with_middleware(routes: Router<AppState>, state: AppState) -> Router {
    let allowed_origins: Vec<HeaderValue> = state
        .config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect();

    routes
        .with_state(state.clone())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(state.clone(), authenticate_middleware))
        // Every response may depend on the caller's credentials.
        .layer(SetResponseHeaderLayer::appending(
            header::VARY,
            HeaderValue::from_static("Authorization"),
        ))
        .layer(from_fn_with_state(state, rate_limit_middleware))
        .layer(from_fn(http_metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
}

type Server = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

pub struct Application {
    port: u16,
    server: Server,
    reaper: ReaperHandle,
}

impl Application {
    pub async fn build(config: LibraryConfig) -> Result<Self, AppError> {
        let store: Arc<dyn Store> = match &config.database {
            Some(database) => {
                let db = Database::connect(database).await.map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    e
                })?;
                db.run_migrations().await?;
                Arc::new(db)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let addr = config.common.socket_addr();
        let state = AppState::new(config, store, Arc::new(LogMailer))?;
        let reaper = state.limiter.clone().spawn_reaper();
        let app = build_router(state);

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "Listening");

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::pin(server.into_future()),
            reaper,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until a shutdown signal arrives, then stop the limiter reaper.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let result = self.server.await;
        self.reaper.shutdown().await;
        result
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
