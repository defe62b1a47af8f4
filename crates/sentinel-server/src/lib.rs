//! sentinel-server
//!
//! The local credential server behind server mode. It speaks the SDK's
//! container-credentials protocol on `GET /`, re-establishes authorization
//! from the session store on every fetch, and mints through the issuer
//! with per-session single-flight. Transport is a Unix socket where the
//! platform has one (peer-credential auth) and loopback TCP with a
//! per-process bearer token otherwise.

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use sentinel_issuer::Issuer;
use sentinel_store::SessionStore;

pub mod auth;
pub mod cache;
pub mod error;
pub mod handlers;

pub use crate::auth::BearerToken;
pub use crate::error::ServerError;

use crate::cache::CredentialCache;

/// Shared state for one server instance: one issuer, one tracked session.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    issuer: Issuer,
    sessions: SessionStore,
    session_id: String,
    cache: CredentialCache,
}

impl AppState {
    pub fn new(issuer: Issuer, sessions: SessionStore, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                issuer,
                sessions,
                session_id: session_id.into(),
                cache: CredentialCache::default(),
            }),
        }
    }

    pub(crate) fn issuer(&self) -> &Issuer {
        &self.inner.issuer
    }

    pub(crate) fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub(crate) fn cache(&self) -> &CredentialCache {
        &self.inner.cache
    }
}

/// The bare route table, before transport auth is layered on.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::get_credentials))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the loopback listener. Port 0 picks an ephemeral port; the bound
/// address is on the returned listener for the caller to advertise via
/// `AWS_CONTAINER_CREDENTIALS_FULL_URI`.
pub async fn bind_loopback(port: u16) -> Result<tokio::net::TcpListener, ServerError> {
    tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| ServerError::Internal(format!("bind failed: {e}")))
}

/// Serve on loopback TCP with bearer-token auth until ctrl-c.
pub async fn serve_loopback(
    listener: tokio::net::TcpListener,
    state: AppState,
    token: BearerToken,
) -> Result<(), ServerError> {
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    tracing::info!(%addr, "credential server listening on loopback");

    let app = router(state).layer(middleware::from_fn_with_state(token, auth::require_bearer));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))
}

/// Serve on a Unix-domain socket with peer-uid auth until ctrl-c.
///
/// The socket file is created mode 0600 and any stale file from a
/// previous run is removed first.
#[cfg(unix)]
pub async fn serve_unix(
    state: AppState,
    socket_path: &std::path::Path,
) -> Result<(), ServerError> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    if socket_path.exists() {
        std::fs::remove_file(socket_path)
            .map_err(|e| ServerError::Internal(format!("stale socket: {e}")))?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ServerError::Internal(format!("socket dir: {e}")))?;
    }

    let listener = tokio::net::UnixListener::bind(socket_path)
        .map_err(|e| ServerError::Internal(format!("bind failed: {e}")))?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| ServerError::Internal(format!("socket permissions: {e}")))?;

    let own_uid = std::fs::metadata(socket_path)
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .uid();

    tracing::info!(path = %socket_path.display(), uid = own_uid, "credential server listening on unix socket");

    let app = router(state)
        .layer(middleware::from_fn_with_state(own_uid, auth::require_peer_uid));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<auth::UdsPeer>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
    }
    tracing::info!("shutting down credential server");
}
