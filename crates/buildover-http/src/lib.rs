//! # buildover-http
//!
//! The HTTP face of BuildOver: a reverse proxy that injects the chat widget
//! into the upstream app's HTML, plus the control routes and control
//! WebSocket the widget talks to.
//!
//! ```text
//! browser ──► /buildover/*    control routes (sessions, diff, branches, widget.js)
//!         ──► /buildover/ws   control channel ──► agent adapters
//!         ──► anything else   upstream app (HTML gets the widget tag)
//! ```

pub mod config;
pub mod inject;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::{normalize_target_url, ServerConfig, CONTROL_PREFIX};
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use proxy::proxy_handler;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Handle to a running server.
pub struct HttpServerHandle {
    local_addr: SocketAddr,
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HttpServerHandle {
    /// The bound address (useful when the configured port was 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop every live agent, then shut the server down gracefully.
    pub async fn stop(&mut self) {
        self.state.agents.stop_all();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Control routes plus the proxy fallback.
///
/// A control path hit with a method it does not serve is proxied like any
/// other request.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/buildover/widget.js",
            get(routes::widget).fallback(proxy_handler),
        )
        .route(
            "/buildover/session",
            post(routes::create_session).fallback(proxy_handler),
        )
        .route(
            "/buildover/session/{id}",
            get(routes::get_session).fallback(proxy_handler),
        )
        .route(
            "/buildover/sessions",
            get(routes::list_sessions).fallback(proxy_handler),
        )
        .route(
            "/buildover/session/{id}/end",
            post(routes::end_session).fallback(proxy_handler),
        )
        .route("/buildover/diff", get(routes::diff).fallback(proxy_handler))
        .route(
            "/buildover/branches",
            get(routes::branches).fallback(proxy_handler),
        )
        .route(
            "/buildover/ws",
            get(websocket::ws_handler).fallback(proxy_handler),
        )
        .route_layer(cors)
        .fallback(proxy_handler)
        .with_state(state)
}

/// Bind and start serving on the current tokio runtime.
pub async fn start(config: ServerConfig) -> Result<HttpServerHandle, ServerError> {
    let state = Arc::new(AppState::new(config)?);
    start_with_state(state).await
}

/// Like [`start`], for callers that built the [`AppState`] themselves.
pub async fn start_with_state(state: Arc<AppState>) -> Result<HttpServerHandle, ServerError> {
    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
        addr: addr.clone(),
        source,
    })?;

    let app = router(Arc::clone(&state));
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    log::info!("BuildOver listening on http://{}", local_addr);
    log::info!("Proxying to {}", state.config.target_url);
    log::info!("Project root: {}", state.config.project_root.display());

    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                log::info!("HTTP server shutting down");
            })
            .await;

        if let Err(e) = result {
            log::error!("HTTP server error: {}", e);
        }
    });

    Ok(HttpServerHandle {
        local_addr,
        state,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}
