//! Development server with live reload via Server-Sent Events.

use axum::{
    body::Body,
    extract::State,
    handler::Handler,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::get,
    Router,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use super::{proxy, DevConfig, DevEvent, SharedState, ROUTE_PREFIX};
use crate::error::{CliError, Result, ResultExt};
use crate::ui;

const CLIENT_SCRIPT: &str = include_str!("../../assets/dev/reload-client.js");

pub struct DevServer {
    config: DevConfig,
    state: SharedState,
}

impl DevServer {
    pub fn new(config: DevConfig, state: SharedState) -> Self {
        Self { config, state }
    }

    /// Bind and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured address cannot be bound.
    pub async fn start(self) -> Result<()> {
        let addr = self.config.addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| CliError::Server(format!("Failed to bind to {}: {}", addr, e)))
            .with_hint("Another process may be using the port; set DUPLEX_PORTS__DEV_SERVER")?;

        ui::success(&format!(
            "Development server running at {}",
            self.config.server_url()
        ));

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| CliError::Server(format!("Server error: {}", e)))
    }
}

/// Own routes first, then files from the frontend output, then the backend.
pub fn router(state: SharedState) -> Router {
    let backend = proxy::forward.with_state(state.clone());
    let files = ServeDir::new(state.out_dir()).fallback(backend);

    Router::new()
        .route(&format!("{}/events", ROUTE_PREFIX), get(handle_events))
        .route(&format!("{}/client.js", ROUTE_PREFIX), get(handle_client_script))
        .fallback_service(files)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn handle_events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (id, rx) = state.register_client();
    tracing::debug!(client = id, "reload client connected");
    state.broadcast(&DevEvent::Connected { id });

    let stream = ReceiverStream::new(rx).map(|data| Ok(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

async fn handle_client_script() -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/javascript")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(CLIENT_SCRIPT))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
