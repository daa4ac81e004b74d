//! Forwarding to the supervised backend.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        StatusCode, Uri,
    },
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use super::SharedState;

/// Rewrite `uri` to point at `upstream`, keeping path and query.
pub fn upstream_uri(uri: &Uri, upstream: SocketAddr) -> Option<Uri> {
    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority = Some(Authority::try_from(upstream.to_string()).ok()?);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    Uri::from_parts(parts).ok()
}

/// Forward the request; an unreachable backend is a `502 Bad Gateway`.
pub async fn forward(State(state): State<SharedState>, request: Request) -> Response {
    let upstream = state.upstream();
    let (mut parts, body) = request.into_parts();

    parts.uri = match upstream_uri(&parts.uri, upstream) {
        Some(uri) => uri,
        None => return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response(),
    };

    let request = Request::from_parts(parts, body);
    match state.http_client().request(request).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::warn!(upstream = %upstream, error = %e, "backend unreachable");
            (
                StatusCode::BAD_GATEWAY,
                format!("Backend server on {} is not responding", upstream),
            )
                .into_response()
        }
    }
}
