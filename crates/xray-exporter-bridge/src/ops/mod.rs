//! Operational HTTP endpoints.
//!
//! - `/healthz` : liveness of the bridge itself (upstreams are not polled)
//! - `/metrics` : poll every instance, then Prometheus text format

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::app_state::AppState;

pub const CONTENT_TYPE_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Always 200: a broken instance shows up as `server_up 0`, not as a failed scrape.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.scraper().scrape().await;

    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE_TEXT)], body).into_response()
}
