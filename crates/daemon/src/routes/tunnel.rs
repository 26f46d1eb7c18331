//! `GET /tunnel/status` (§4.B, §6).

use axum::extract::State;
use axum::response::Response;
use imagebridge_wire::http_api::TunnelStatusResponse;

use crate::routes::support::ok_json;
use crate::state::AppState;

pub async fn status(State(state): State<AppState>) -> Response {
    let url = state.tunnel.url().await;
    ok_json(TunnelStatusResponse { url, running: state.tunnel.running(), port: state.tunnel.port() })
}
