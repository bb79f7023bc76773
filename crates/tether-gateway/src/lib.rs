mod handler;
mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tether_core::AppState;

/// Connection-time handshake parameters. The claimed identity is
/// validated against the user directory before anything is registered.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandshakeParams {
    user_id: Option<String>,
}

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<HandshakeParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, params.user_id))
}
