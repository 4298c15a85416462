use crate::config::RelayConfig;
use crate::relay::{RelayService, ws_handler};
use axum::routing::get;
use axum::{Json, Router};
use meshcall_core::RoomId;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedRoom {
    room_id: RoomId,
}

async fn generate_room() -> Json<GeneratedRoom> {
    Json(GeneratedRoom {
        room_id: RoomId::generate(),
    })
}

/// `/ws/{participant_id}` for signaling, `GET /generate-room` for fresh room ids.
pub fn router(service: RelayService) -> Router {
    Router::new()
        .route("/ws/{participant_id}", get(ws_handler))
        .route("/generate-room", get(generate_room))
        .with_state(service)
}

/// Runs the relay until the listener fails.
pub async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("Relay listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(RelayService::new())).await?;
    Ok(())
}
