use crate::relay::RelayService;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use meshcall_core::{ParticipantId, SignalMessage};
use tracing::{error, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(participant_id): Path<String>,
    State(service): State<RelayService>,
) -> impl IntoResponse {
    let participant = ParticipantId::from(participant_id);

    ws.on_upgrade(move |socket| handle_socket(socket, participant, service))
}

async fn handle_socket(socket: WebSocket, participant: ParticipantId, service: RelayService) {
    info!("New WebSocket connection: {}", participant);

    let (mut sender, mut receiver) = socket.split();
    let connection = service.connect(participant.clone());
    let connection_id = connection.id;
    let mut outbound = connection.messages;

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize signal message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let service = service.clone();
        let participant = participant.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(signal) => service.handle_signal(&participant, signal),
                        Err(e) => warn!("Invalid signal message from {}: {}", participant, e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    service.disconnect(&participant, connection_id);
    info!("WebSocket disconnected: {}", participant);
}
