use std::net::SocketAddr;
use std::sync::Arc;

use meshcall_client::{MeshHandle, MeshStatus, WsSignalingChannel};
use meshcall_core::{ParticipantId, RoomId};
use meshcall_relay::{RelayService, router};

use crate::integration::{MESH_TIMEOUT_MS, TEST_ROOM, camera_media, init_tracing, test_config};
use crate::utils::{MockTransport, wait_for_connected_links, wait_for_status, wait_for_streams};

async fn start_relay() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind relay");
    let addr = listener.local_addr().expect("relay addr");
    tokio::spawn(async move {
        axum::serve(listener, router(RelayService::new()))
            .await
            .expect("relay server");
    });
    addr
}

async fn ws_peer(addr: SocketAddr, id: &str) -> MeshHandle {
    let participant = ParticipantId::from(id);
    let (channel, inbound) = WsSignalingChannel::connect(&format!("ws://{addr}"), &participant)
        .await
        .expect("connect to relay");
    MeshHandle::spawn(
        participant,
        test_config(),
        Arc::new(channel),
        inbound,
        Arc::new(MockTransport::new(id)),
    )
}

#[tokio::test]
async fn test_mesh_over_websocket_relay() {
    init_tracing();
    let addr = start_relay().await;

    let mut meshes = Vec::new();
    for id in ["p1", "p2", "p3"] {
        let mesh = ws_peer(addr, id).await;
        mesh.join_room(RoomId::from(TEST_ROOM), camera_media(id))
            .await
            .expect("join");
        meshes.push(mesh);
    }

    for mesh in &meshes {
        assert!(
            wait_for_connected_links(mesh, 2, MESH_TIMEOUT_MS).await,
            "{} should link to both others",
            mesh.self_id()
        );
        assert!(wait_for_streams(mesh, 2, MESH_TIMEOUT_MS).await);
    }

    meshes[2].shutdown().await.expect("shutdown p3");
    for mesh in &meshes[..2] {
        assert!(wait_for_connected_links(mesh, 1, MESH_TIMEOUT_MS).await);
    }
}

#[tokio::test]
async fn test_relay_connection_refused() {
    init_tracing();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let result =
        WsSignalingChannel::connect(&format!("ws://{addr}"), &ParticipantId::from("p1")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_status_tracks_membership() {
    init_tracing();
    let addr = start_relay().await;
    let mesh = ws_peer(addr, "solo").await;
    assert_eq!(mesh.status(), MeshStatus::Idle);

    mesh.join_room(RoomId::from(TEST_ROOM), camera_media("solo"))
        .await
        .expect("join");
    assert!(
        wait_for_status(
            &mesh,
            MeshStatus::Joined(RoomId::from(TEST_ROOM)),
            MESH_TIMEOUT_MS
        )
        .await
    );

    mesh.leave_room().await.expect("leave");
    assert_eq!(mesh.status(), MeshStatus::Left);
}
