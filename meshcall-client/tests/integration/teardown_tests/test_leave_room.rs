use meshcall_client::{MeshStatus, SignalMessage};
use meshcall_core::{ParticipantId, SessionDescription};
use meshcall_relay::RelayService;

use crate::integration::{MESH_TIMEOUT_MS, ScriptedPeer, init_tracing, spawn_room};
use crate::utils::{wait_for_connected_links, wait_for_stats};

#[tokio::test]
async fn test_leave_closes_every_link() {
    init_tracing();
    let relay = RelayService::new();
    let peers = spawn_room(&relay, &["p1", "p2", "p3"]).await;

    peers[0].mesh.leave_room().await.expect("leave");

    assert_eq!(peers[0].mesh.status(), MeshStatus::Left);
    assert!(peers[0].mesh.active_links().await.expect("links").is_empty());
    assert!(peers[0].mesh.remote_streams().is_empty());
    assert!(peers[0].mesh.participants().is_empty());
    for remote in ["p2", "p3"] {
        let session = peers[0].transport.latest(remote).expect("session");
        assert!(session.is_closed());
    }

    for peer in &peers[1..] {
        assert!(wait_for_connected_links(&peer.mesh, 1, MESH_TIMEOUT_MS).await);
    }

    // Leaving twice is harmless.
    peers[0].mesh.leave_room().await.expect("second leave");
    assert_eq!(peers[0].mesh.status(), MeshStatus::Left);
}

#[tokio::test]
async fn test_signals_after_leave_are_stale() {
    init_tracing();
    let peer = ScriptedPeer::joined("me").await;
    peer.connect_to("bob").await;
    assert!(wait_for_connected_links(&peer.mesh, 1, MESH_TIMEOUT_MS).await);

    peer.mesh.leave_room().await.expect("leave");
    assert!(
        peer.channel
            .sent()
            .await
            .iter()
            .any(|m| matches!(m, SignalMessage::LeaveRoom))
    );

    peer.inbox
        .deliver(SignalMessage::ReceiveOffer {
            sender_id: ParticipantId::from("bob"),
            offer: SessionDescription::offer("too late"),
        })
        .await;

    assert!(wait_for_stats(&peer.mesh, |s| s.stale_messages == 1, MESH_TIMEOUT_MS).await);
    assert!(peer.mesh.active_links().await.expect("links").is_empty());
    assert_eq!(peer.transport.sessions_for("bob").len(), 1);
}
