use meshcall_client::SignalMessage;
use meshcall_core::{IceCandidate, ParticipantId, SessionDescription};

use crate::integration::{MESH_TIMEOUT_MS, ScriptedPeer, init_tracing};
use crate::utils::{wait_for_connected_links, wait_for_stats};

#[tokio::test]
async fn test_signals_without_link_are_dropped() {
    init_tracing();
    let peer = ScriptedPeer::joined("me").await;

    peer.inbox
        .deliver(SignalMessage::ReceiveAnswer {
            sender_id: ParticipantId::from("nobody"),
            answer: SessionDescription::answer("stray"),
        })
        .await;
    peer.inbox
        .deliver(SignalMessage::ReceiveIceCandidate {
            sender_id: ParticipantId::from("nobody"),
            candidate: IceCandidate::new("candidate:stray"),
        })
        .await;

    assert!(
        wait_for_stats(&peer.mesh, |s| s.stale_messages == 2, MESH_TIMEOUT_MS).await
    );
    assert!(peer.mesh.active_links().await.expect("links").is_empty());
    assert_eq!(peer.transport.session_count(), 0);
}

#[tokio::test]
async fn test_duplicate_answer_is_stale() {
    init_tracing();
    let peer = ScriptedPeer::joined("me").await;
    peer.connect_to("bob").await;
    assert!(wait_for_connected_links(&peer.mesh, 1, MESH_TIMEOUT_MS).await);

    peer.inbox
        .deliver(SignalMessage::ReceiveAnswer {
            sender_id: ParticipantId::from("bob"),
            answer: SessionDescription::answer("late duplicate"),
        })
        .await;

    assert!(
        wait_for_stats(&peer.mesh, |s| s.stale_messages == 1, MESH_TIMEOUT_MS).await
    );
    assert!(wait_for_connected_links(&peer.mesh, 1, MESH_TIMEOUT_MS).await);
    let log = peer.transport.latest("bob").expect("session").log();
    assert_eq!(
        log.iter().filter(|entry| *entry == "remote:answer").count(),
        1
    );
}
