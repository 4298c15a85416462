use meshcall_client::SignalMessage;
use meshcall_core::{ParticipantId, SessionDescription};

use crate::integration::{MESH_TIMEOUT_MS, ScriptedPeer, init_tracing};
use crate::utils::{wait_for_connected_links, wait_for_stats};

#[tokio::test]
async fn test_negotiation_failure_closes_link() {
    init_tracing();
    let peer = ScriptedPeer::joined("me").await;
    peer.connect_to("bob").await;
    assert!(wait_for_connected_links(&peer.mesh, 1, MESH_TIMEOUT_MS).await);

    peer.transport.fail_remote_descriptions();
    peer.inbox
        .deliver(SignalMessage::ReceiveOffer {
            sender_id: ParticipantId::from("carol"),
            offer: SessionDescription::offer("broken offer"),
        })
        .await;

    assert!(
        wait_for_stats(&peer.mesh, |s| s.negotiation_failures == 1, MESH_TIMEOUT_MS).await,
        "failed negotiation should be counted"
    );

    let links = peer.mesh.active_links().await.expect("active links");
    assert_eq!(links.len(), 1, "other links are unaffected");
    assert_eq!(links[0].participant, ParticipantId::from("bob"));

    let carol = peer.transport.latest("carol").expect("session with carol");
    assert!(carol.is_closed());
    assert!(
        peer.channel
            .sent_to(&ParticipantId::from("carol"))
            .await
            .is_empty()
    );
}
