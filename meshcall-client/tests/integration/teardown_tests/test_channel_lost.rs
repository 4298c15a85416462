use meshcall_client::{MeshError, MeshStatus};
use meshcall_core::RoomId;

use crate::integration::{
    MESH_TIMEOUT_MS, ScriptedPeer, TEST_ROOM, camera_media, init_tracing,
};
use crate::utils::{wait_for_connected_links, wait_for_status};

#[tokio::test]
async fn test_channel_lost_tears_down_mesh() {
    init_tracing();
    let peer = ScriptedPeer::joined("me").await;
    peer.connect_to("bob").await;
    peer.connect_to("carol").await;
    assert!(wait_for_connected_links(&peer.mesh, 2, MESH_TIMEOUT_MS).await);

    peer.inbox.lose("relay went away").await;

    assert!(
        wait_for_status(
            &peer.mesh,
            MeshStatus::ChannelLost("relay went away".to_owned()),
            MESH_TIMEOUT_MS
        )
        .await
    );
    assert!(peer.mesh.active_links().await.expect("links").is_empty());
    assert!(peer.mesh.remote_streams().is_empty());
    assert!(peer.mesh.participants().is_empty());
    for remote in ["bob", "carol"] {
        assert!(peer.transport.latest(remote).expect("session").is_closed());
    }

    let rejoin = peer
        .mesh
        .join_room(RoomId::from(TEST_ROOM), camera_media("me"))
        .await;
    assert!(matches!(rejoin, Err(MeshError::ChannelLost(_))));
}
