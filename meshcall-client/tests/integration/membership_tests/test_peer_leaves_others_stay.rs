use meshcall_relay::RelayService;

use crate::integration::{MESH_TIMEOUT_MS, init_tracing, spawn_room};
use crate::utils::{wait_for_connected_links, wait_for_streams};

#[tokio::test]
async fn test_peer_leaves_others_stay() {
    init_tracing();
    let relay = RelayService::new();
    let peers = spawn_room(&relay, &["p1", "p2", "p3"]).await;

    peers[1].mesh.leave_room().await.expect("leave");

    for peer in [&peers[0], &peers[2]] {
        assert!(wait_for_connected_links(&peer.mesh, 1, MESH_TIMEOUT_MS).await);
        assert!(wait_for_streams(&peer.mesh, 1, MESH_TIMEOUT_MS).await);
        assert!(!peer.mesh.remote_streams().contains_key(&peers[1].id));
        assert!(!peer.mesh.participants().contains(&peers[1].id));

        let session = peer.transport.latest("p2").expect("session with p2");
        assert!(session.is_closed(), "{} should close its p2 session", peer.id);
    }

    let stats = peers[0].mesh.stats().await.expect("stats");
    assert_eq!(stats.links_opened, 2);
    assert_eq!(stats.links_closed, 1);
}
