use meshcall_client::{LinkRole, LinkState, TrackKind};
use meshcall_relay::RelayService;

use crate::integration::{MESH_TIMEOUT_MS, init_tracing, spawn_room};
use crate::utils::wait_for_streams;

#[tokio::test]
async fn test_full_mesh_forms() {
    init_tracing();
    let relay = RelayService::new();

    let peers = spawn_room(&relay, &["p1", "p2", "p3", "p4"]).await;

    for peer in &peers {
        assert!(
            wait_for_streams(&peer.mesh, 3, MESH_TIMEOUT_MS).await,
            "{} should hold a stream per remote participant",
            peer.id
        );

        let links = peer.mesh.active_links().await.expect("active links");
        assert_eq!(links.len(), 3);
        assert!(links.iter().all(|l| l.state == LinkState::Connected));
        assert!(links.iter().all(|l| l.participant != peer.id));

        let streams = peer.mesh.remote_streams();
        for (participant, stream) in &streams {
            assert_eq!(stream.tracks.len(), 2, "stream from {participant}");
            assert!(stream.track(TrackKind::Video).is_some());
        }
    }

    // Whoever was already present initiates towards the newcomer.
    let first = &peers[0];
    let links = first.mesh.active_links().await.expect("active links");
    assert!(links.iter().all(|l| l.role == LinkRole::Initiator));

    let last = &peers[3];
    let links = last.mesh.active_links().await.expect("active links");
    assert!(links.iter().all(|l| l.role == LinkRole::Responder));
    assert_eq!(last.mesh.participants().len(), 3);
}
