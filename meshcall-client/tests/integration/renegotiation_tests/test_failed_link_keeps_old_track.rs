use meshcall_client::LocalTrack;
use meshcall_core::{TrackKind, TrackSource};
use meshcall_relay::RelayService;

use crate::integration::{init_tracing, spawn_room};

#[tokio::test]
async fn test_failed_link_keeps_old_track() {
    init_tracing();
    let relay = RelayService::new();
    let peers = spawn_room(&relay, &["p1", "p2", "p3"]).await;
    let camera = peers[0].camera();
    let screen = LocalTrack::sample(TrackKind::Video, TrackSource::Screen, "p1");

    // p2 can no longer apply offers on its established session.
    peers[1].transport.fail_renegotiations();

    let report = peers[0]
        .mesh
        .renegotiate(screen.clone())
        .await
        .expect("renegotiate");

    assert_eq!(report.succeeded, vec![peers[2].id.clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, peers[1].id);
    assert!(report.failed[0].1.contains("timed out"));

    let links = peers[0].mesh.active_links().await.expect("active links");
    let to_p2 = links.iter().find(|l| l.participant == peers[1].id).unwrap();
    let to_p3 = links.iter().find(|l| l.participant == peers[2].id).unwrap();
    assert_eq!(to_p2.active_tracks.get(&TrackKind::Video), Some(&camera.id));
    assert_eq!(to_p3.active_tracks.get(&TrackKind::Video), Some(&screen.id));

    let session = peers[0].transport.latest("p2").expect("session with p2");
    assert_eq!(session.sent_track(TrackKind::Video), Some(camera.id.clone()));
    assert!(!session.is_closed(), "a failed swap does not close the link");

    let stats = peers[0].mesh.stats().await.expect("stats");
    assert_eq!(stats.renegotiation_failures, 1);
}
