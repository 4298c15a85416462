use meshcall_client::{LocalTrack, MeshHandle};
use meshcall_core::{TrackKind, TrackSource};
use meshcall_relay::RelayService;
use tokio::sync::oneshot;

use crate::integration::{MESH_TIMEOUT_MS, init_tracing, spawn_room};
use crate::utils::wait_until;

async fn video_on_all_links(mesh: &MeshHandle, track_id: &str) -> bool {
    wait_until(MESH_TIMEOUT_MS, || async move {
        mesh.active_links().await.is_ok_and(|links| {
            !links.is_empty()
                && links.iter().all(|l| {
                    l.active_tracks.get(&TrackKind::Video).map(String::as_str) == Some(track_id)
                })
        })
    })
    .await
}

#[tokio::test]
async fn test_transient_share_restores_camera() {
    init_tracing();
    let relay = RelayService::new();
    let peers = spawn_room(&relay, &["p1", "p2", "p3"]).await;
    let camera = peers[0].camera();
    let screen = LocalTrack::sample(TrackKind::Video, TrackSource::Screen, "p1");
    assert!(screen.is_transient());

    let (ended_tx, ended_rx) = oneshot::channel();
    let report = peers[0]
        .mesh
        .share_transient(screen.clone(), ended_rx)
        .await
        .expect("share screen");
    assert!(report.all_succeeded());
    assert!(video_on_all_links(&peers[0].mesh, &screen.id).await);

    // The capture stopping on its own is signalled by the sender going away.
    drop(ended_tx);

    assert!(
        video_on_all_links(&peers[0].mesh, &camera.id).await,
        "camera should come back once the share ends"
    );
    for remote in ["p2", "p3"] {
        let session = peers[0].transport.latest(remote).expect("session");
        assert_eq!(session.sent_track(TrackKind::Video), Some(camera.id.clone()));
    }
}

#[tokio::test]
async fn test_stop_transient_restores_camera() {
    init_tracing();
    let relay = RelayService::new();
    let peers = spawn_room(&relay, &["p1", "p2"]).await;
    let camera = peers[0].camera();
    let screen = LocalTrack::sample(TrackKind::Video, TrackSource::Screen, "p1");

    let (_ended_tx, ended_rx) = oneshot::channel();
    peers[0]
        .mesh
        .share_transient(screen.clone(), ended_rx)
        .await
        .expect("share screen");

    let report = peers[0].mesh.stop_transient().await.expect("stop share");
    assert_eq!(report.track_id, camera.id);
    assert_eq!(report.succeeded, vec![peers[1].id.clone()]);
    assert!(video_on_all_links(&peers[0].mesh, &camera.id).await);
}

#[tokio::test]
async fn test_second_share_still_restores_camera() {
    init_tracing();
    let relay = RelayService::new();
    let peers = spawn_room(&relay, &["p1", "p2"]).await;
    let camera = peers[0].camera();
    let first = LocalTrack::sample(TrackKind::Video, TrackSource::Screen, "p1");
    let second = LocalTrack::sample(TrackKind::Video, TrackSource::Screen, "p1");

    let (first_tx, first_rx) = oneshot::channel();
    peers[0]
        .mesh
        .share_transient(first.clone(), first_rx)
        .await
        .expect("first share");
    let (second_tx, second_rx) = oneshot::channel();
    peers[0]
        .mesh
        .share_transient(second.clone(), second_rx)
        .await
        .expect("second share");
    assert!(video_on_all_links(&peers[0].mesh, &second.id).await);

    drop(second_tx);
    assert!(
        video_on_all_links(&peers[0].mesh, &camera.id).await,
        "ending the replacement share should bring the camera back"
    );

    drop(first_tx);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(video_on_all_links(&peers[0].mesh, &camera.id).await);
    let session = peers[0].transport.latest("p2").expect("session");
    assert_eq!(session.sent_track(TrackKind::Video), Some(camera.id.clone()));
}
