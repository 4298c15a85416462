use meshcall_client::{LinkState, LocalTrack, MeshHandle, SessionState, SignalMessage};
use meshcall_core::{ParticipantId, SessionDescription, TrackKind, TrackSource};
use meshcall_relay::RelayService;
use tokio::sync::oneshot;

use crate::integration::{MESH_TIMEOUT_MS, ScriptedPeer, init_tracing, spawn_room};
use crate::utils::{count_links_in, wait_for_connected_links, wait_for_stats, wait_until};

async fn video_towards(mesh: &MeshHandle, participant: &ParticipantId) -> Option<String> {
    let links = mesh.active_links().await.ok()?;
    links
        .into_iter()
        .find(|l| &l.participant == participant)
        .and_then(|l| l.active_tracks.get(&TrackKind::Video).cloned())
}

async fn offers_to(peer: &ScriptedPeer, target: &ParticipantId) -> usize {
    peer.channel
        .sent_to(target)
        .await
        .iter()
        .filter(|m| matches!(m, SignalMessage::Offer { .. }))
        .count()
}

#[tokio::test]
async fn test_handshaking_link_swaps_once_connected() {
    init_tracing();
    let peer = ScriptedPeer::joined("me").await;
    let carol = ParticipantId::from("carol");
    let screen = LocalTrack::sample(TrackKind::Video, TrackSource::Screen, "me");

    peer.inbox
        .deliver(SignalMessage::UserJoined(carol.clone()))
        .await;
    assert!(peer.wait_for_offer_to(&carol).await);

    let report = peer
        .mesh
        .renegotiate(screen.clone())
        .await
        .expect("renegotiate");
    assert!(report.succeeded.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.deferred, vec![carol.clone()]);

    peer.inbox
        .deliver(SignalMessage::ReceiveAnswer {
            sender_id: carol.clone(),
            answer: SessionDescription::answer("answer from carol"),
        })
        .await;

    // Once connected, the link offers again with the new track.
    let peer_ref = &peer;
    let carol_ref = &carol;
    assert!(
        wait_until(MESH_TIMEOUT_MS, || async move {
            offers_to(peer_ref, carol_ref).await == 2
        })
        .await,
        "expected a follow-up offer to carol"
    );
    peer.inbox
        .deliver(SignalMessage::ReceiveAnswer {
            sender_id: carol.clone(),
            answer: SessionDescription::answer("second answer from carol"),
        })
        .await;

    let mesh = &peer.mesh;
    let expected = screen.id.clone();
    assert!(
        wait_until(MESH_TIMEOUT_MS, || {
            let expected = expected.clone();
            async move { video_towards(mesh, carol_ref).await == Some(expected) }
        })
        .await,
        "carol link should end up sending the screen"
    );
    assert!(wait_for_connected_links(&peer.mesh, 1, MESH_TIMEOUT_MS).await);
    let session = peer.transport.latest("carol").expect("session");
    assert_eq!(session.sent_track(TrackKind::Video), Some(screen.id.clone()));
}

#[tokio::test]
async fn test_link_down_during_restore_gets_camera_back() {
    init_tracing();
    let relay = RelayService::new();
    let peers = spawn_room(&relay, &["p1", "p2"]).await;
    let camera = peers[0].camera();
    let screen = LocalTrack::sample(TrackKind::Video, TrackSource::Screen, "p1");

    let (ended_tx, ended_rx) = oneshot::channel();
    let report = peers[0]
        .mesh
        .share_transient(screen.clone(), ended_rx)
        .await
        .expect("share screen");
    assert!(report.all_succeeded());

    let session = peers[0].transport.latest("p2").expect("session");
    session.report_state(SessionState::Disconnected).await;
    let mesh = &peers[0].mesh;
    assert!(
        wait_until(MESH_TIMEOUT_MS, || async move {
            count_links_in(mesh, LinkState::Disconnected).await == 1
        })
        .await
    );

    // The share ends while the link is down; the restore has to wait for it.
    drop(ended_tx);
    assert!(
        wait_for_stats(
            &peers[0].mesh,
            |s| s.deferred_renegotiations == 1,
            MESH_TIMEOUT_MS
        )
        .await
    );
    assert_eq!(
        video_towards(&peers[0].mesh, &peers[1].id).await,
        Some(screen.id.clone())
    );

    session.report_state(SessionState::Connected).await;

    let p2 = &peers[1].id;
    let expected = camera.id.clone();
    assert!(
        wait_until(MESH_TIMEOUT_MS, || {
            let expected = expected.clone();
            async move { video_towards(mesh, p2).await == Some(expected) }
        })
        .await,
        "the recovered link should send the camera again"
    );
    assert_eq!(session.sent_track(TrackKind::Video), Some(camera.id.clone()));
    assert!(!session.is_closed());
}
