use std::sync::Arc;

use meshcall_client::{LinkState, MediaTransport, MeshHandle, RtcTransport};
use meshcall_core::{ParticipantId, RoomId, SdpType};
use meshcall_relay::RelayService;

use crate::integration::{TEST_ROOM, camera_media, init_tracing, test_config};
use crate::utils::{LoopbackChannel, count_links_in, wait_until};

/// Real peer connections take longer than the mock ones.
const RTC_TIMEOUT_MS: u64 = 10_000;

#[tokio::test]
async fn test_rtc_sessions_negotiate_media_sections() {
    init_tracing();
    let transport = RtcTransport::new(&test_config()).expect("rtc transport");

    let alice = transport
        .open_session(&ParticipantId::from("bob"), &camera_media("alice").tracks())
        .await
        .expect("alice session");
    let bob = transport
        .open_session(&ParticipantId::from("alice"), &camera_media("bob").tracks())
        .await
        .expect("bob session");

    let offer = alice.session.create_offer().await.expect("offer");
    assert_eq!(offer.kind, SdpType::Offer);
    assert!(offer.sdp.contains("m=audio"));
    assert!(offer.sdp.contains("m=video"));

    bob.session
        .set_remote_description(offer)
        .await
        .expect("apply offer");
    let answer = bob.session.create_answer().await.expect("answer");
    assert_eq!(answer.kind, SdpType::Answer);

    alice
        .session
        .set_remote_description(answer)
        .await
        .expect("apply answer");

    alice.session.close().await.expect("close alice");
    bob.session.close().await.expect("close bob");
}

fn rtc_peer(relay: &RelayService, id: &str) -> MeshHandle {
    let participant = ParticipantId::from(id);
    let (channel, inbound) = LoopbackChannel::connect(relay, &participant);
    let transport = RtcTransport::new(&test_config()).expect("rtc transport");
    MeshHandle::spawn(
        participant,
        test_config(),
        Arc::new(channel),
        inbound,
        Arc::new(transport),
    )
}

#[tokio::test]
#[ignore = "needs a host network interface for ICE"]
async fn test_rtc_mesh_connects() {
    init_tracing();
    let relay = RelayService::new();
    let first = rtc_peer(&relay, "alice");
    let second = rtc_peer(&relay, "bob");

    first
        .join_room(RoomId::from(TEST_ROOM), camera_media("alice"))
        .await
        .expect("alice joins");
    second
        .join_room(RoomId::from(TEST_ROOM), camera_media("bob"))
        .await
        .expect("bob joins");

    for mesh in [&first, &second] {
        assert!(
            wait_until(RTC_TIMEOUT_MS, || async move {
                count_links_in(mesh, LinkState::Connected).await == 1
            })
            .await,
            "{} should connect over webrtc",
            mesh.self_id()
        );
    }

    first.shutdown().await.expect("shutdown alice");
    second.shutdown().await.expect("shutdown bob");
}
