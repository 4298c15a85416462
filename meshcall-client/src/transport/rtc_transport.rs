use crate::config::MeshConfig;
use crate::transport::{
    LocalTrack, MediaSession, MediaTransport, OpenedSession, RemoteTrack, SessionState,
    TransportEvent,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use meshcall_core::{IceCandidate, ParticipantId, SdpType, SessionDescription, TrackKind};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

const SESSION_EVENT_BUFFER: usize = 64;

/// Media transport backed by webrtc-rs peer connections.
pub struct RtcTransport {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl RtcTransport {
    pub fn new(config: &MeshConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        Ok(Self { api, ice_servers })
    }
}

#[async_trait]
impl MediaTransport for RtcTransport {
    async fn open_session(
        &self,
        participant: &ParticipantId,
        tracks: &[LocalTrack],
    ) -> Result<OpenedSession> {
        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let peer_connection = Arc::new(self.api.new_peer_connection(rtc_config).await?);

        for track in tracks {
            peer_connection
                .add_track(track.handle.clone())
                .await
                .with_context(|| format!("failed to attach local track {}", track.id))?;
        }

        let (event_tx, event_rx) = mpsc::channel(SESSION_EVENT_BUFFER);

        let state_tx = event_tx.clone();
        let uid_state = participant.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let uid = uid_state.clone();

                Box::pin(async move {
                    debug!("Peer connection state for {}: {}", uid, s);
                    let state = match s {
                        RTCPeerConnectionState::Connecting => SessionState::Connecting,
                        RTCPeerConnectionState::Connected => SessionState::Connected,
                        RTCPeerConnectionState::Disconnected => SessionState::Disconnected,
                        RTCPeerConnectionState::Failed => SessionState::Failed,
                        RTCPeerConnectionState::Closed => SessionState::Closed,
                        _ => return,
                    };
                    let _ = tx.send(TransportEvent::StateChanged(state)).await;
                })
            },
        ));

        let ice_tx = event_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                };
                let _ = tx.send(TransportEvent::CandidateGenerated(candidate)).await;
            })
        }));

        let track_tx = event_tx;
        let uid_track = participant.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            let uid = uid_track.clone();

            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    other => {
                        warn!("Ignoring remote track of kind {:?} from {}", other, uid);
                        return;
                    }
                };
                info!("Remote {} track {} arrived from {}", kind, track.id(), uid);
                let remote = RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                    handle: Some(track),
                };
                let _ = tx.send(TransportEvent::TrackReceived(remote)).await;
            })
        }));

        Ok(OpenedSession {
            session: Box::new(RtcSession {
                participant: participant.clone(),
                peer_connection,
            }),
            events: event_rx,
        })
    }
}

pub struct RtcSession {
    participant: ParticipantId,
    peer_connection: Arc<RTCPeerConnection>,
}

#[async_trait]
impl MediaSession for RtcSession {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = match desc.kind {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        };
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn replace_track(&self, track: &LocalTrack) -> Result<()> {
        let wanted = match track.kind {
            TrackKind::Audio => RTPCodecType::Audio,
            TrackKind::Video => RTPCodecType::Video,
        };

        for sender in self.peer_connection.get_senders().await {
            let Some(current) = sender.track().await else {
                continue;
            };
            if current.kind() == wanted {
                sender.replace_track(Some(track.handle.clone())).await?;
                debug!("Replaced {} sender towards {}", track.kind, self.participant);
                return Ok(());
            }
        }

        // No sender of this kind yet; the renegotiation that follows announces it.
        self.peer_connection.add_track(track.handle.clone()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
