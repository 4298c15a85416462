use crate::config::MeshConfig;
use crate::error::{MeshError, Result};
use crate::link::{
    CloseReason, LinkCommand, LinkContext, LinkEvent, LinkHandle, LinkRole, LinkSummary,
    PeerLink,
};
use crate::mesh::renegotiation::ReportReply;
use crate::mesh::{
    MeshCommand, MeshStats, MeshStatus, RemoteStreamRegistry, RenegotiationController,
    RenegotiationRequest,
};
use crate::signaling::{
    ChannelEvent, MembershipEvent, MembershipRegistry, PeerSignal, PeerSignalBody, RoomInput,
    SignalingChannel,
};
use crate::transport::{LocalMedia, LocalTrack, MediaTransport};
use meshcall_core::{ParticipantId, RoomId, SignalMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Actor owning every link of one client. All room events, signals and
/// application commands are processed sequentially here.
pub(crate) struct MeshManager {
    self_id: ParticipantId,
    config: MeshConfig,
    channel: Arc<dyn SignalingChannel>,
    channel_rx: mpsc::Receiver<ChannelEvent>,
    channel_alive: bool,
    transport: Arc<dyn MediaTransport>,
    command_rx: mpsc::Receiver<MeshCommand>,
    self_tx: mpsc::WeakSender<MeshCommand>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    links: HashMap<ParticipantId, LinkHandle>,
    next_epoch: u64,
    membership: MembershipRegistry,
    streams: RemoteStreamRegistry,
    renegotiation: RenegotiationController,
    local_media: LocalMedia,
    status: watch::Sender<MeshStatus>,
    stats: MeshStats,
}

impl MeshManager {
    pub fn new(
        self_id: ParticipantId,
        config: MeshConfig,
        channel: Arc<dyn SignalingChannel>,
        channel_rx: mpsc::Receiver<ChannelEvent>,
        transport: Arc<dyn MediaTransport>,
        command_rx: mpsc::Receiver<MeshCommand>,
        self_tx: mpsc::WeakSender<MeshCommand>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(MeshStatus::Idle);

        Self {
            membership: MembershipRegistry::new(self_id.clone()),
            self_id,
            config,
            channel,
            channel_rx,
            channel_alive: true,
            transport,
            command_rx,
            self_tx,
            link_tx,
            link_rx,
            links: HashMap::new(),
            next_epoch: 0,
            streams: RemoteStreamRegistry::new(),
            renegotiation: RenegotiationController::new(),
            local_media: LocalMedia::new(),
            status,
            stats: MeshStats::default(),
        }
    }

    pub fn subscribe_streams(&self) -> watch::Receiver<crate::mesh::RemoteStreams> {
        self.streams.subscribe()
    }

    pub fn subscribe_participants(&self) -> watch::Receiver<Vec<ParticipantId>> {
        self.membership.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MeshStatus> {
        self.status.subscribe()
    }

    pub async fn run(mut self) {
        info!("Mesh event loop started for {}", self.self_id);
        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(MeshCommand::Shutdown { reply }) => {
                            shutdown_reply = Some(reply);
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Command channel closed. Shutting down mesh.");
                            break;
                        }
                    }
                }

                evt = self.channel_rx.recv(), if self.channel_alive => {
                    match evt {
                        Some(ChannelEvent::Message(msg)) => self.on_signal_message(msg).await,
                        Some(ChannelEvent::Lost(reason)) => self.on_channel_lost(reason).await,
                        None => self.on_channel_lost("channel closed".to_owned()).await,
                    }
                }

                evt = self.link_rx.recv() => {
                    match evt {
                        Some(e) => self.handle_link_event(e).await,
                        None => {
                            warn!("Link event channel closed unexpectedly");
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.leave_room().await {
            warn!("Failed to leave room during shutdown: {}", e);
        }
        if self.channel_alive {
            self.channel.disconnect().await;
        }
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
        info!("Mesh event loop finished");
    }

    async fn handle_command(&mut self, cmd: MeshCommand) {
        match cmd {
            MeshCommand::Join { room, media, reply } => {
                let _ = reply.send(self.join_room(room, media).await);
            }

            MeshCommand::Leave { reply } => {
                let _ = reply.send(self.leave_room().await);
            }

            MeshCommand::Renegotiate { track, reply } => {
                if let Err(e) = self.ensure_joined() {
                    let _ = reply.send(Err(e));
                    return;
                }
                if self.local_media.get(track.kind).is_none() {
                    let _ = reply.send(Err(MeshError::NoTrackOfKind(track.kind)));
                    return;
                }
                self.submit_renegotiation(track, Some(reply)).await;
            }

            MeshCommand::ShareTransient {
                track,
                ended,
                reply,
            } => {
                if let Err(e) = self.ensure_joined() {
                    let _ = reply.send(Err(e));
                    return;
                }
                let prior = self.local_media.get(track.kind).cloned();
                self.renegotiation.remember_transient(&track, prior);
                self.watch_transient(track.id.clone(), ended);
                self.submit_renegotiation(track, Some(reply)).await;
            }

            MeshCommand::StopTransient { reply } => match self.renegotiation.take_restore(None) {
                Some((_, Some(prior))) => self.submit_renegotiation(prior, Some(reply)).await,
                _ => {
                    let _ = reply.send(Err(MeshError::NoTransientShare));
                }
            },

            MeshCommand::TransientEnded { track_id } => {
                match self.renegotiation.take_restore(Some(&track_id)) {
                    Some((_, Some(prior))) => {
                        info!("Transient track {} ended, restoring {}", track_id, prior.id);
                        self.submit_renegotiation(prior, None).await;
                    }
                    Some((kind, None)) => {
                        warn!(
                            "Transient track {} ended with no earlier {} track to restore",
                            track_id, kind
                        );
                    }
                    None => debug!("Transient track {} already restored", track_id),
                }
            }

            MeshCommand::ActiveLinks { reply } => {
                let _ = reply.send(self.active_links());
            }

            MeshCommand::Stats { reply } => {
                let _ = reply.send(self.stats.clone());
            }

            MeshCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn join_room(&mut self, room: RoomId, media: LocalMedia) -> Result<()> {
        if !self.channel_alive {
            return Err(MeshError::ChannelLost(
                "signaling channel is closed".to_owned(),
            ));
        }
        media.ensure_available()?;

        if self.membership.room() == Some(&room) {
            debug!("Already in room {}", room);
            return Ok(());
        }
        if self.membership.is_joined() {
            self.leave_room().await?;
        }

        self.local_media = media;
        self.membership.join(room.clone(), self.channel.as_ref()).await?;
        self.status.send_replace(MeshStatus::Joined(room));
        Ok(())
    }

    async fn leave_room(&mut self) -> Result<()> {
        self.close_all_links().await;
        self.streams.clear();
        self.renegotiation.abort(|| MeshError::NotJoined);

        if !self.membership.is_joined() {
            return Ok(());
        }

        let result = if self.channel_alive {
            self.membership
                .leave(self.channel.as_ref())
                .await
                .map(|_| ())
        } else {
            self.membership.reset();
            Ok(())
        };
        self.status.send_replace(MeshStatus::Left);
        result
    }

    fn ensure_joined(&self) -> Result<()> {
        if self.membership.is_joined() {
            Ok(())
        } else {
            Err(MeshError::NotJoined)
        }
    }

    async fn on_signal_message(&mut self, msg: SignalMessage) {
        if !self.membership.is_joined() {
            debug!("Dropping {:?} received outside a room", msg);
            self.stats.stale_messages += 1;
            return;
        }

        match self.membership.translate(msg) {
            RoomInput::Membership(MembershipEvent::Joined(participant)) => {
                self.on_participant_joined(participant).await
            }
            RoomInput::Membership(MembershipEvent::Left(participant)) => {
                self.on_participant_left(participant).await
            }
            RoomInput::Signal(signal) => self.route_signal(signal).await,
            RoomInput::Ignored => {}
        }
    }

    async fn on_participant_joined(&mut self, participant: ParticipantId) {
        if let Some(link) = self.links.get(&participant) {
            if !link.is_closed() {
                warn!(
                    "Duplicate join for {} ignored (link is {})",
                    participant,
                    link.state()
                );
                return;
            }
        }
        self.reap_link(&participant).await;

        let link = self.open_link(participant.clone(), LinkRole::Initiator);
        if !link.send(LinkCommand::Initiate).await {
            warn!("Link to {} stopped before it could offer", participant);
        }
        self.links.insert(participant, link);
    }

    async fn on_participant_left(&mut self, participant: ParticipantId) {
        let Some(link) = self.links.remove(&participant) else {
            debug!("Leave for unknown participant {} ignored", participant);
            return;
        };

        info!("{} left, closing link", participant);
        link.close().await;
        self.stats.links_closed += 1;
        self.streams.remove(&participant);
        self.renegotiation.forget(&participant);
        self.advance_renegotiation().await;
    }

    async fn route_signal(&mut self, signal: PeerSignal) {
        let PeerSignal { sender, body } = signal;

        if sender == self.self_id {
            debug!("Dropping {} addressed from ourselves", body.label());
            self.stats.stale_messages += 1;
            return;
        }

        if self.links.get(&sender).is_some_and(|link| link.is_closed()) {
            self.reap_link(&sender).await;
        }

        if let Some(link) = self.links.get(&sender) {
            let label = body.label();
            if !link.send(LinkCommand::Signal(body)).await {
                debug!("Link to {} is gone, dropping {}", sender, label);
                self.stats.stale_messages += 1;
            }
            return;
        }

        if !matches!(body, PeerSignalBody::Offer(_)) {
            debug!("Dropping {} from {} with no link", body.label(), sender);
            self.stats.stale_messages += 1;
            return;
        }

        self.membership.observe(&sender);
        let link = self.open_link(sender.clone(), LinkRole::Responder);
        if !link.send(LinkCommand::Signal(body)).await {
            warn!("Link to {} stopped before it could answer", sender);
        }
        self.links.insert(sender, link);
    }

    fn open_link(&mut self, participant: ParticipantId, role: LinkRole) -> LinkHandle {
        self.next_epoch += 1;
        self.stats.links_opened += 1;
        info!(
            "Opening link to {} as {:?} (epoch {})",
            participant, role, self.next_epoch
        );

        PeerLink::spawn(LinkContext {
            self_id: self.self_id.clone(),
            participant,
            role,
            epoch: self.next_epoch,
            transport: self.transport.clone(),
            channel: self.channel.clone(),
            local_tracks: self.local_media.tracks(),
            disconnect_grace: self.config.disconnect_grace,
            renegotiation_timeout: self.config.renegotiation_timeout,
            buffer: self.config.link_buffer,
            mesh_events: self.link_tx.clone(),
        })
    }

    /// Removes a link whose task already ended on its own.
    async fn reap_link(&mut self, participant: &ParticipantId) {
        if let Some(link) = self.links.remove(participant) {
            link.close().await;
            self.stats.links_closed += 1;
            self.streams.remove(participant);
            self.renegotiation.forget(participant);
        }
    }

    async fn close_all_links(&mut self) {
        if self.links.is_empty() {
            return;
        }

        let links: Vec<LinkHandle> = self.links.drain().map(|(_, link)| link).collect();
        info!("Closing {} links", links.len());
        self.stats.links_closed += links.len() as u64;
        futures::future::join_all(links.into_iter().map(LinkHandle::close)).await;
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::StreamReady {
                participant,
                epoch,
                stream,
            } => {
                if self.is_current(&participant, epoch) {
                    self.streams.register(participant, stream);
                }
            }

            LinkEvent::Closed {
                participant,
                epoch,
                reason,
            } => {
                if !self.is_current(&participant, epoch) {
                    return;
                }
                if let CloseReason::NegotiationFailed(_) = &reason {
                    self.stats.negotiation_failures += 1;
                }
                info!("Link to {} ended: {}", participant, reason);
                self.reap_link(&participant).await;
                self.advance_renegotiation().await;
            }

            LinkEvent::Renegotiated {
                participant,
                epoch,
                pass,
                outcome,
            } => {
                if !self.is_current(&participant, epoch) {
                    return;
                }
                if outcome.is_err() {
                    self.stats.renegotiation_failures += 1;
                }
                self.renegotiation.record(pass, &participant, outcome);
                self.advance_renegotiation().await;
            }

            LinkEvent::RenegotiationDeferred {
                participant,
                epoch,
                pass,
            } => {
                if !self.is_current(&participant, epoch) {
                    return;
                }
                self.stats.deferred_renegotiations += 1;
                self.renegotiation.record_deferred(pass, &participant);
                self.advance_renegotiation().await;
            }

            LinkEvent::Stale {
                participant, what, ..
            } => {
                debug!("Stale {} from {}", what, participant);
                self.stats.stale_messages += 1;
            }
        }
    }

    fn is_current(&self, participant: &ParticipantId, epoch: u64) -> bool {
        self.links
            .get(participant)
            .is_some_and(|link| link.epoch == epoch)
    }

    async fn on_channel_lost(&mut self, reason: String) {
        if !self.channel_alive {
            return;
        }
        error!("Signaling channel lost: {}", reason);
        self.channel_alive = false;

        self.close_all_links().await;
        self.streams.clear();
        self.membership.reset();
        let lost = reason.clone();
        self.renegotiation
            .abort(move || MeshError::ChannelLost(lost.clone()));
        self.status.send_replace(MeshStatus::ChannelLost(reason));
    }

    async fn submit_renegotiation(&mut self, track: LocalTrack, reply: Option<ReportReply>) {
        let request = RenegotiationRequest {
            kind: track.kind,
            new_track: track,
        };
        self.renegotiation.enqueue(request, reply);
        self.advance_renegotiation().await;
    }

    /// Finishes the running pass if it is complete and starts queued ones.
    async fn advance_renegotiation(&mut self) {
        self.renegotiation.finish_if_done();

        while let Some((pass, request)) = self.renegotiation.start_next() {
            let previous = self.local_media.insert(request.new_track.clone());
            info!(
                "Renegotiation pass {}: {} {} -> {}",
                pass,
                request.kind,
                previous.as_ref().map_or("none", |t| t.id.as_str()),
                request.new_track.id
            );

            // Links that are not connected yet hold the swap until they are.
            let targets: Vec<ParticipantId> = self
                .links
                .iter()
                .filter(|(_, link)| !link.is_closed())
                .map(|(participant, _)| participant.clone())
                .collect();
            self.renegotiation.wait_for(targets.iter().cloned());

            for participant in targets {
                let sent = match self.links.get(&participant) {
                    Some(link) => {
                        link.send(LinkCommand::Renegotiate {
                            pass,
                            track: request.new_track.clone(),
                        })
                        .await
                    }
                    None => false,
                };
                if !sent {
                    self.stats.renegotiation_failures += 1;
                    self.renegotiation
                        .record(pass, &participant, Err("link unavailable".to_owned()));
                }
            }

            if self.renegotiation.finish_if_done().is_none() {
                break;
            }
        }
    }

    fn watch_transient(&self, track_id: String, ended: oneshot::Receiver<()>) {
        let mesh = self.self_tx.clone();
        tokio::spawn(async move {
            // A dropped sender counts as ended.
            let _ = ended.await;
            if let Some(tx) = mesh.upgrade() {
                let _ = tx.send(MeshCommand::TransientEnded { track_id }).await;
            }
        });
    }

    fn active_links(&self) -> Vec<LinkSummary> {
        let mut links: Vec<LinkSummary> = self
            .links
            .values()
            .filter(|link| !link.is_closed())
            .map(LinkHandle::summary)
            .collect();
        links.sort_by(|a, b| a.participant.cmp(&b.participant));
        links
    }
}
