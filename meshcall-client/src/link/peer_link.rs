use crate::link::{CloseReason, LinkCommand, LinkEvent, LinkHandle, LinkRole, LinkState};
use crate::signaling::{PeerSignalBody, SignalingChannel};
use crate::transport::{
    LocalTrack, MediaSession, MediaTransport, RemoteStream, SessionState, TransportEvent,
};
use anyhow::Context;
use meshcall_core::{IceCandidate, ParticipantId, SessionDescription, SignalMessage, TrackKind};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

/// Everything a link task needs from the mesh that spawned it.
pub(crate) struct LinkContext {
    pub self_id: ParticipantId,
    pub participant: ParticipantId,
    pub role: LinkRole,
    pub epoch: u64,
    pub transport: Arc<dyn MediaTransport>,
    pub channel: Arc<dyn SignalingChannel>,
    pub local_tracks: Vec<LocalTrack>,
    pub disconnect_grace: Duration,
    pub renegotiation_timeout: Duration,
    pub buffer: usize,
    pub mesh_events: mpsc::UnboundedSender<LinkEvent>,
}

/// Published by the link task, read by the mesh without a round trip.
#[derive(Debug, Clone)]
pub(crate) struct LinkStatus {
    pub state: LinkState,
    pub role: LinkRole,
    pub active_tracks: BTreeMap<TrackKind, String>,
}

struct PendingRenegotiation {
    pass: u64,
    track: LocalTrack,
    previous: Option<LocalTrack>,
    deadline: Instant,
}

/// Negotiation state machine for the link to one remote participant.
///
/// Owns the media session; all signals for the participant are processed here in
/// arrival order. Remote candidates are held back until both descriptions are applied.
pub(crate) struct PeerLink {
    self_id: ParticipantId,
    participant: ParticipantId,
    role: LinkRole,
    epoch: u64,
    transport: Arc<dyn MediaTransport>,
    channel: Arc<dyn SignalingChannel>,
    disconnect_grace: Duration,
    renegotiation_timeout: Duration,
    mesh_events: mpsc::UnboundedSender<LinkEvent>,
    commands: mpsc::Receiver<LinkCommand>,
    status: watch::Sender<LinkStatus>,

    session: Option<Box<dyn MediaSession>>,
    transport_events: Option<mpsc::Receiver<TransportEvent>>,
    active_tracks: BTreeMap<TrackKind, LocalTrack>,
    pending_candidates: VecDeque<IceCandidate>,
    descriptions_applied: bool,
    transport_connected: bool,
    remote_stream: Option<RemoteStream>,
    renegotiation: Option<PendingRenegotiation>,
    deferred: BTreeMap<TrackKind, (u64, LocalTrack)>,
    grace_deadline: Option<Instant>,
    close_reason: Option<CloseReason>,
}

impl PeerLink {
    pub(crate) fn spawn(ctx: LinkContext) -> LinkHandle {
        let (command_tx, command_rx) = mpsc::channel(ctx.buffer);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let active_tracks: BTreeMap<TrackKind, LocalTrack> = ctx
            .local_tracks
            .into_iter()
            .map(|track| (track.kind, track))
            .collect();
        let (status, status_rx) = watch::channel(LinkStatus {
            state: LinkState::Idle,
            role: ctx.role,
            active_tracks: track_ids(&active_tracks),
        });

        let link = PeerLink {
            self_id: ctx.self_id,
            participant: ctx.participant.clone(),
            role: ctx.role,
            epoch: ctx.epoch,
            transport: ctx.transport,
            channel: ctx.channel,
            disconnect_grace: ctx.disconnect_grace,
            renegotiation_timeout: ctx.renegotiation_timeout,
            mesh_events: ctx.mesh_events,
            commands: command_rx,
            status,
            session: None,
            transport_events: None,
            active_tracks,
            pending_candidates: VecDeque::new(),
            descriptions_applied: false,
            transport_connected: false,
            remote_stream: None,
            renegotiation: None,
            deferred: BTreeMap::new(),
            grace_deadline: None,
            close_reason: None,
        };

        let task = tokio::spawn(link.run(cancel_rx));

        LinkHandle::new(
            ctx.participant,
            ctx.epoch,
            command_tx,
            cancel_tx,
            status_rx,
            task,
        )
    }

    async fn run(mut self, mut cancel: oneshot::Receiver<()>) {
        debug!(
            "Link to {} started as {:?} (epoch {})",
            self.participant, self.role, self.epoch
        );

        tokio::select! {
            _ = self.event_loop() => {}
            _ = &mut cancel => {
                self.close_reason.get_or_insert(CloseReason::Cancelled);
            }
        }

        self.shutdown().await;
    }

    async fn event_loop(&mut self) {
        if let Err(e) = self.open_session().await {
            self.fail(e.context("failed to open media session"));
            return;
        }

        while self.close_reason.is_none() {
            let renegotiation_deadline = self.renegotiation.as_ref().map(|r| r.deadline);

            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            self.close_reason = Some(CloseReason::Cancelled);
                        }
                    }
                }

                evt = next_transport_event(&mut self.transport_events) => {
                    match evt {
                        Some(e) => self.handle_transport_event(e).await,
                        None => {
                            debug!("Transport events for {} ended", self.participant);
                            self.transport_events = None;
                        }
                    }
                }

                _ = sleep_until_deadline(self.grace_deadline) => {
                    warn!(
                        "Link to {} did not recover within {:?}",
                        self.participant, self.disconnect_grace
                    );
                    self.grace_deadline = None;
                    self.close_reason = Some(CloseReason::GraceExpired);
                }

                _ = sleep_until_deadline(renegotiation_deadline) => {
                    warn!("Renegotiation with {} timed out", self.participant);
                    self.revert_renegotiation("timed out waiting for answer").await;
                }
            }

            self.apply_deferred().await;
        }
    }

    async fn open_session(&mut self) -> anyhow::Result<()> {
        let tracks: Vec<LocalTrack> = self.active_tracks.values().cloned().collect();
        let opened = self
            .transport
            .open_session(&self.participant, &tracks)
            .await?;

        self.session = Some(opened.session);
        self.transport_events = Some(opened.events);
        self.descriptions_applied = false;
        self.transport_connected = false;
        Ok(())
    }

    /// Drops the current session and starts a fresh one with the same tracks.
    async fn reopen_session(&mut self) -> anyhow::Result<()> {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!("Closing superseded session for {}: {:#}", self.participant, e);
            }
        }
        self.transport_events = None;
        self.open_session().await
    }

    async fn handle_command(&mut self, cmd: LinkCommand) {
        match cmd {
            LinkCommand::Initiate => self.start_offer().await,
            LinkCommand::Signal(PeerSignalBody::Offer(offer)) => self.on_remote_offer(offer).await,
            LinkCommand::Signal(PeerSignalBody::Answer(answer)) => {
                self.on_remote_answer(answer).await
            }
            LinkCommand::Signal(PeerSignalBody::Candidate(candidate)) => {
                self.on_remote_candidate(candidate).await
            }
            LinkCommand::Renegotiate { pass, track } => {
                self.begin_renegotiation(pass, track).await
            }
        }
    }

    async fn start_offer(&mut self) {
        if self.state() != LinkState::Idle {
            warn!(
                "Ignoring initiate for {} in state {}",
                self.participant,
                self.state()
            );
            return;
        }

        match self.create_offer().await {
            Ok(offer) => {
                self.transition(LinkState::OfferSent);
                self.send_signal(SignalMessage::Offer {
                    target_id: self.participant.clone(),
                    offer,
                })
                .await;
            }
            Err(e) => self.fail(e.context("failed to create offer")),
        }
    }

    async fn on_remote_offer(&mut self, offer: SessionDescription) {
        match self.state() {
            LinkState::Idle => self.answer_offer(offer).await,

            LinkState::OfferSent => {
                // Offers crossed. The lower id keeps its offer; the other side yields.
                if self.self_id < self.participant {
                    info!(
                        "Offer glare with {}: keeping our offer",
                        self.participant
                    );
                    self.report_stale("glaring offer");
                    return;
                }

                info!("Offer glare with {}: answering theirs", self.participant);
                if let Err(e) = self.reopen_session().await {
                    self.fail(e.context("failed to reopen session after glare"));
                    return;
                }
                self.role = LinkRole::Responder;
                self.status
                    .send_modify(|status| status.role = LinkRole::Responder);
                self.answer_offer(offer).await;
            }

            LinkState::Connected => self.answer_renegotiation(offer).await,

            LinkState::Renegotiating => {
                if self.self_id < self.participant {
                    info!(
                        "Renegotiation glare with {}: keeping our offer",
                        self.participant
                    );
                    self.report_stale("glaring renegotiation offer");
                    return;
                }
                self.revert_renegotiation("superseded by remote offer").await;
                self.answer_renegotiation(offer).await;
            }

            state => {
                warn!(
                    "Dropping offer from {} received in state {}",
                    self.participant, state
                );
                self.report_stale("offer");
            }
        }
    }

    async fn answer_offer(&mut self, offer: SessionDescription) {
        self.transition(LinkState::OfferReceived);

        if let Err(e) = self.set_remote_description(offer).await {
            self.fail(e.context("failed to apply remote offer"));
            return;
        }

        let answer = match self.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                self.fail(e.context("failed to create answer"));
                return;
            }
        };

        self.descriptions_applied = true;
        self.transition(LinkState::AnswerExchanged);
        self.send_signal(SignalMessage::Answer {
            target_id: self.participant.clone(),
            answer,
        })
        .await;
        self.flush_candidates().await;

        if self.transport_connected {
            self.mark_connected();
        }
    }

    /// Answers an offer on an established link. Failure leaves the previous
    /// configuration in place.
    async fn answer_renegotiation(&mut self, offer: SessionDescription) {
        self.transition(LinkState::Renegotiating);

        let result = match self.set_remote_description(offer).await {
            Ok(()) => self.create_answer().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(answer) => {
                self.send_signal(SignalMessage::Answer {
                    target_id: self.participant.clone(),
                    answer,
                })
                .await;
                debug!("Answered renegotiation from {}", self.participant);
            }
            Err(e) => warn!(
                "Failed to answer renegotiation from {}: {:#}",
                self.participant, e
            ),
        }

        if self.state() == LinkState::Renegotiating {
            self.transition(LinkState::Connected);
        }
    }

    async fn on_remote_answer(&mut self, answer: SessionDescription) {
        match self.state() {
            LinkState::OfferSent => {
                if let Err(e) = self.set_remote_description(answer).await {
                    self.fail(e.context("failed to apply remote answer"));
                    return;
                }

                self.descriptions_applied = true;
                self.transition(LinkState::AnswerExchanged);
                self.flush_candidates().await;

                if self.transport_connected {
                    self.mark_connected();
                }
            }

            LinkState::Renegotiating if self.renegotiation.is_some() => {
                if let Err(e) = self.set_remote_description(answer).await {
                    let reason = format!("failed to apply answer: {e:#}");
                    self.revert_renegotiation(&reason).await;
                    return;
                }

                let Some(pending) = self.renegotiation.take() else {
                    return;
                };
                info!(
                    "Renegotiation pass {} with {} now sends {}",
                    pending.pass, self.participant, pending.track.id
                );
                self.active_tracks.insert(pending.track.kind, pending.track);
                self.publish_tracks();
                self.transition(LinkState::Connected);
                self.emit(LinkEvent::Renegotiated {
                    participant: self.participant.clone(),
                    epoch: self.epoch,
                    pass: pending.pass,
                    outcome: Ok(()),
                });
            }

            state => {
                debug!(
                    "Dropping answer from {} received in state {}",
                    self.participant, state
                );
                self.report_stale("answer");
            }
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        if !self.descriptions_applied {
            debug!(
                "Buffering ICE candidate from {} ({} pending)",
                self.participant,
                self.pending_candidates.len() + 1
            );
            self.pending_candidates.push_back(candidate);
            return;
        }

        if let Err(e) = self.add_ice_candidate(candidate).await {
            warn!("Failed to add ICE candidate from {}: {:#}", self.participant, e);
        }
    }

    async fn flush_candidates(&mut self) {
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = self.add_ice_candidate(candidate).await {
                warn!(
                    "Failed to add buffered ICE candidate from {}: {:#}",
                    self.participant, e
                );
            }
        }
    }

    async fn begin_renegotiation(&mut self, pass: u64, track: LocalTrack) {
        match self.state() {
            LinkState::Connected => self.start_swap(pass, track).await,
            LinkState::Closed => {
                self.report_renegotiated(pass, Err("link is closed".to_owned()));
            }
            state => {
                debug!(
                    "Holding pass {} ({}) for {} until connected (link is {})",
                    pass, track.id, self.participant, state
                );
                self.deferred.insert(track.kind, (pass, track));
                self.emit(LinkEvent::RenegotiationDeferred {
                    participant: self.participant.clone(),
                    epoch: self.epoch,
                    pass,
                });
            }
        }
    }

    /// Starts swaps held while the link was not connected, newest per kind.
    async fn apply_deferred(&mut self) {
        while self.close_reason.is_none() && self.state() == LinkState::Connected {
            let Some((_, (pass, track))) = self.deferred.pop_first() else {
                return;
            };
            if self
                .active_tracks
                .get(&track.kind)
                .is_some_and(|active| active.id == track.id)
            {
                debug!("{} already sends {}", self.participant, track.id);
                continue;
            }
            info!(
                "Applying held pass {} to {}: {}",
                pass, self.participant, track.id
            );
            self.start_swap(pass, track).await;
        }
    }

    async fn start_swap(&mut self, pass: u64, track: LocalTrack) {
        let previous = self.active_tracks.get(&track.kind).cloned();
        if let Err(e) = self.replace_track(&track).await {
            self.report_renegotiated(pass, Err(format!("failed to swap track: {e:#}")));
            return;
        }

        self.transition(LinkState::Renegotiating);

        match self.create_offer().await {
            Ok(offer) => {
                debug!(
                    "Renegotiation pass {} offering {} to {}",
                    pass, track.id, self.participant
                );
                self.renegotiation = Some(PendingRenegotiation {
                    pass,
                    track,
                    previous,
                    deadline: Instant::now() + self.renegotiation_timeout,
                });
                self.send_signal(SignalMessage::Offer {
                    target_id: self.participant.clone(),
                    offer,
                })
                .await;
            }
            Err(e) => {
                self.restore_track(previous).await;
                self.transition(LinkState::Connected);
                self.report_renegotiated(pass, Err(format!("failed to create offer: {e:#}")));
            }
        }
    }

    /// Abandons the in-flight renegotiation and puts the previous track back.
    async fn revert_renegotiation(&mut self, reason: &str) {
        let Some(pending) = self.renegotiation.take() else {
            return;
        };

        warn!(
            "Renegotiation pass {} with {} failed: {}",
            pending.pass, self.participant, reason
        );
        self.restore_track(pending.previous).await;
        if self.state() == LinkState::Renegotiating {
            self.transition(LinkState::Connected);
        }
        self.report_renegotiated(pending.pass, Err(reason.to_owned()));
    }

    /// Puts the previous track back and keeps the in-flight swap for when the
    /// transport recovers.
    async fn hold_renegotiation(&mut self) {
        let Some(pending) = self.renegotiation.take() else {
            return;
        };

        info!(
            "Transport to {} dropped during pass {}, holding {}",
            self.participant, pending.pass, pending.track.id
        );
        self.restore_track(pending.previous).await;
        let pass = pending.pass;
        self.deferred
            .entry(pending.track.kind)
            .or_insert((pass, pending.track));
        self.emit(LinkEvent::RenegotiationDeferred {
            participant: self.participant.clone(),
            epoch: self.epoch,
            pass,
        });
    }

    async fn restore_track(&self, previous: Option<LocalTrack>) {
        let Some(track) = previous else { return };
        if let Err(e) = self.replace_track(&track).await {
            warn!(
                "Failed to restore {} towards {}: {:#}",
                track.id, self.participant, e
            );
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::CandidateGenerated(candidate) => {
                self.send_signal(SignalMessage::IceCandidate {
                    target_id: self.participant.clone(),
                    candidate,
                })
                .await;
            }

            TransportEvent::TrackReceived(track) => {
                let stream = self
                    .remote_stream
                    .get_or_insert_with(|| RemoteStream::new(track.stream_id.clone()));
                stream.upsert(track);

                if self.state().is_established() {
                    self.publish_stream();
                }
            }

            TransportEvent::StateChanged(state) => self.on_session_state(state).await,
        }
    }

    async fn on_session_state(&mut self, state: SessionState) {
        match state {
            SessionState::Connecting => {}

            SessionState::Connected => {
                self.transport_connected = true;
                match self.state() {
                    LinkState::AnswerExchanged => self.mark_connected(),
                    LinkState::Disconnected => {
                        info!("Link to {} recovered", self.participant);
                        self.grace_deadline = None;
                        self.transition(LinkState::Connected);
                    }
                    _ => {}
                }
            }

            SessionState::Disconnected | SessionState::Failed => {
                self.transport_connected = false;
                if matches!(self.state(), LinkState::Disconnected | LinkState::Closed) {
                    return;
                }

                warn!(
                    "Transport to {} reported {:?}, waiting {:?} for recovery",
                    self.participant, state, self.disconnect_grace
                );
                self.hold_renegotiation().await;
                self.transition(LinkState::Disconnected);
                self.grace_deadline = Some(Instant::now() + self.disconnect_grace);
            }

            SessionState::Closed => {
                self.close_reason.get_or_insert(CloseReason::TransportClosed);
            }
        }
    }

    fn mark_connected(&mut self) {
        info!("Link to {} connected", self.participant);
        self.transition(LinkState::Connected);
        self.publish_stream();
    }

    fn publish_stream(&self) {
        let Some(stream) = &self.remote_stream else {
            return;
        };
        self.emit(LinkEvent::StreamReady {
            participant: self.participant.clone(),
            epoch: self.epoch,
            stream: stream.clone(),
        });
    }

    fn fail(&mut self, err: anyhow::Error) {
        error!("Negotiation with {} failed: {:#}", self.participant, err);
        self.close_reason = Some(CloseReason::NegotiationFailed(format!("{err:#}")));
    }

    async fn shutdown(mut self) {
        let reason = self.close_reason.take().unwrap_or(CloseReason::Cancelled);

        if !self.pending_candidates.is_empty() {
            debug!(
                "Discarding {} buffered candidates from {}",
                self.pending_candidates.len(),
                self.participant
            );
            self.pending_candidates.clear();
        }

        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Failed to close session with {}: {:#}", self.participant, e);
            }
        }

        self.transition(LinkState::Closed);
        info!("Link to {} closed: {}", self.participant, reason);

        self.emit(LinkEvent::Closed {
            participant: self.participant.clone(),
            epoch: self.epoch,
            reason,
        });
    }

    fn state(&self) -> LinkState {
        self.status.borrow().state
    }

    fn transition(&self, next: LinkState) {
        let current = self.state();
        if current == next {
            return;
        }
        if !current.can_transition(next) {
            warn!(
                "Unexpected link transition for {}: {} -> {}",
                self.participant, current, next
            );
        }
        debug!("Link to {}: {} -> {}", self.participant, current, next);
        self.status.send_modify(|status| status.state = next);
    }

    fn publish_tracks(&self) {
        let ids = track_ids(&self.active_tracks);
        self.status.send_modify(|status| status.active_tracks = ids);
    }

    fn report_stale(&self, what: &'static str) {
        self.emit(LinkEvent::Stale {
            participant: self.participant.clone(),
            epoch: self.epoch,
            what,
        });
    }

    fn report_renegotiated(&self, pass: u64, outcome: Result<(), String>) {
        self.emit(LinkEvent::Renegotiated {
            participant: self.participant.clone(),
            epoch: self.epoch,
            pass,
            outcome,
        });
    }

    fn emit(&self, event: LinkEvent) {
        // The mesh stops listening only once it is shutting down.
        let _ = self.mesh_events.send(event);
    }

    async fn send_signal(&self, msg: SignalMessage) {
        if let Err(e) = self.channel.send(msg).await {
            warn!("Failed to signal {}: {}", self.participant, e);
        }
    }

    fn session(&self) -> anyhow::Result<&dyn MediaSession> {
        self.session
            .as_deref()
            .context("media session is not open")
    }

    async fn create_offer(&self) -> anyhow::Result<SessionDescription> {
        self.session()?.create_offer().await
    }

    async fn create_answer(&self) -> anyhow::Result<SessionDescription> {
        self.session()?.create_answer().await
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> anyhow::Result<()> {
        self.session()?.set_remote_description(desc).await
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()> {
        self.session()?.add_ice_candidate(candidate).await
    }

    async fn replace_track(&self, track: &LocalTrack) -> anyhow::Result<()> {
        self.session()?.replace_track(track).await
    }
}

fn track_ids(tracks: &BTreeMap<TrackKind, LocalTrack>) -> BTreeMap<TrackKind, String> {
    tracks
        .iter()
        .map(|(kind, track)| (*kind, track.id.clone()))
        .collect()
}

async fn next_transport_event(
    events: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
