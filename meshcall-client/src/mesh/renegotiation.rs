use crate::error::{MeshError, Result};
use crate::transport::LocalTrack;
use meshcall_core::{ParticipantId, TrackKind};
use std::collections::{BTreeSet, VecDeque};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub(crate) type ReportReply = oneshot::Sender<Result<RenegotiationReport>>;

/// One mesh-wide track swap.
#[derive(Debug, Clone)]
pub struct RenegotiationRequest {
    pub kind: TrackKind,
    pub new_track: LocalTrack,
}

/// Per-link outcome of a renegotiation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenegotiationReport {
    pub kind: TrackKind,
    pub track_id: String,
    pub succeeded: Vec<ParticipantId>,
    pub failed: Vec<(ParticipantId, String)>,
    /// Links that were not connected; each swaps once it is.
    pub deferred: Vec<ParticipantId>,
}

impl RenegotiationReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

struct ActivePass {
    id: u64,
    request: RenegotiationRequest,
    pending: BTreeSet<ParticipantId>,
    succeeded: Vec<ParticipantId>,
    failed: Vec<(ParticipantId, String)>,
    deferred: Vec<ParticipantId>,
    reply: Option<ReportReply>,
}

struct TransientShare {
    kind: TrackKind,
    track_id: String,
    prior: Option<LocalTrack>,
}

/// Serializes renegotiation passes: one at a time, the rest queued in order.
///
/// Also remembers which track a transient share displaced so it can be put back.
pub(crate) struct RenegotiationController {
    next_pass: u64,
    active: Option<ActivePass>,
    queue: VecDeque<(RenegotiationRequest, Option<ReportReply>)>,
    transient: Option<TransientShare>,
}

impl RenegotiationController {
    pub fn new() -> Self {
        Self {
            next_pass: 1,
            active: None,
            queue: VecDeque::new(),
            transient: None,
        }
    }

    pub fn enqueue(&mut self, request: RenegotiationRequest, reply: Option<ReportReply>) {
        debug!(
            "Queueing {} renegotiation to {} ({} already waiting)",
            request.kind,
            request.new_track.id,
            self.queue.len()
        );
        self.queue.push_back((request, reply));
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Starts the next queued pass if none is running.
    pub fn start_next(&mut self) -> Option<(u64, RenegotiationRequest)> {
        if self.active.is_some() {
            return None;
        }
        let (request, reply) = self.queue.pop_front()?;

        let id = self.next_pass;
        self.next_pass += 1;
        self.active = Some(ActivePass {
            id,
            request: request.clone(),
            pending: BTreeSet::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
            reply,
        });
        Some((id, request))
    }

    /// Registers the links the running pass is waiting on.
    pub fn wait_for(&mut self, participants: impl IntoIterator<Item = ParticipantId>) {
        if let Some(active) = &mut self.active {
            active.pending.extend(participants);
        }
    }

    /// Records one link's outcome. Outcomes for other passes are ignored.
    pub fn record(
        &mut self,
        pass: u64,
        participant: &ParticipantId,
        outcome: std::result::Result<(), String>,
    ) {
        let Some(active) = &mut self.active else {
            return;
        };
        if active.id != pass || !active.pending.remove(participant) {
            debug!("Ignoring outcome of pass {} from {}", pass, participant);
            return;
        }
        match outcome {
            Ok(()) => active.succeeded.push(participant.clone()),
            Err(reason) => active.failed.push((participant.clone(), reason)),
        }
    }

    /// The link holds the swap until it is connected. The pass stops waiting on it.
    pub fn record_deferred(&mut self, pass: u64, participant: &ParticipantId) {
        let Some(active) = &mut self.active else {
            return;
        };
        if active.id != pass || !active.pending.remove(participant) {
            return;
        }
        active.deferred.push(participant.clone());
    }

    /// A link went away mid-pass; count it as failed.
    pub fn forget(&mut self, participant: &ParticipantId) {
        if let Some(active) = &self.active {
            let pass = active.id;
            self.record(pass, participant, Err("link closed".to_owned()));
        }
    }

    /// Completes the running pass once no link is outstanding.
    pub fn finish_if_done(&mut self) -> Option<RenegotiationReport> {
        if !self.active.as_ref().is_some_and(|a| a.pending.is_empty()) {
            return None;
        }
        let active = self.active.take()?;

        let report = RenegotiationReport {
            kind: active.request.kind,
            track_id: active.request.new_track.id.clone(),
            succeeded: active.succeeded,
            failed: active.failed,
            deferred: active.deferred,
        };
        if report.all_succeeded() {
            info!(
                "Renegotiation pass {} done: {} on {} links ({} deferred)",
                active.id,
                report.track_id,
                report.succeeded.len(),
                report.deferred.len()
            );
        } else {
            warn!(
                "Renegotiation pass {} done with {} failures",
                active.id,
                report.failed.len()
            );
        }

        if let Some(reply) = active.reply {
            let _ = reply.send(Ok(report.clone()));
        }
        Some(report)
    }

    /// Fails the running pass and everything queued behind it.
    pub fn abort(&mut self, err: impl Fn() -> MeshError) {
        let active_reply = self.active.take().and_then(|a| a.reply);
        let queued = self.queue.drain(..).filter_map(|(_, reply)| reply);

        for reply in active_reply.into_iter().chain(queued) {
            let _ = reply.send(Err(err()));
        }
        self.transient = None;
    }

    /// A share replacing another transient share of the same kind inherits the
    /// track the first one displaced.
    pub fn remember_transient(&mut self, track: &LocalTrack, prior: Option<LocalTrack>) {
        let prior = match self.transient.take() {
            Some(active) if active.kind == track.kind => {
                debug!(
                    "{} replaces transient {}, keeping {:?} to restore",
                    track.id,
                    active.track_id,
                    active.prior.as_ref().map(|t| t.id.as_str())
                );
                active.prior
            }
            _ => prior,
        };
        self.transient = Some(TransientShare {
            kind: track.kind,
            track_id: track.id.clone(),
            prior,
        });
    }

    /// Takes the track displaced by the transient share. With `ended` set, only a
    /// share of that exact track matches.
    pub fn take_restore(
        &mut self,
        ended: Option<&str>,
    ) -> Option<(TrackKind, Option<LocalTrack>)> {
        let matches = match (&self.transient, ended) {
            (Some(share), Some(id)) => share.track_id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return None;
        }
        self.transient.take().map(|share| (share.kind, share.prior))
    }
}
