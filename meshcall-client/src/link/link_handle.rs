use crate::link::{LinkCommand, LinkState, LinkStatus, LinkSummary};
use meshcall_core::ParticipantId;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::error;

/// The mesh's side of a running link task.
pub(crate) struct LinkHandle {
    pub participant: ParticipantId,
    pub epoch: u64,
    commands: mpsc::Sender<LinkCommand>,
    cancel: Option<oneshot::Sender<()>>,
    status: watch::Receiver<LinkStatus>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    pub(crate) fn new(
        participant: ParticipantId,
        epoch: u64,
        commands: mpsc::Sender<LinkCommand>,
        cancel: oneshot::Sender<()>,
        status: watch::Receiver<LinkStatus>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            participant,
            epoch,
            commands,
            cancel: Some(cancel),
            status,
            task,
        }
    }

    pub fn state(&self) -> LinkState {
        self.status.borrow().state
    }

    /// True once the task has stopped or is about to.
    pub fn is_closed(&self) -> bool {
        self.state().is_terminal() || self.task.is_finished()
    }

    pub fn summary(&self) -> LinkSummary {
        let status = self.status.borrow();
        LinkSummary {
            participant: self.participant.clone(),
            state: status.state,
            role: status.role,
            active_tracks: status.active_tracks.clone(),
        }
    }

    /// Queues a command; `false` if the link task is gone.
    pub async fn send(&self, cmd: LinkCommand) -> bool {
        self.commands.send(cmd).await.is_ok()
    }

    /// Stops the link and waits until its session is closed.
    pub async fn close(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("Link task for {} panicked", self.participant);
            }
        }
    }
}
