//! Sequential sender of one campaign's remote calls.
//!
//! Jobs arrive in the order their optimistic writes were applied and are sent
//! strictly in that order, so a create always reaches the server before any
//! call that depends on the id it produces.
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::Result;
use crate::sync::{ChainUpload, RemoteCall, SyncOrchestrator};

pub enum Job {
    Single {
        call: RemoteCall,
        ack: oneshot::Sender<Result<()>>,
    },
    Chain {
        upload: ChainUpload,
        ack: oneshot::Sender<Result<()>>,
    },
}

impl Job {
    /// Reverts a job that will never run.
    pub(crate) fn discard(self, orchestrator: &SyncOrchestrator) {
        match self {
            Self::Single { call, .. } => orchestrator.discard(std::iter::once(call)),
            Self::Chain { upload, .. } => {
                orchestrator.discard(upload.steps.into_iter().map(|(_, call)| call))
            }
        }
    }
}

pub struct Dispatcher {
    campaign: Uuid,
    orchestrator: SyncOrchestrator,
    job_rx: mpsc::Receiver<Job>,
}

impl Dispatcher {
    pub fn new(campaign: Uuid, orchestrator: SyncOrchestrator, job_rx: mpsc::Receiver<Job>) -> Self {
        Self {
            campaign,
            orchestrator,
            job_rx,
        }
    }

    pub async fn run(mut self) {
        debug!("Dispatcher for campaign {} started", self.campaign);
        loop {
            tokio::select! {
                Some(job) = self.job_rx.recv() => {
                    self.handle_job(job).await;
                }
                else => break,
            }
        }
        info!("Dispatcher for campaign {} stopped", self.campaign);
    }

    async fn handle_job(&self, job: Job) {
        match job {
            Job::Single { call, ack } => {
                let result = self.orchestrator.execute(call).await.map(|_| ());
                if ack.send(result).is_err() {
                    debug!("Mutation ack channel closed (caller dropped)");
                }
            }
            Job::Chain { upload, ack } => {
                let result = self.orchestrator.run_chain(upload).await.map(|_| ());
                if ack.send(result).is_err() {
                    debug!("Chain upload ack channel closed (caller dropped)");
                }
            }
        }
    }
}
