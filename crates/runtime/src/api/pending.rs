//! Results of mutations whose optimistic state is already applied.
use tokio::sync::oneshot;

use campaign_core::{DataSource, UploadedCampaignId};

use super::errors::{Result, RuntimeError};
use super::remote::MutationKind;

/// A mutation that has been applied locally and may still be in flight.
///
/// Dropping it is fine: the remote call is sent regardless. Awaiting
/// [`acknowledged`](Self::acknowledged) reports how the server answered.
#[derive(Debug)]
pub struct PendingMutation {
    source: DataSource,
    kind: Option<MutationKind>,
    ack: Option<oneshot::Receiver<Result<()>>>,
}

impl PendingMutation {
    /// A write that is complete once applied.
    pub(crate) fn settled(source: DataSource) -> Self {
        Self {
            source,
            kind: None,
            ack: None,
        }
    }

    pub(crate) fn in_flight(kind: MutationKind, ack: oneshot::Receiver<Result<()>>) -> Self {
        Self {
            source: DataSource::Remote,
            kind: Some(kind),
            ack: Some(ack),
        }
    }

    /// Replica the mutation was written to.
    pub fn source(&self) -> DataSource {
        self.source
    }

    /// Remote call backing the mutation, if any.
    pub fn kind(&self) -> Option<MutationKind> {
        self.kind
    }

    pub fn is_settled(&self) -> bool {
        self.ack.is_none()
    }

    /// Waits for the server. Resolves immediately for local writes.
    pub async fn acknowledged(self) -> Result<()> {
        match self.ack {
            Some(ack) => ack.await.map_err(RuntimeError::ReplyChannelClosed)?,
            None => Ok(()),
        }
    }
}

/// A promotion queued on the campaign's worker.
///
/// The worker runs it in order with the campaign's other mutations; the
/// caller only waits when it asks for the outcome.
#[derive(Debug)]
pub struct PendingPromotion {
    outcome: oneshot::Receiver<Result<Promotion>>,
}

impl PendingPromotion {
    pub(crate) fn new(outcome: oneshot::Receiver<Result<Promotion>>) -> Self {
        Self { outcome }
    }

    /// Waits until every member has a server identity and its chain uploads
    /// are queued.
    pub async fn promoted(self) -> Result<Promotion> {
        self.outcome.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    /// Waits for the promotion and then for every chain upload.
    pub async fn acknowledged(self) -> Result<()> {
        self.promoted().await?.acknowledged().await
    }
}

/// Outcome of promoting a campaign.
#[derive(Debug)]
pub struct Promotion {
    /// Promoted ids, parent first.
    pub campaigns: Vec<UploadedCampaignId>,
    /// One chain upload per investigator deck that still had versions to send.
    pub uploads: Vec<PendingMutation>,
}

impl Promotion {
    /// Waits for every chain upload, returning the first failure.
    ///
    /// Every upload is awaited even after a failure.
    pub async fn acknowledged(self) -> Result<()> {
        let mut first_error = None;
        for upload in self.uploads {
            if let Err(err) = upload.acknowledged().await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
