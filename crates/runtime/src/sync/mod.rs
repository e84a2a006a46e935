//! Sync engine: remote cache, guide writers, deck actions and the orchestrator.
//!
//! Every mutation follows the same shape. The caller's worker applies the
//! optimistic result (device store or [`RemoteCache`]) and produces a
//! [`RemoteCall`] when the server is the log of record. The campaign's
//! dispatcher later sends the call and commits or reverts the optimistic write.

mod cache;
mod decks;
mod guide;
mod orchestrator;
mod views;

use uuid::Uuid;

use campaign_core::{DeckId, ServerRef, UploadedCampaignId};

use crate::api::{
    AchievementRequest, DeckRequest, DeleteDeckRequest, MutationKind, NextDeckRequest,
    SetInputRequest,
};

pub use cache::{Optimistic, RemoteCache};
pub use decks::{DeckActions, require_uploaded};
pub use guide::{GuideLogWriter, GuideWrite, LocalGuideWriter, RemoteGuideWriter, select_writer};
pub use orchestrator::{ChainUpload, SyncOrchestrator};
pub use views::ResolvedDeck;

/// A remote mutation whose optimistic result is already in the cache.
#[derive(Debug)]
pub struct RemoteCall {
    pub(crate) campaign: Uuid,
    pub(crate) request: RemoteRequest,
    pub(crate) optimistic: Optimistic,
}

impl RemoteCall {
    pub(crate) fn new(campaign: Uuid, request: RemoteRequest, optimistic: Optimistic) -> Self {
        Self {
            campaign,
            request,
            optimistic,
        }
    }

    /// Device uuid of the campaign the call belongs to.
    pub fn campaign(&self) -> Uuid {
        self.campaign
    }

    pub fn kind(&self) -> MutationKind {
        self.request.kind()
    }

    /// The deck a deck mutation targets.
    pub fn deck(&self) -> Option<DeckId> {
        match &self.request {
            RemoteRequest::CreateBaseDeck(r) | RemoteRequest::UpdateDeck(r) => Some(r.deck.id),
            RemoteRequest::CreateNextDeck(r) => Some(r.deck.id),
            RemoteRequest::DeleteDeck(r) => Some(r.deck),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum RemoteRequest {
    CreateBaseDeck(DeckRequest),
    CreateNextDeck(NextDeckRequest),
    UpdateDeck(DeckRequest),
    DeleteDeck(DeleteDeckRequest),
    SetInput(SetInputRequest),
    /// Refs may still be pending; they are resolved right before sending.
    RemoveInputs {
        campaign: UploadedCampaignId,
        inputs: Vec<ServerRef>,
    },
    SetBinaryAchievement(AchievementRequest),
    IncAchievement(AchievementRequest),
    DecAchievement(AchievementRequest),
}

impl RemoteRequest {
    fn kind(&self) -> MutationKind {
        match self {
            Self::CreateBaseDeck(_) => MutationKind::CreateBaseDeck,
            Self::CreateNextDeck(_) => MutationKind::CreateNextDeck,
            Self::UpdateDeck(_) => MutationKind::UpdateDeck,
            Self::DeleteDeck(_) => MutationKind::DeleteDeck,
            Self::SetInput(_) => MutationKind::SetInput,
            Self::RemoveInputs { .. } => MutationKind::RemoveInputs,
            Self::SetBinaryAchievement(_) => MutationKind::SetBinaryAchievement,
            Self::IncAchievement(_) => MutationKind::IncAchievement,
            Self::DecAchievement(_) => MutationKind::DecAchievement,
        }
    }
}
