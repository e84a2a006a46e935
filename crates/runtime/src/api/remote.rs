//! Abstract capability for mutating server-backed state.
//!
//! The runtime never talks to a network directly. Hosts plug in a
//! [`RemoteMutationApi`] implementation (GraphQL client, test double, ...)
//! and the runtime calls it from its per-campaign dispatchers. Every request
//! carries the optimistic result the runtime already wrote into its remote
//! cache, so implementations that keep their own normalized cache can apply
//! the same value before the round-trip completes.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campaign_core::{
    AchievementValue, Campaign, ContentHash, Deck, DeckId, DeckKey, GuideEntry, GuideInput,
    RemoteDeck, ServerId, UploadedCampaignId,
};

use super::errors::RemoteError;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Remote mutation endpoints used by deck actions, guide writers and promotion.
#[async_trait]
pub trait RemoteMutationApi: Send + Sync {
    async fn create_campaign(&self, request: CreateCampaignRequest) -> RemoteResult<ServerId>;

    /// Creates the parent of a linked campaign together with both halves.
    async fn create_linked_campaign(
        &self,
        request: CreateLinkedCampaignRequest,
    ) -> RemoteResult<LinkedCampaignIds>;

    /// Uploads the campaign snapshot and, for guided campaigns, its guide log.
    ///
    /// Returns the ids assigned to the uploaded guide entries, in log order.
    async fn upload_campaign(&self, request: UploadCampaignRequest) -> RemoteResult<Vec<ServerId>>;

    async fn create_base_deck(&self, request: DeckRequest) -> RemoteResult<ServerId>;

    async fn create_next_deck(&self, request: NextDeckRequest) -> RemoteResult<ServerId>;

    async fn update_deck(&self, request: DeckRequest) -> RemoteResult<()>;

    async fn delete_deck(&self, request: DeleteDeckRequest) -> RemoteResult<()>;

    async fn set_input(&self, request: SetInputRequest) -> RemoteResult<ServerId>;

    async fn remove_inputs(&self, request: RemoveInputsRequest) -> RemoteResult<()>;

    async fn set_binary_achievement(&self, request: AchievementRequest) -> RemoteResult<()>;

    async fn inc_achievement(&self, request: AchievementRequest) -> RemoteResult<()>;

    async fn dec_achievement(&self, request: AchievementRequest) -> RemoteResult<()>;
}

/// Remote mutation kinds, for events and logs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
    CreateCampaign,
    CreateLinkedCampaign,
    UploadCampaign,
    CreateBaseDeck,
    CreateNextDeck,
    UpdateDeck,
    DeleteDeck,
    SetInput,
    RemoveInputs,
    SetBinaryAchievement,
    IncAchievement,
    DecAchievement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCampaignRequest {
    pub uuid: Uuid,
    pub name: String,
    pub cycle_code: String,
    pub guided: bool,
}

impl CreateCampaignRequest {
    pub fn for_campaign(campaign: &Campaign) -> Self {
        Self {
            uuid: campaign.uuid(),
            name: campaign.name.clone(),
            cycle_code: campaign.cycle_code.clone(),
            guided: campaign.guided,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLinkedCampaignRequest {
    pub parent: CreateCampaignRequest,
    pub campaign_a: CreateCampaignRequest,
    pub campaign_b: CreateCampaignRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedCampaignIds {
    pub parent: ServerId,
    pub campaign_a: ServerId,
    pub campaign_b: ServerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCampaignRequest {
    pub campaign: UploadedCampaignId,
    pub snapshot: Campaign,
    /// Guide entries in log order; empty for unguided campaigns.
    pub guide: Vec<GuideEntry>,
}

/// Create or update one deck version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckRequest {
    pub campaign: UploadedCampaignId,
    pub deck: Deck,
    pub content_hash: ContentHash,
    pub optimistic: RemoteDeck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextDeckRequest {
    pub campaign: UploadedCampaignId,
    pub deck: Deck,
    pub previous: DeckId,
    pub content_hash: ContentHash,
    pub optimistic: RemoteDeck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDeckRequest {
    pub campaign: UploadedCampaignId,
    pub deck: DeckId,
    pub all_versions: bool,
    /// Versions already dropped from the cache.
    pub optimistic: Vec<DeckKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInputRequest {
    pub campaign: UploadedCampaignId,
    pub input: GuideInput,
    pub optimistic: GuideEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveInputsRequest {
    pub campaign: UploadedCampaignId,
    pub inputs: Vec<ServerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementRequest {
    pub campaign: UploadedCampaignId,
    pub id: String,
    /// Only meaningful for increments.
    pub max: Option<u32>,
    pub optimistic: AchievementValue,
}
