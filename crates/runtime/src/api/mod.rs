//! Public runtime API surface.
//!
//! This module gathers the types exposed to consumers of the runtime crate so
//! other layers can stay focused on orchestration, workers, or infrastructure.

pub mod errors;
pub mod handle;
pub mod pending;
pub mod remote;

pub use errors::{RemoteError, RepositoryError, Result, RuntimeError};
pub use handle::CampaignHandle;
pub use pending::{PendingMutation, PendingPromotion, Promotion};
pub use remote::{
    AchievementRequest, CreateCampaignRequest, CreateLinkedCampaignRequest, DeckRequest,
    DeleteDeckRequest, LinkedCampaignIds, MutationKind, NextDeckRequest, RemoteMutationApi,
    RemoteResult, RemoveInputsRequest, SetInputRequest, UploadCampaignRequest,
};
