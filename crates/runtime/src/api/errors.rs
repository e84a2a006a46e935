//! Unified error types surfaced by the runtime API.
//!
//! Every top-level operation reports a single [`RuntimeError`]. Remote API
//! implementations report [`RemoteError`], which the runtime wraps.
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use campaign_core::{DeckId, DeckKey, HashError, LineageError, StoreError};

pub use crate::repository::RepositoryError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("operation requires a signed-in user")]
    AuthenticationRequired,

    #[error("campaign {0} has no server identity")]
    NotPromoted(Uuid),

    #[error("campaign {0} not found")]
    CampaignNotFound(Uuid),

    #[error("deck {0} not found")]
    DeckNotFound(DeckKey),

    #[error(transparent)]
    IdentityMismatch(#[from] LineageError),

    #[error("failed to hash deck content")]
    Hash(#[from] HashError),

    #[error("guide entry {seq} has no server row")]
    UnsyncedGuideEntry { seq: u64 },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("chain upload stopped at {failed_at} after {uploaded} uploaded decks")]
    PartialUpload {
        uploaded: usize,
        failed_at: DeckId,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("no remote mutation api configured")]
    RemoteApiNotSet,

    #[error("campaign worker command channel closed")]
    CommandChannelClosed,

    #[error("campaign worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("campaign worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),
}

impl From<StoreError> for RuntimeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CampaignNotFound(uuid) => Self::CampaignNotFound(uuid),
            StoreError::DeckNotFound(key) => Self::DeckNotFound(key),
        }
    }
}

/// Failure reported by a [`RemoteMutationApi`](super::RemoteMutationApi) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("server rejected the session")]
    Unauthorized,

    #[error("server rejected the mutation: {reason}")]
    Rejected { reason: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("remote entity not found")]
    NotFound,
}
