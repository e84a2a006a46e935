//! Event payloads published on the [`EventBus`](super::EventBus).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campaign_core::{DataSource, DeckId, DeckKey, ServerId};

use crate::api::MutationKind;

/// Upload progress and remote acknowledgment status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// A deck chain started uploading. `total` counts the steps to send.
    UploadStarted {
        campaign: Uuid,
        investigator: String,
        total: usize,
    },
    DeckUploaded {
        campaign: Uuid,
        investigator: String,
        deck: DeckId,
        step: usize,
        total: usize,
    },
    UploadFinished {
        campaign: Uuid,
        investigator: String,
        uploaded: usize,
    },
    /// The chain stopped at `failed_at`; earlier steps stay uploaded.
    UploadFailed {
        campaign: Uuid,
        investigator: String,
        failed_at: DeckId,
        uploaded: usize,
        error: String,
    },
    CampaignPromoted {
        campaign: Uuid,
        server_id: ServerId,
    },
    MutationAcknowledged {
        campaign: Uuid,
        mutation: MutationKind,
    },
    /// The optimistic write was undone because the server refused it.
    MutationRolledBack {
        campaign: Uuid,
        mutation: MutationKind,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuideEvent {
    InputAppended {
        campaign: Uuid,
        source: DataSource,
        input: String,
    },
    InputsUndone {
        campaign: Uuid,
        scenario: String,
        removed: usize,
    },
    ScenarioReset {
        campaign: Uuid,
        scenario: String,
    },
    AchievementUpdated {
        campaign: Uuid,
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeckEvent {
    DeckSaved {
        deck: DeckId,
        source: DataSource,
    },
    DecksDeleted {
        removed: Vec<DeckKey>,
    },
}
