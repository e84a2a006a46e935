//! Deterministic campaign state shared by the sync runtime and offline tools.
//!
//! `campaign-core` defines identities, deck lineages, the guide log and its
//! replay, the dual-source resolver and the device-store reducers. Everything
//! here is pure: no I/O, no clock reads, no logging. Timestamps and fresh ids
//! are passed in by callers.
pub mod deck;
pub mod error;
pub mod guide;
pub mod hash;
pub mod identity;
pub mod resolver;
pub mod store;

pub use deck::{
    ChainIndex, ChainLink, ChainStep, Deck, DeckCache, DeckContent, LegacySyncPlan, LegacyUpload,
    LineageError, ReconcilePlan, RemoteDeck, backward_chain, detect_drift, plan_legacy_sync,
    plan_reconcile, traverse_chain, upload_steps, validate_next_link,
};
pub use error::{CoreError, ErrorSeverity};
pub use guide::{
    AchievementOp, AchievementValue, Achievements, CampaignLog, CampaignPhase, CampaignState,
    ChaosBag, GuideAnswer, GuideEntry, GuideEntryBody, GuideInput, GuideLog, InvestigatorState,
    InvestigatorTraumaData, LinkedReference, ScenarioState, ScenarioStatus, replay, replay_from,
};
pub use hash::{ContentHash, HashError};
pub use identity::{
    CampaignId, DeckAddress, DeckId, DeckKey, DeckOrigin, IdentityError, PendingId, ServerId,
    ServerRef, UploadedCampaignId, UserId,
};
pub use resolver::{DataSource, EntityKind, Selection, Session, is_server_authoritative, resolve};
pub use store::{
    BlessCurse, Campaign, CampaignLink, CampaignPatch, ChaosBagResults, DeckStore, Direction,
    InvestigatorData, LocalState, StoreAction, StoreError, SyncProgress, reduce,
};
