//! Async sync engine for campaign companions.
//!
//! This crate wires the pure `campaign-core` model to a device store, a
//! remote mutation API and an optimistic remote cache. Consumers embed
//! [`SyncRuntime`] and work through cloneable [`CampaignHandle`]s: every
//! mutation is applied optimistically, then reconciled when the server
//! answers.
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`sync`] holds the remote cache, guide writers, deck actions and reads
//! - [`events`] provides topic-based event bus for flexible event routing
//! - [`repository`] persists the device store
//! - [`workers`] keeps background tasks internal to the crate
pub mod api;
pub mod config;
pub mod events;
pub mod repository;
pub mod runtime;
pub mod session;
pub mod sync;

mod workers;

pub use api::{
    CampaignHandle, MutationKind, PendingMutation, PendingPromotion, Promotion, RemoteError,
    RemoteMutationApi, Result, RuntimeError,
};
pub use config::RuntimeConfig;
pub use events::{DeckEvent, Event, EventBus, GuideEvent, SyncEvent, Topic};
pub use repository::{FileJournalStore, InMemoryLocalStore, LocalStore, RepositoryError};
pub use runtime::{SyncRuntime, SyncRuntimeBuilder};
pub use session::SessionHandle;
pub use sync::{RemoteCache, ResolvedDeck, SyncOrchestrator};
pub use workers::AchievementUpdate;
