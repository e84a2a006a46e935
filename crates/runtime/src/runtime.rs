//! High-level runtime orchestrator.
//!
//! The runtime owns the device store, the remote cache and the session, spawns
//! one campaign worker per campaign on first use, and exposes a builder-based
//! API for hosts.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use campaign_core::{Deck, LocalState, Session, StoreAction, UserId};

use crate::api::{CampaignHandle, PendingMutation, RemoteMutationApi, Result, RuntimeError};
use crate::config::RuntimeConfig;
use crate::events::{Event, EventBus, Topic};
use crate::repository::{FileJournalStore, InMemoryLocalStore, LocalStore, RepositoryError};
use crate::session::SessionHandle;
use crate::sync::{DeckActions, RemoteCache, RemoteCall, SyncOrchestrator};
use crate::workers::{CampaignWorker, Command};

struct WorkerSlot {
    command_tx: mpsc::Sender<Command>,
    join: JoinHandle<()>,
}

/// Shared state behind the runtime and every [`CampaignHandle`].
pub(crate) struct Registry {
    orchestrator: SyncOrchestrator,
    config: RuntimeConfig,
    workers: Mutex<HashMap<Uuid, WorkerSlot>>,
}

impl Registry {
    pub(crate) fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Handle to `campaign`'s worker, spawning the worker on first use.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn handle(self: &Arc<Self>, campaign: Uuid) -> Result<CampaignHandle> {
        self.orchestrator
            .store()
            .snapshot()?
            .require_campaign(&campaign)?;

        let mut workers = self
            .workers
            .lock()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        if let Some(slot) = workers.get(&campaign)
            && !slot.command_tx.is_closed()
        {
            return Ok(CampaignHandle::new(
                campaign,
                slot.command_tx.clone(),
                Arc::clone(self),
            ));
        }

        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer_size.max(1));
        let worker = CampaignWorker::new(
            campaign,
            self.orchestrator.clone(),
            command_rx,
            self.config.dispatch_buffer_size,
        );
        let join = tokio::spawn(worker.run());
        debug!("Spawned worker for campaign {}", campaign);

        workers.insert(
            campaign,
            WorkerSlot {
                command_tx: command_tx.clone(),
                join,
            },
        );
        Ok(CampaignHandle::new(campaign, command_tx, Arc::clone(self)))
    }
}

/// Main runtime that owns the sync engine.
///
/// [`CampaignHandle`]s are cloneable façades for individual campaigns.
pub struct SyncRuntime {
    registry: Arc<Registry>,
}

impl SyncRuntime {
    /// Create a new runtime builder
    pub fn builder() -> SyncRuntimeBuilder {
        SyncRuntimeBuilder::new()
    }

    /// Handle to one campaign. Fails when the device store does not hold it.
    pub fn campaign(&self, campaign: Uuid) -> Result<CampaignHandle> {
        self.registry.handle(campaign)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.registry.config
    }

    pub fn session(&self) -> &SessionHandle {
        self.registry.orchestrator.session()
    }

    /// The normalized remote cache. Hosts seed it with server data.
    pub fn cache(&self) -> &RemoteCache {
        self.registry.orchestrator.cache()
    }

    pub fn sign_in(&self, user: UserId) {
        self.session().sign_in(user);
    }

    /// Signs out and drops server-backed decks from the device store.
    pub fn sign_out(&self) -> Result<()> {
        self.session().sign_out();
        self.dispatch(StoreAction::ClearRemoteDecks { now: Utc::now() })
    }

    /// Applies a UI-produced action to the device store.
    pub fn dispatch(&self, action: StoreAction) -> Result<()> {
        self.registry.orchestrator.store().dispatch(&action)?;
        Ok(())
    }

    pub fn snapshot(&self) -> Result<LocalState> {
        Ok(self.registry.orchestrator.store().snapshot()?)
    }

    /// Stores decks re-imported from the legacy deck site and pushes drift
    /// to every server-backed campaign holding them.
    ///
    /// Returns one pending mutation per remote call.
    pub async fn sync_from_legacy(&self, imported: Vec<Deck>) -> Result<Vec<PendingMutation>> {
        let now = Utc::now();
        let actions: Vec<StoreAction> = imported
            .iter()
            .map(|deck| StoreAction::UpsertDeck {
                deck: deck.clone(),
                is_write: false,
                now,
            })
            .collect();
        self.registry.orchestrator.store().dispatch_all(&actions)?;

        let session = self.session().current();
        if session.user().is_none() {
            debug!("Signed out, legacy import stays local");
            return Ok(Vec::new());
        }
        let calls = DeckActions::new(self.cache(), &session)?.sync_from_legacy(&imported)?;
        info!("Legacy import produced {} remote calls", calls.len());

        let mut by_campaign: BTreeMap<Uuid, Vec<RemoteCall>> = BTreeMap::new();
        for call in calls {
            by_campaign.entry(call.campaign()).or_default().push(call);
        }

        let mut pending = Vec::new();
        let mut groups = by_campaign.into_iter();
        while let Some((campaign, calls)) = groups.next() {
            let handle = match self.campaign(campaign) {
                Ok(handle) => handle,
                Err(err) => {
                    let rest = groups.flat_map(|(_, calls)| calls);
                    self.registry.orchestrator.discard(calls.into_iter().chain(rest));
                    return Err(err);
                }
            };
            for call in calls {
                pending.push(handle.submit(call).await?);
            }
        }
        Ok(pending)
    }

    /// Subscribe to events from a specific topic
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.registry.orchestrator.events().subscribe(topic)
    }

    /// Subscribe to multiple topics at once
    pub fn subscribe_multiple(&self, topics: &[Topic]) -> HashMap<Topic, broadcast::Receiver<Event>> {
        self.registry.orchestrator.events().subscribe_multiple(topics)
    }

    /// Shutdown the runtime gracefully
    ///
    /// Waits for every campaign worker to drain its queue. Campaign handles
    /// still held elsewhere keep their worker alive, so drop them first.
    pub async fn shutdown(self) -> Result<()> {
        let slots: Vec<WorkerSlot> = {
            let mut workers = self
                .registry
                .workers
                .lock()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            workers.drain().map(|(_, slot)| slot).collect()
        };

        for slot in slots {
            drop(slot.command_tx);
            slot.join.await.map_err(RuntimeError::WorkerJoin)?;
        }
        info!("Runtime shut down");
        Ok(())
    }
}

/// Builder for [`SyncRuntime`] with flexible configuration.
pub struct SyncRuntimeBuilder {
    config: RuntimeConfig,
    store: Option<Arc<dyn LocalStore>>,
    remote: Option<Arc<dyn RemoteMutationApi>>,
    cache: Option<RemoteCache>,
    session: Session,
}

impl SyncRuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            store: None,
            remote: None,
            cache: None,
            session: Session::signed_out(),
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom device store. Defaults to the file journal in `data_dir`.
    pub fn store(mut self, store: impl LocalStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Keep the device store in memory only.
    pub fn in_memory(self, state: LocalState) -> Self {
        self.store(InMemoryLocalStore::with_state(state))
    }

    /// Set the remote mutation api (required)
    pub fn remote(mut self, remote: impl RemoteMutationApi + 'static) -> Self {
        self.remote = Some(Arc::new(remote));
        self
    }

    pub fn remote_arc(mut self, remote: Arc<dyn RemoteMutationApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Start from a pre-seeded remote cache.
    pub fn cache(mut self, cache: RemoteCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn build(self) -> Result<SyncRuntime> {
        let remote = self.remote.ok_or(RuntimeError::RemoteApiNotSet)?;
        let store: Arc<dyn LocalStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileJournalStore::open(&self.config.data_dir)?),
        };

        let orchestrator = SyncOrchestrator::new(
            store,
            self.cache.unwrap_or_default(),
            remote,
            EventBus::with_capacity(self.config.event_buffer_size),
            SessionHandle::new(self.session),
        );
        info!(
            "Sync runtime ready (data dir {})",
            self.config.data_dir.display()
        );

        Ok(SyncRuntime {
            registry: Arc::new(Registry {
                orchestrator,
                config: self.config,
                workers: Mutex::new(HashMap::new()),
            }),
        })
    }
}
