//! Shared fixtures for the runtime integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use campaign_core::{
    Campaign, Deck, DeckContent, DeckId, LocalState, ServerId, Session, StoreAction, UserId,
};
use sync_runtime::api::{
    AchievementRequest, CreateCampaignRequest, CreateLinkedCampaignRequest, DeckRequest,
    DeleteDeckRequest, LinkedCampaignIds, NextDeckRequest, RemoteResult, RemoveInputsRequest,
    SetInputRequest, UploadCampaignRequest,
};
use sync_runtime::{RemoteError, RemoteMutationApi, SyncRuntime};

/// One call as the scripted server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateCampaign(Uuid),
    CreateLinkedCampaign(Uuid),
    UploadCampaign { campaign: Uuid, entries: usize },
    CreateBaseDeck(DeckId),
    CreateNextDeck { deck: DeckId, previous: DeckId },
    UpdateDeck(DeckId),
    DeleteDeck { deck: DeckId, all_versions: bool },
    SetInput,
    RemoveInputs(Vec<ServerId>),
    Achievement(String),
}

/// In-memory server that records call order and can be told to fail.
#[derive(Default)]
pub struct ScriptedRemote {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
    /// Deck creates succeed until this many have been accepted.
    fail_deck_create_after: Mutex<Option<usize>>,
    deck_creates: AtomicUsize,
    reject_inputs: Mutex<bool>,
    /// Campaigns whose calls wait until released.
    held: Mutex<HashMap<Uuid, Arc<Notify>>>,
    /// Caps how many guide entries get an id on upload.
    guide_ids: Mutex<Option<usize>>,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_deck_create_after(&self, accepted: usize) {
        *self.fail_deck_create_after.lock().unwrap() = Some(accepted);
    }

    pub fn heal(&self) {
        *self.fail_deck_create_after.lock().unwrap() = None;
        *self.reject_inputs.lock().unwrap() = false;
    }

    pub fn reject_inputs(&self) {
        *self.reject_inputs.lock().unwrap() = true;
    }

    /// Makes calls for `campaign` wait until [`release`](Self::release).
    pub fn hold(&self, campaign: Uuid) {
        self.held
            .lock()
            .unwrap()
            .insert(campaign, Arc::new(Notify::new()));
    }

    pub fn release(&self, campaign: Uuid) {
        if let Some(gate) = self.held.lock().unwrap().remove(&campaign) {
            gate.notify_one();
        }
    }

    /// Answers guide uploads with at most `ids` ids.
    pub fn short_guide_ids(&self, ids: usize) {
        *self.guide_ids.lock().unwrap() = Some(ids);
    }

    async fn gate(&self, campaign: Uuid) {
        let gate = self.held.lock().unwrap().get(&campaign).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn assign(&self) -> ServerId {
        ServerId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn deck_create(&self, call: Call) -> RemoteResult<ServerId> {
        let limit = *self.fail_deck_create_after.lock().unwrap();
        if let Some(limit) = limit
            && self.deck_creates.load(Ordering::SeqCst) >= limit
        {
            return Err(RemoteError::Transport("connection reset".into()));
        }
        self.deck_creates.fetch_add(1, Ordering::SeqCst);
        self.record(call);
        Ok(self.assign())
    }
}

#[async_trait]
impl RemoteMutationApi for ScriptedRemote {
    async fn create_campaign(&self, request: CreateCampaignRequest) -> RemoteResult<ServerId> {
        self.gate(request.uuid).await;
        self.record(Call::CreateCampaign(request.uuid));
        Ok(self.assign())
    }

    async fn create_linked_campaign(
        &self,
        request: CreateLinkedCampaignRequest,
    ) -> RemoteResult<LinkedCampaignIds> {
        self.record(Call::CreateLinkedCampaign(request.parent.uuid));
        Ok(LinkedCampaignIds {
            parent: self.assign(),
            campaign_a: self.assign(),
            campaign_b: self.assign(),
        })
    }

    async fn upload_campaign(&self, request: UploadCampaignRequest) -> RemoteResult<Vec<ServerId>> {
        self.record(Call::UploadCampaign {
            campaign: request.campaign.uuid,
            entries: request.guide.len(),
        });
        let ids = self
            .guide_ids
            .lock()
            .unwrap()
            .unwrap_or(request.guide.len())
            .min(request.guide.len());
        Ok((0..ids).map(|_| self.assign()).collect())
    }

    async fn create_base_deck(&self, request: DeckRequest) -> RemoteResult<ServerId> {
        self.gate(request.campaign.uuid).await;
        self.deck_create(Call::CreateBaseDeck(request.deck.id))
    }

    async fn create_next_deck(&self, request: NextDeckRequest) -> RemoteResult<ServerId> {
        self.gate(request.campaign.uuid).await;
        self.deck_create(Call::CreateNextDeck {
            deck: request.deck.id,
            previous: request.previous,
        })
    }

    async fn update_deck(&self, request: DeckRequest) -> RemoteResult<()> {
        self.record(Call::UpdateDeck(request.deck.id));
        Ok(())
    }

    async fn delete_deck(&self, request: DeleteDeckRequest) -> RemoteResult<()> {
        self.record(Call::DeleteDeck {
            deck: request.deck,
            all_versions: request.all_versions,
        });
        Ok(())
    }

    async fn set_input(&self, request: SetInputRequest) -> RemoteResult<ServerId> {
        self.gate(request.campaign.uuid).await;
        if *self.reject_inputs.lock().unwrap() {
            return Err(RemoteError::Rejected {
                reason: "campaign is read-only".into(),
            });
        }
        self.record(Call::SetInput);
        Ok(self.assign())
    }

    async fn remove_inputs(&self, request: RemoveInputsRequest) -> RemoteResult<()> {
        self.record(Call::RemoveInputs(request.inputs));
        Ok(())
    }

    async fn set_binary_achievement(&self, request: AchievementRequest) -> RemoteResult<()> {
        self.record(Call::Achievement(request.id));
        Ok(())
    }

    async fn inc_achievement(&self, request: AchievementRequest) -> RemoteResult<()> {
        self.record(Call::Achievement(request.id));
        Ok(())
    }

    async fn dec_achievement(&self, request: AchievementRequest) -> RemoteResult<()> {
        self.record(Call::Achievement(request.id));
        Ok(())
    }
}

pub fn user() -> UserId {
    UserId::new("investigator@example.com")
}

/// A guided campaign with one investigator whose deck has `versions` versions.
pub struct Fixture {
    pub campaign: Uuid,
    pub chain: Vec<Deck>,
    pub state: LocalState,
}

pub fn fixture(versions: usize) -> Fixture {
    let now = Utc::now();
    let campaign = Campaign::new_guided(Uuid::new_v4(), "Night of the Zealot", "core", now);
    let uuid = campaign.uuid();
    let mut state = LocalState::default();
    state.apply(&StoreAction::NewCampaign { campaign, now });

    let mut chain: Vec<Deck> = Vec::new();
    for i in 0..versions {
        let content = DeckContent {
            name: format!("Roland v{i}"),
            xp: Some(i as u32),
            ..DeckContent::default()
        };
        let deck = match chain.last() {
            None => Deck::new(DeckId::new_local(), "01001", content, now),
            Some(previous) => previous.upgrade(DeckId::new_local(), content, now),
        };
        state.apply(&StoreAction::UpsertDeck {
            deck: deck.clone(),
            is_write: true,
            now,
        });
        chain.push(deck);
    }
    if let Some(head) = chain.last() {
        state.apply(&StoreAction::AddInvestigator {
            campaign: uuid,
            investigator: head.investigator_code.clone(),
            deck: Some(head.id),
            now,
        });
    }

    Fixture {
        campaign: uuid,
        chain,
        state,
    }
}

pub fn runtime(state: LocalState, remote: Arc<ScriptedRemote>, signed_in: bool) -> SyncRuntime {
    let session = if signed_in {
        Session::signed_in(user())
    } else {
        Session::signed_out()
    };
    SyncRuntime::builder()
        .in_memory(state)
        .remote_arc(remote)
        .session(session)
        .build()
        .expect("runtime should build")
}
