//! Sends remote calls, drives chain uploads and promotes campaigns.
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use campaign_core::{
    Campaign, CampaignPatch, ChainStep, DeckId, GuideEntry, GuideEntryBody, GuideLog, ServerId,
    ServerRef, StoreAction, UploadedCampaignId, upload_steps,
};

use super::decks::require_uploaded;
use super::{DeckActions, RemoteCache, RemoteCall, RemoteRequest};
use crate::api::{
    CreateCampaignRequest, CreateLinkedCampaignRequest, RemoteMutationApi, RemoveInputsRequest,
    Result, RuntimeError, UploadCampaignRequest,
};
use crate::events::{EventBus, SyncEvent};
use crate::repository::LocalStore;
use crate::session::SessionHandle;

/// Create calls for one investigator's chain, oldest first.
///
/// Their optimistic results are already in the cache.
#[derive(Debug)]
pub struct ChainUpload {
    pub campaign: Uuid,
    pub investigator: String,
    pub(crate) steps: Vec<(DeckId, RemoteCall)>,
}

impl ChainUpload {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn decks(&self) -> impl Iterator<Item = &DeckId> {
        self.steps.iter().map(|(deck, _)| deck)
    }
}

/// Shared services every campaign worker and dispatcher works against.
#[derive(Clone)]
pub struct SyncOrchestrator {
    store: Arc<dyn LocalStore>,
    cache: RemoteCache,
    api: Arc<dyn RemoteMutationApi>,
    events: EventBus,
    session: SessionHandle,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn LocalStore>,
        cache: RemoteCache,
        api: Arc<dyn RemoteMutationApi>,
        events: EventBus,
        session: SessionHandle,
    ) -> Self {
        Self {
            store,
            cache,
            api,
            events,
            session,
        }
    }

    pub fn store(&self) -> &dyn LocalStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &RemoteCache {
        &self.cache
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Sends one call, then commits or reverts its optimistic write.
    pub async fn execute(&self, call: RemoteCall) -> Result<Option<ServerId>> {
        let RemoteCall {
            campaign,
            request,
            optimistic,
        } = call;
        let kind = request.kind();
        debug!("Dispatching {} for campaign {}", kind, campaign);

        match self.send(request).await {
            Ok(assigned) => {
                self.cache.acknowledge(&optimistic, assigned)?;
                debug!("{} acknowledged for campaign {}", kind, campaign);
                self.events.publish(SyncEvent::MutationAcknowledged {
                    campaign,
                    mutation: kind,
                });
                Ok(assigned)
            }
            Err(err) => {
                warn!("{} failed for campaign {}: {}", kind, campaign, err);
                self.cache.rollback(&optimistic)?;
                self.events.publish(SyncEvent::MutationRolledBack {
                    campaign,
                    mutation: kind,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn send(&self, request: RemoteRequest) -> Result<Option<ServerId>> {
        let assigned = match request {
            RemoteRequest::CreateBaseDeck(r) => Some(self.api.create_base_deck(r).await?),
            RemoteRequest::CreateNextDeck(r) => Some(self.api.create_next_deck(r).await?),
            RemoteRequest::UpdateDeck(r) => {
                self.api.update_deck(r).await?;
                None
            }
            RemoteRequest::DeleteDeck(r) => {
                self.api.delete_deck(r).await?;
                None
            }
            RemoteRequest::SetInput(r) => Some(self.api.set_input(r).await?),
            RemoteRequest::RemoveInputs { campaign, inputs } => {
                let mut resolved = Vec::with_capacity(inputs.len());
                for input in inputs {
                    match self.cache.resolve(input)? {
                        Some(id) => resolved.push(id),
                        // the entry's own create was rolled back, nothing to delete remotely
                        None => debug!("Skipping unacknowledged guide entry {}", input),
                    }
                }
                if !resolved.is_empty() {
                    self.api
                        .remove_inputs(RemoveInputsRequest {
                            campaign,
                            inputs: resolved,
                        })
                        .await?;
                }
                None
            }
            RemoteRequest::SetBinaryAchievement(r) => {
                self.api.set_binary_achievement(r).await?;
                None
            }
            RemoteRequest::IncAchievement(r) => {
                self.api.inc_achievement(r).await?;
                None
            }
            RemoteRequest::DecAchievement(r) => {
                self.api.dec_achievement(r).await?;
                None
            }
        };
        Ok(assigned)
    }

    /// Reverts calls that will never be sent, newest first.
    pub(crate) fn discard(&self, calls: impl DoubleEndedIterator<Item = RemoteCall>) {
        for call in calls.rev() {
            if let Err(err) = self.cache.rollback(&call.optimistic) {
                warn!("Failed to roll back unsent {}: {}", call.kind(), err);
            }
        }
    }

    /// Transient progress markers never fail an upload.
    fn progress(&self, action: StoreAction) {
        if let Err(err) = self.store.dispatch(&action) {
            warn!("Failed to record {}: {}", action.kind(), err);
        }
    }

    // ------------------------------------------------------------------
    // Chain uploads
    // ------------------------------------------------------------------

    /// Plans the upload of the chain containing `deck` into `campaign`.
    ///
    /// Versions already on the server are skipped, so re-running after a
    /// partial failure resumes where the last run stopped. Returns `None`
    /// when every version is already uploaded.
    pub fn plan_chain_upload(
        &self,
        campaign: Uuid,
        deck: DeckId,
        now: DateTime<Utc>,
    ) -> Result<Option<ChainUpload>> {
        let state = self.store.snapshot()?;
        let record = state.require_campaign(&campaign)?;
        let uploaded = require_uploaded(&record.id)?;
        let session = self.session.current();
        let actions = DeckActions::new(&self.cache, &session)?;
        let investigator = state.require_deck(&deck)?.investigator_code.clone();

        let plan = upload_steps(&state.decks, &deck.key())?;
        let remote = self.cache.deck_cache(uploaded.server_id)?;

        let mut steps: Vec<(DeckId, RemoteCall)> = Vec::with_capacity(plan.len());
        for step in plan {
            let key = step.deck().key();
            if remote.contains(&key) {
                continue;
            }
            let Some(local) = state.decks.get(&key) else {
                continue;
            };
            let call = match step {
                ChainStep::Base { .. } => actions.create_base_deck(uploaded, local),
                ChainStep::Next { previous, .. } => {
                    actions.create_next_deck(uploaded, local, previous)
                }
            };
            match call {
                Ok(call) => steps.push((local.id, call)),
                Err(err) => {
                    self.discard(steps.into_iter().map(|(_, call)| call));
                    return Err(err);
                }
            }
        }

        if steps.is_empty() {
            debug!("Chain of {} already uploaded to {}", deck, campaign);
            return Ok(None);
        }

        self.progress(StoreAction::SyncDeck {
            campaign,
            investigator: investigator.clone(),
            uploading: true,
            now,
        });
        info!(
            "Uploading {} deck versions of {} to campaign {}",
            steps.len(),
            investigator,
            campaign
        );
        self.events.publish(SyncEvent::UploadStarted {
            campaign,
            investigator: investigator.clone(),
            total: steps.len(),
        });

        Ok(Some(ChainUpload {
            campaign,
            investigator,
            steps,
        }))
    }

    /// Sends a planned chain strictly in order, one create at a time.
    ///
    /// Stops at the first failure. Earlier versions stay uploaded; the unsent
    /// tail is removed from the cache again.
    pub async fn run_chain(&self, upload: ChainUpload) -> Result<usize> {
        let ChainUpload {
            campaign,
            investigator,
            steps,
        } = upload;
        let total = steps.len();
        let mut uploaded = 0;
        let mut failure = None;

        let mut pending = steps.into_iter();
        for (deck, call) in pending.by_ref() {
            match self.execute(call).await {
                Ok(_) => {
                    uploaded += 1;
                    self.progress(StoreAction::UploadDeck {
                        campaign,
                        deck,
                        now: Utc::now(),
                    });
                    debug!("Uploaded {} ({}/{})", deck, uploaded, total);
                    self.events.publish(SyncEvent::DeckUploaded {
                        campaign,
                        investigator: investigator.clone(),
                        deck,
                        step: uploaded,
                        total,
                    });
                }
                Err(err) => {
                    failure = Some((deck, err));
                    break;
                }
            }
        }
        self.discard(pending.map(|(_, call)| call));

        self.progress(StoreAction::SyncDeck {
            campaign,
            investigator: investigator.clone(),
            uploading: false,
            now: Utc::now(),
        });

        let Some((failed_at, err)) = failure else {
            info!("Chain upload of {} finished ({} decks)", investigator, uploaded);
            self.events.publish(SyncEvent::UploadFinished {
                campaign,
                investigator,
                uploaded,
            });
            return Ok(uploaded);
        };

        warn!(
            "Chain upload of {} stopped at {} after {} decks",
            investigator, failed_at, uploaded
        );
        self.events.publish(SyncEvent::UploadFailed {
            campaign,
            investigator,
            failed_at,
            uploaded,
            error: err.to_string(),
        });
        match err {
            RuntimeError::Remote(source) => Err(RuntimeError::PartialUpload {
                uploaded,
                failed_at,
                source,
            }),
            other => Err(other),
        }
    }

    /// Newest deck of every investigator in `campaign`.
    pub fn chain_heads(&self, campaign: Uuid) -> Result<Vec<DeckId>> {
        let state = self.store.snapshot()?;
        let record = state.require_campaign(&campaign)?;
        let mut seen = BTreeSet::new();
        Ok(record
            .deck_ids
            .iter()
            .filter(|id| state.decks.contains(&id.key()))
            .filter(|id| seen.insert(id.key()))
            .copied()
            .collect())
    }

    // ------------------------------------------------------------------
    // Promotion
    // ------------------------------------------------------------------

    /// Gives `campaign` (and both halves of a linked campaign) a server
    /// identity and uploads its guide log.
    ///
    /// Returns the promoted ids, parent first. Promoting a campaign that
    /// already has a server id returns the existing ids without remote calls.
    /// Deck chains are uploaded separately by each member's worker.
    pub async fn promote(
        &self,
        campaign: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<UploadedCampaignId>> {
        let state = self.store.snapshot()?;
        let parent = state.require_campaign(&campaign)?.clone();
        let mut members = vec![parent.clone()];
        for uuid in parent.linked_uuids() {
            members.push(state.require_campaign(&uuid)?.clone());
        }

        if parent.id.is_promoted() {
            debug!("Campaign {} already promoted", parent.id);
            return Ok(members.iter().filter_map(|c| c.id.uploaded()).collect());
        }
        if self.session.user().is_none() {
            return Err(RuntimeError::AuthenticationRequired);
        }

        let server_ids = match members.as_slice() {
            [parent, a, b] => {
                let ids = self
                    .api
                    .create_linked_campaign(CreateLinkedCampaignRequest {
                        parent: CreateCampaignRequest::for_campaign(parent),
                        campaign_a: CreateCampaignRequest::for_campaign(a),
                        campaign_b: CreateCampaignRequest::for_campaign(b),
                    })
                    .await?;
                vec![ids.parent, ids.campaign_a, ids.campaign_b]
            }
            _ => vec![
                self.api
                    .create_campaign(CreateCampaignRequest::for_campaign(&parent))
                    .await?,
            ],
        };

        let mut promoted = Vec::with_capacity(members.len());
        for (member, server_id) in members.iter().zip(server_ids) {
            let uploaded = UploadedCampaignId {
                uuid: member.uuid(),
                server_id,
            };
            self.upload_member(&state, member, uploaded).await?;
            self.store.dispatch(&StoreAction::UpdateCampaign {
                campaign: uploaded.uuid,
                patch: CampaignPatch::promote(server_id),
                now,
            })?;

            info!("Promoted campaign {} to server id {}", uploaded.uuid, server_id);
            self.events.publish(SyncEvent::CampaignPromoted {
                campaign: uploaded.uuid,
                server_id,
            });
            promoted.push(uploaded);
        }
        Ok(promoted)
    }

    async fn upload_member(
        &self,
        state: &campaign_core::LocalState,
        member: &Campaign,
        uploaded: UploadedCampaignId,
    ) -> Result<()> {
        let guide = match state.guide(&uploaded.uuid) {
            Some(log) if member.guided => flatten_guide(log),
            _ => Vec::new(),
        };
        let snapshot = Campaign {
            id: uploaded.into(),
            ..member.clone()
        };

        self.cache.register_campaign(uploaded)?;
        let assigned = self
            .api
            .upload_campaign(UploadCampaignRequest {
                campaign: uploaded,
                snapshot,
                guide: guide.clone(),
            })
            .await?;
        if assigned.len() != guide.len() {
            warn!(
                "Server assigned {} ids for {} guide entries of {}",
                assigned.len(),
                guide.len(),
                uploaded.uuid
            );
        }

        let mirrored = guide
            .into_iter()
            .zip(assigned.into_iter().map(Some).chain(std::iter::repeat(None)))
            .map(|(entry, id)| GuideEntry {
                remote: id.map(ServerRef::Assigned),
                ..entry
            })
            .collect();
        self.cache
            .seed_guide(uploaded.server_id, GuideLog::from_entries(mirrored))?;
        if let Some(results) = state.chaos_bag_results.get(&uploaded.uuid) {
            self.cache
                .seed_chaos_bag_results(uploaded.server_id, results.clone())?;
        }
        Ok(())
    }
}

/// The server keeps no undo or reset markers, only the rows that survive them.
fn flatten_guide(log: &GuideLog) -> Vec<GuideEntry> {
    let effective: BTreeSet<u64> = log.effective_inputs().iter().map(|e| e.seq).collect();
    log.entries()
        .iter()
        .filter(|entry| {
            effective.contains(&entry.seq)
                || matches!(entry.body, GuideEntryBody::Achievement { .. })
        })
        .cloned()
        .collect()
}
