//! Deck mutations against server-backed campaigns.
//!
//! Each action writes its optimistic result into the [`RemoteCache`] and
//! returns the [`RemoteCall`] that makes the server agree.
use campaign_core::{
    CampaignId, ChainStep, Deck, DeckId, PendingId, RemoteDeck, ServerRef, Session,
    UploadedCampaignId, UserId, backward_chain, detect_drift, plan_legacy_sync, plan_reconcile,
    validate_next_link,
};

use super::{RemoteCache, RemoteCall, RemoteRequest};
use crate::api::{DeckRequest, DeleteDeckRequest, NextDeckRequest, Result, RuntimeError};

/// Requires a promoted campaign.
pub fn require_uploaded(campaign: &CampaignId) -> Result<UploadedCampaignId> {
    campaign
        .uploaded()
        .ok_or(RuntimeError::NotPromoted(campaign.uuid))
}

/// Deck mutations on behalf of the signed-in user.
pub struct DeckActions<'a> {
    cache: &'a RemoteCache,
    user: UserId,
}

impl<'a> DeckActions<'a> {
    /// Fails with [`RuntimeError::AuthenticationRequired`] when signed out.
    pub fn new(cache: &'a RemoteCache, session: &Session) -> Result<Self> {
        let user = session
            .user()
            .cloned()
            .ok_or(RuntimeError::AuthenticationRequired)?;
        Ok(Self { cache, user })
    }

    fn remote_deck(
        &self,
        campaign: UploadedCampaignId,
        deck: &Deck,
        id: DeckId,
        previous: Option<DeckId>,
    ) -> Result<RemoteDeck> {
        Ok(RemoteDeck {
            id,
            campaign: campaign.server_id,
            owner: Some(self.user.clone()),
            investigator_code: deck.investigator_code.clone(),
            previous: previous.map(|p| p.key()),
            next: None,
            content: deck.content.clone(),
            content_hash: deck.content_hash()?,
        })
    }

    pub fn create_base_deck(&self, campaign: UploadedCampaignId, deck: &Deck) -> Result<RemoteCall> {
        let pending = PendingId::new();
        let optimistic =
            self.remote_deck(campaign, deck, deck.id.with_server(ServerRef::Pending(pending)), None)?;
        let request = DeckRequest {
            campaign,
            deck: deck.clone(),
            content_hash: optimistic.content_hash,
            optimistic: optimistic.clone(),
        };
        let undo = self.cache.insert_pending_deck(optimistic, pending)?;
        Ok(RemoteCall::new(
            campaign.uuid,
            RemoteRequest::CreateBaseDeck(request),
            undo,
        ))
    }

    /// Creates `deck` as the version after `previous`.
    ///
    /// Fails before touching the cache when the two decks have different
    /// origins.
    pub fn create_next_deck(
        &self,
        campaign: UploadedCampaignId,
        deck: &Deck,
        previous: DeckId,
    ) -> Result<RemoteCall> {
        validate_next_link(&deck.id, &previous)?;

        let pending = PendingId::new();
        let optimistic = self.remote_deck(
            campaign,
            deck,
            deck.id.with_server(ServerRef::Pending(pending)),
            Some(previous),
        )?;
        let request = NextDeckRequest {
            campaign,
            deck: deck.clone(),
            previous,
            content_hash: optimistic.content_hash,
            optimistic: optimistic.clone(),
        };
        let undo = self.cache.insert_pending_deck(optimistic, pending)?;
        Ok(RemoteCall::new(
            campaign.uuid,
            RemoteRequest::CreateNextDeck(request),
            undo,
        ))
    }

    /// Pushes edited content. Returns `None` when the content has not drifted
    /// from what the server holds.
    pub fn update_deck(&self, campaign: UploadedCampaignId, deck: &Deck) -> Result<Option<RemoteCall>> {
        let key = deck.key();
        let existing = self
            .cache
            .deck(campaign.server_id, &key)?
            .ok_or(RuntimeError::DeckNotFound(key))?;
        if !detect_drift(&deck.content, &existing.content_hash)? {
            tracing::debug!("Deck {} unchanged, skipping update", key);
            return Ok(None);
        }

        let optimistic = RemoteDeck {
            owner: existing.owner.clone().or_else(|| Some(self.user.clone())),
            content: deck.content.clone(),
            content_hash: deck.content_hash()?,
            ..existing
        };
        let request = DeckRequest {
            campaign,
            deck: deck.clone(),
            content_hash: optimistic.content_hash,
            optimistic: optimistic.clone(),
        };
        let Some(undo) = self.cache.update_deck(optimistic)? else {
            return Err(RuntimeError::DeckNotFound(key));
        };
        Ok(Some(RemoteCall::new(
            campaign.uuid,
            RemoteRequest::UpdateDeck(request),
            undo,
        )))
    }

    /// Deletes `deck`, and with `all_versions` every older version too.
    pub fn delete_deck(
        &self,
        campaign: UploadedCampaignId,
        deck: DeckId,
        all_versions: bool,
    ) -> Result<RemoteCall> {
        let key = deck.key();
        let index = self.cache.deck_cache(campaign.server_id)?;
        if !index.contains(&key) {
            return Err(RuntimeError::DeckNotFound(key));
        }

        let keys: Vec<_> = if all_versions {
            backward_chain(&index, &key).iter().map(DeckId::key).collect()
        } else {
            vec![key]
        };
        let undo = self.cache.remove_decks(campaign.server_id, &keys)?;
        let request = DeleteDeckRequest {
            campaign,
            deck,
            all_versions,
            optimistic: keys,
        };
        Ok(RemoteCall::new(
            campaign.uuid,
            RemoteRequest::DeleteDeck(request),
            undo,
        ))
    }

    /// Makes the server's copy of one investigator's chain match
    /// `local_chain` (oldest first): missing versions are created, remote
    /// versions gone locally are deleted.
    pub fn reconcile_chain(
        &self,
        campaign: UploadedCampaignId,
        local_chain: &[Deck],
    ) -> Result<Vec<RemoteCall>> {
        let index = self.cache.deck_cache(campaign.server_id)?;
        let plan = plan_reconcile(local_chain, &index)?;

        let mut calls = Vec::with_capacity(plan.creates.len() + plan.deletes.len());
        if let Err(err) = self.build_reconcile(campaign, local_chain, &plan, &mut calls) {
            self.rollback(&calls);
            return Err(err);
        }
        Ok(calls)
    }

    fn build_reconcile(
        &self,
        campaign: UploadedCampaignId,
        local_chain: &[Deck],
        plan: &campaign_core::ReconcilePlan,
        calls: &mut Vec<RemoteCall>,
    ) -> Result<()> {
        for step in &plan.creates {
            let Some(deck) = local_chain.iter().find(|d| d.id.same_deck(step.deck())) else {
                continue;
            };
            calls.push(match step {
                ChainStep::Base { .. } => self.create_base_deck(campaign, deck)?,
                ChainStep::Next { previous, .. } => {
                    self.create_next_deck(campaign, deck, *previous)?
                }
            });
        }
        for deck in &plan.deletes {
            calls.push(self.delete_deck(campaign, *deck, false)?);
        }
        Ok(())
    }

    /// Re-syncs after decks were re-imported from the legacy deck site.
    ///
    /// Drifted decks are updated in every campaign that holds them; uploaded
    /// device-origin decks missing from the import are deleted.
    pub fn sync_from_legacy(&self, imported: &[Deck]) -> Result<Vec<RemoteCall>> {
        let uploads = self.cache.legacy_uploads()?;
        let plan = plan_legacy_sync(imported, &uploads)?;

        let mut calls = Vec::new();
        if let Err(err) = self.build_legacy_sync(imported, &plan, &mut calls) {
            self.rollback(&calls);
            return Err(err);
        }
        Ok(calls)
    }

    fn build_legacy_sync(
        &self,
        imported: &[Deck],
        plan: &campaign_core::LegacySyncPlan,
        calls: &mut Vec<RemoteCall>,
    ) -> Result<()> {
        for (id, campaign) in &plan.updates {
            let Some(deck) = imported.iter().find(|d| d.id.same_deck(id)) else {
                continue;
            };
            if let Some(call) = self.update_deck(*campaign, deck)? {
                calls.push(call);
            }
        }
        for (id, campaign) in &plan.deletes {
            calls.push(self.delete_deck(*campaign, *id, false)?);
        }
        Ok(())
    }

    /// Reverts calls that were built but will never be sent.
    pub(crate) fn rollback(&self, calls: &[RemoteCall]) {
        for call in calls.iter().rev() {
            if let Err(err) = self.cache.rollback(&call.optimistic) {
                tracing::error!("Failed to roll back unsent {}: {}", call.kind(), err);
            }
        }
    }
}
