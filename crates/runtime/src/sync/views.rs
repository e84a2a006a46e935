//! Read paths. Every read re-runs the resolver and returns the whole entity
//! from the chosen replica.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campaign_core::{
    CampaignState, ChainIndex, ChaosBagResults, DataSource, Deck, DeckContent, DeckId, DeckKey,
    EntityKind, LocalState, RemoteDeck, Selection, backward_chain, replay_from, resolve,
};

use super::SyncOrchestrator;
use crate::api::Result;

/// A deck as read from whichever replica is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDeck {
    pub source: DataSource,
    pub id: DeckId,
    pub investigator_code: String,
    pub previous: Option<DeckKey>,
    pub next: Option<DeckKey>,
    pub content: DeckContent,
    pub scenario_count: u32,
}

impl ResolvedDeck {
    fn local(deck: &Deck) -> Self {
        Self {
            source: DataSource::Local,
            id: deck.id,
            investigator_code: deck.investigator_code.clone(),
            previous: deck.previous.map(|p| p.key()),
            next: deck.next.map(|n| n.key()),
            content: deck.content.clone(),
            scenario_count: deck.scenario_count,
        }
    }

    fn remote<I: ChainIndex + ?Sized>(deck: &RemoteDeck, index: &I) -> Self {
        let older = backward_chain(index, &deck.key()).len().saturating_sub(1);
        Self {
            source: DataSource::Remote,
            id: deck.id,
            investigator_code: deck.investigator_code.clone(),
            previous: deck.previous,
            next: deck.next,
            content: deck.content.clone(),
            scenario_count: u32::try_from(older).unwrap_or(u32::MAX),
        }
    }
}

impl SyncOrchestrator {
    /// Replays the authoritative guide log of `campaign`.
    pub fn guide_state(&self, campaign: Uuid) -> Result<CampaignState> {
        let state = self.store().snapshot()?;
        let record = state.require_campaign(&campaign)?;
        let session = self.session().current();

        let local = state.guide(&campaign);
        let remote = match record.id.uploaded() {
            Some(uploaded) => self.cache().guide(uploaded.server_id)?,
            None => None,
        };
        let selection = Selection::campaign_scoped(EntityKind::GuideState, &record.id, &session)
            .with_local(local.is_some())
            .with_remote(remote.is_some());
        let source = resolve(&selection);
        tracing::trace!("Guide state of {} read from {}", campaign, source);

        let initial = CampaignState::with_chaos_bag(record.chaos_bag.clone());
        Ok(match source {
            DataSource::Local => replay_from(initial, &local.cloned().unwrap_or_default()),
            DataSource::Remote => replay_from(initial, &remote.unwrap_or_default()),
        })
    }

    /// Reads one deck of `campaign`.
    pub fn deck(&self, campaign: Uuid, deck: DeckId) -> Result<Option<ResolvedDeck>> {
        let state = self.store().snapshot()?;
        let record = state.require_campaign(&campaign)?;
        let session = self.session().current();
        let key = deck.key();

        let local = state.decks.get(&key);
        let remote_index = match record.id.uploaded() {
            Some(uploaded) => Some(self.cache().deck_cache(uploaded.server_id)?),
            None => None,
        };
        let remote = remote_index.as_ref().and_then(|index| index.get(&key));

        let selection = Selection::deck(&deck, &record.id, &session)
            .with_local(local.is_some())
            .with_remote(remote.is_some())
            .with_owner(remote.and_then(|d| d.owner.clone()));
        Ok(match resolve(&selection) {
            DataSource::Local => local.map(ResolvedDeck::local),
            DataSource::Remote => match (remote, remote_index.as_ref()) {
                (Some(remote), Some(index)) => Some(ResolvedDeck::remote(remote, index)),
                _ => None,
            },
        })
    }

    /// Versions up to and including `deck`, oldest first.
    pub fn deck_history(&self, campaign: Uuid, deck: DeckId) -> Result<Vec<ResolvedDeck>> {
        let state = self.store().snapshot()?;
        let record = state.require_campaign(&campaign)?;
        let session = self.session().current();
        let key = deck.key();

        let remote = match record.id.uploaded() {
            Some(uploaded) => Some(self.cache().deck_cache(uploaded.server_id)?),
            None => None,
        };
        let remote_deck = remote.as_ref().and_then(|index| index.get(&key));
        let selection = Selection::campaign_scoped(EntityKind::DeckHistory, &record.id, &session)
            .with_local(state.decks.contains(&key))
            .with_remote(remote_deck.is_some())
            .with_owner(remote_deck.and_then(|d| d.owner.clone()));

        Ok(match (resolve(&selection), remote.as_ref()) {
            (DataSource::Remote, Some(index)) => backward_chain(index, &key)
                .iter()
                .rev()
                .filter_map(|id| index.get(&id.key()))
                .map(|d| ResolvedDeck::remote(d, index))
                .collect(),
            _ => local_history(&state, &key),
        })
    }

    pub fn chaos_bag_results(&self, campaign: Uuid) -> Result<ChaosBagResults> {
        let state = self.store().snapshot()?;
        let record = state.require_campaign(&campaign)?;
        let session = self.session().current();

        let local = state.chaos_bag_results.get(&campaign);
        let remote = match record.id.uploaded() {
            Some(uploaded) => self.cache().chaos_bag_results(uploaded.server_id)?,
            None => None,
        };
        let selection =
            Selection::campaign_scoped(EntityKind::ChaosBagResults, &record.id, &session)
                .with_local(local.is_some())
                .with_remote(remote.is_some());

        Ok(match resolve(&selection) {
            DataSource::Local => local.cloned().unwrap_or_default(),
            DataSource::Remote => remote.unwrap_or_default(),
        })
    }
}

fn local_history(state: &LocalState, key: &DeckKey) -> Vec<ResolvedDeck> {
    backward_chain(&state.decks, key)
        .iter()
        .rev()
        .filter_map(|id| state.decks.get(&id.key()))
        .map(ResolvedDeck::local)
        .collect()
}
