//! Normalized cache of server-backed campaigns, decks and guide logs.
//!
//! Every write path updates this cache before its remote call is dispatched.
//! Writes are upserts keyed by identity (campaign server id plus [`DeckKey`],
//! or the guide entry's [`ServerRef`]), so optimistic writes from different
//! operations merge instead of overwriting each other. Each write hands back
//! an [`Optimistic`] undo image that the dispatcher later commits with
//! [`RemoteCache::acknowledge`] or reverts with [`RemoteCache::rollback`].
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use campaign_core::{
    ChaosBagResults, ContentHash, DeckCache, DeckKey, GuideEntry, GuideEntryBody, GuideLog,
    LegacyUpload, PendingId, RemoteDeck, ServerId, ServerRef, UploadedCampaignId, UserId,
};

use crate::api::{RepositoryError, Result};

#[derive(Debug, Default)]
struct CacheState {
    /// Promoted campaigns: server id -> device uuid.
    campaigns: BTreeMap<ServerId, Uuid>,
    decks: BTreeMap<(ServerId, DeckKey), RemoteDeck>,
    guides: BTreeMap<ServerId, GuideLog>,
    chaos_bag_results: BTreeMap<ServerId, ChaosBagResults>,
    /// Acknowledged pending refs.
    resolved: BTreeMap<PendingId, ServerId>,
}

/// Undo image of one optimistic cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Optimistic {
    DeckCreated {
        campaign: ServerId,
        key: DeckKey,
        pending: PendingId,
        /// Predecessor whose `next` was pointed at the new deck, with its old value.
        relinked: Option<(DeckKey, Option<DeckKey>)>,
    },
    DeckUpdated {
        campaign: ServerId,
        previous: Box<RemoteDeck>,
        applied: ContentHash,
    },
    DecksDeleted {
        campaign: ServerId,
        removed: Vec<RemoteDeck>,
    },
    EntryAppended {
        campaign: ServerId,
        pending: PendingId,
    },
    EntriesRemoved {
        campaign: ServerId,
        removed: Vec<GuideEntry>,
    },
    /// Nothing was written, e.g. promotion uploads.
    Nothing,
}

/// Shared handle to the remote cache.
#[derive(Clone, Default)]
pub struct RemoteCache {
    state: Arc<RwLock<CacheState>>,
}

impl RemoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CacheState>> {
        self.state
            .read()
            .map_err(|_| RepositoryError::LockPoisoned.into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CacheState>> {
        self.state
            .write()
            .map_err(|_| RepositoryError::LockPoisoned.into())
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    /// Records a promoted campaign. Its guide log starts empty unless seeded.
    pub fn register_campaign(&self, campaign: UploadedCampaignId) -> Result<()> {
        let mut state = self.write()?;
        state.campaigns.insert(campaign.server_id, campaign.uuid);
        state.guides.entry(campaign.server_id).or_default();
        Ok(())
    }

    pub fn seed_guide(&self, campaign: ServerId, log: GuideLog) -> Result<()> {
        self.write()?.guides.insert(campaign, log);
        Ok(())
    }

    pub fn seed_chaos_bag_results(
        &self,
        campaign: ServerId,
        results: ChaosBagResults,
    ) -> Result<()> {
        self.write()?.chaos_bag_results.insert(campaign, results);
        Ok(())
    }

    /// Identity-keyed upsert of a server-confirmed deck.
    pub fn upsert_deck(&self, deck: RemoteDeck) -> Result<()> {
        self.write()?
            .decks
            .insert((deck.campaign, deck.key()), deck);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn is_registered(&self, campaign: ServerId) -> Result<bool> {
        Ok(self.read()?.campaigns.contains_key(&campaign))
    }

    pub fn guide(&self, campaign: ServerId) -> Result<Option<GuideLog>> {
        Ok(self.read()?.guides.get(&campaign).cloned())
    }

    pub fn chaos_bag_results(&self, campaign: ServerId) -> Result<Option<ChaosBagResults>> {
        Ok(self.read()?.chaos_bag_results.get(&campaign).cloned())
    }

    pub fn deck(&self, campaign: ServerId, key: &DeckKey) -> Result<Option<RemoteDeck>> {
        Ok(self.read()?.decks.get(&(campaign, *key)).cloned())
    }

    pub fn deck_owner(&self, campaign: ServerId, key: &DeckKey) -> Result<Option<UserId>> {
        Ok(self
            .read()?
            .decks
            .get(&(campaign, *key))
            .and_then(|deck| deck.owner.clone()))
    }

    /// Lookup indexes over one campaign's decks.
    pub fn deck_cache(&self, campaign: ServerId) -> Result<DeckCache> {
        let state = self.read()?;
        Ok(DeckCache::from_decks(
            state
                .decks
                .iter()
                .filter(|((owner, _), _)| *owner == campaign)
                .map(|(_, deck)| deck.clone()),
        ))
    }

    /// Every uploaded deck with the campaigns that hold it.
    pub fn legacy_uploads(&self) -> Result<BTreeMap<DeckKey, LegacyUpload>> {
        let state = self.read()?;
        let mut uploads: BTreeMap<DeckKey, LegacyUpload> = BTreeMap::new();
        for ((server_id, key), deck) in &state.decks {
            let Some(uuid) = state.campaigns.get(server_id) else {
                continue;
            };
            let campaign = UploadedCampaignId {
                uuid: *uuid,
                server_id: *server_id,
            };
            uploads
                .entry(*key)
                .or_insert_with(|| LegacyUpload {
                    id: deck.id,
                    content_hash: deck.content_hash,
                    campaigns: Vec::new(),
                })
                .campaigns
                .push(campaign);
        }
        Ok(uploads)
    }

    /// The acknowledged id behind `server`, if any.
    pub fn resolve(&self, server: ServerRef) -> Result<Option<ServerId>> {
        Ok(match server {
            ServerRef::Assigned(id) => Some(id),
            ServerRef::Pending(pending) => self.read()?.resolved.get(&pending).copied(),
        })
    }

    // ------------------------------------------------------------------
    // Optimistic writes
    // ------------------------------------------------------------------

    /// Inserts a deck whose server id is still pending.
    ///
    /// When the deck names a previous version in the same campaign, that
    /// version's forward link is pointed at it.
    pub fn insert_pending_deck(&self, deck: RemoteDeck, pending: PendingId) -> Result<Optimistic> {
        let mut state = self.write()?;
        let campaign = deck.campaign;
        let key = deck.key();

        let relinked = match deck.previous {
            Some(prev_key) => state.decks.get_mut(&(campaign, prev_key)).map(|prev| {
                let old = prev.next.replace(key);
                (prev_key, old)
            }),
            None => None,
        };
        state.decks.insert((campaign, key), deck);

        tracing::debug!("Optimistic deck create {} in campaign {}", key, campaign);
        Ok(Optimistic::DeckCreated {
            campaign,
            key,
            pending,
            relinked,
        })
    }

    /// Replaces the content of a cached deck. Returns `None` when the deck
    /// is not cached.
    pub fn update_deck(&self, deck: RemoteDeck) -> Result<Option<Optimistic>> {
        let mut state = self.write()?;
        let slot = (deck.campaign, deck.key());
        let Some(existing) = state.decks.get_mut(&slot) else {
            return Ok(None);
        };

        let applied = deck.content_hash;
        // identity and links stay as the cache holds them
        let updated = RemoteDeck {
            id: existing.id,
            previous: existing.previous,
            next: existing.next,
            ..deck
        };
        let previous = std::mem::replace(existing, updated);

        tracing::debug!("Optimistic deck update {} in campaign {}", slot.1, slot.0);
        Ok(Some(Optimistic::DeckUpdated {
            campaign: slot.0,
            previous: Box::new(previous),
            applied,
        }))
    }

    /// Drops `keys` from one campaign. Successors keep a dangling `previous`.
    pub fn remove_decks(&self, campaign: ServerId, keys: &[DeckKey]) -> Result<Optimistic> {
        let mut state = self.write()?;
        let mut removed = Vec::new();
        for key in keys {
            if let Some(deck) = state.decks.remove(&(campaign, *key)) {
                removed.push(deck);
            }
        }
        for deck in &removed {
            if let Some(prev_key) = deck.previous
                && let Some(prev) = state.decks.get_mut(&(campaign, prev_key))
                && prev.next == Some(deck.key())
            {
                prev.next = None;
            }
        }

        tracing::debug!(
            "Optimistic delete of {} decks in campaign {}",
            removed.len(),
            campaign
        );
        Ok(Optimistic::DecksDeleted { campaign, removed })
    }

    /// Appends an entry under a fresh pending ref.
    pub fn append_entry(
        &self,
        campaign: ServerId,
        body: GuideEntryBody,
        now: DateTime<Utc>,
    ) -> Result<(GuideEntry, Optimistic)> {
        let mut state = self.write()?;
        let pending = PendingId::new();
        let log = state.guides.entry(campaign).or_default();
        log.append_with_remote(body, Some(ServerRef::Pending(pending)), now);

        let entry = log
            .entries()
            .last()
            .cloned()
            .ok_or_else(|| RepositoryError::CorruptedData("append produced no entry".into()))?;

        Ok((entry, Optimistic::EntryAppended { campaign, pending }))
    }

    /// Physically removes the entries backed by `refs`.
    pub fn remove_entries(&self, campaign: ServerId, refs: &[ServerRef]) -> Result<Optimistic> {
        let mut state = self.write()?;
        let Some(log) = state.guides.get_mut(&campaign) else {
            return Ok(Optimistic::Nothing);
        };
        let removed: Vec<GuideEntry> = log
            .entries()
            .iter()
            .filter(|entry| entry.remote.is_some_and(|r| refs.contains(&r)))
            .cloned()
            .collect();
        log.remove_remote(refs);

        Ok(Optimistic::EntriesRemoved { campaign, removed })
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Commits an optimistic write, swapping its pending ref for `assigned`.
    pub fn acknowledge(&self, optimistic: &Optimistic, assigned: Option<ServerId>) -> Result<()> {
        let mut state = self.write()?;
        match optimistic {
            Optimistic::DeckCreated {
                campaign,
                key,
                pending,
                ..
            } => {
                let Some(assigned) = assigned else {
                    return Ok(());
                };
                state.resolved.insert(*pending, assigned);
                if let Some(deck) = state.decks.get_mut(&(*campaign, *key))
                    && deck.server() == Some(ServerRef::Pending(*pending))
                {
                    deck.id = deck.id.with_server(ServerRef::Assigned(assigned));
                }
            }
            Optimistic::EntryAppended { campaign, pending } => {
                let Some(assigned) = assigned else {
                    return Ok(());
                };
                state.resolved.insert(*pending, assigned);
                if let Some(log) = state.guides.get_mut(campaign) {
                    log.resolve_remote(
                        ServerRef::Pending(*pending),
                        ServerRef::Assigned(assigned),
                    );
                }
            }
            Optimistic::DeckUpdated { .. }
            | Optimistic::DecksDeleted { .. }
            | Optimistic::EntriesRemoved { .. }
            | Optimistic::Nothing => {}
        }
        Ok(())
    }

    /// Reverts an optimistic write, leaving later writes to the same identity alone.
    pub fn rollback(&self, optimistic: &Optimistic) -> Result<()> {
        let mut state = self.write()?;
        match optimistic {
            Optimistic::DeckCreated {
                campaign,
                key,
                pending,
                relinked,
            } => {
                let slot = (*campaign, *key);
                if state
                    .decks
                    .get(&slot)
                    .is_some_and(|deck| deck.server() == Some(ServerRef::Pending(*pending)))
                {
                    state.decks.remove(&slot);
                }
                if let Some((prev_key, old_next)) = relinked
                    && let Some(prev) = state.decks.get_mut(&(*campaign, *prev_key))
                    && prev.next == Some(*key)
                {
                    prev.next = *old_next;
                }
            }
            Optimistic::DeckUpdated {
                campaign,
                previous,
                applied,
            } => {
                let slot = (*campaign, previous.key());
                if let Some(deck) = state.decks.get_mut(&slot)
                    && deck.content_hash == *applied
                {
                    deck.content = previous.content.clone();
                    deck.content_hash = previous.content_hash;
                }
            }
            Optimistic::DecksDeleted { campaign, removed } => {
                for deck in removed {
                    state
                        .decks
                        .entry((*campaign, deck.key()))
                        .or_insert_with(|| deck.clone());
                }
                for deck in removed {
                    if let Some(prev_key) = deck.previous
                        && let Some(prev) = state.decks.get_mut(&(*campaign, prev_key))
                        && prev.next.is_none()
                    {
                        prev.next = Some(deck.key());
                    }
                }
            }
            Optimistic::EntryAppended { campaign, pending } => {
                if let Some(log) = state.guides.get_mut(campaign) {
                    log.remove_remote(&[ServerRef::Pending(*pending)]);
                }
            }
            Optimistic::EntriesRemoved { campaign, removed } => {
                if let Some(log) = state.guides.get_mut(campaign) {
                    log.restore(removed.iter().cloned());
                }
            }
            Optimistic::Nothing => {}
        }
        Ok(())
    }
}
