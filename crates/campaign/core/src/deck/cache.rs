//! Index of server-backed decks for one campaign.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DeckContent;
use super::lineage::{ChainIndex, ChainLink};
use crate::hash::ContentHash;
use crate::identity::{DeckId, DeckKey, ServerId, ServerRef, UserId};

/// A deck as the server (or the optimistic cache) knows it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDeck {
    pub id: DeckId,
    /// Server id of the owning campaign.
    pub campaign: ServerId,
    pub owner: Option<UserId>,
    pub investigator_code: String,
    pub previous: Option<DeckKey>,
    pub next: Option<DeckKey>,
    pub content: DeckContent,
    pub content_hash: ContentHash,
}

impl RemoteDeck {
    pub fn key(&self) -> DeckKey {
        self.id.key()
    }

    pub fn server(&self) -> Option<ServerRef> {
        self.id.server()
    }
}

/// Remote decks indexed by server id, by local uuid and by legacy id.
///
/// Lets lineage walks happen without extra round trips.
#[derive(Clone, Debug, Default)]
pub struct DeckCache {
    decks: BTreeMap<DeckKey, RemoteDeck>,
    all: BTreeMap<ServerId, DeckKey>,
    local: BTreeMap<Uuid, DeckKey>,
    arkhamdb: BTreeMap<u64, DeckKey>,
}

impl DeckCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_decks(decks: impl IntoIterator<Item = RemoteDeck>) -> Self {
        let mut cache = Self::new();
        for deck in decks {
            cache.insert(deck);
        }
        cache
    }

    /// Inserts or replaces the deck stored under the same identity key.
    pub fn insert(&mut self, deck: RemoteDeck) {
        let key = deck.key();
        let stale = self
            .decks
            .get(&key)
            .and_then(|previous| previous.server())
            .and_then(|s| s.assigned());
        if let Some(server_id) = stale {
            self.all.remove(&server_id);
        }

        if let Some(server_id) = deck.server().and_then(|s| s.assigned()) {
            self.all.insert(server_id, key);
        }
        match key {
            DeckKey::Local(uuid) => {
                self.local.insert(uuid, key);
            }
            DeckKey::ArkhamDb(id) => {
                self.arkhamdb.insert(id, key);
            }
        }
        self.decks.insert(key, deck);
    }

    pub fn get(&self, key: &DeckKey) -> Option<&RemoteDeck> {
        self.decks.get(key)
    }

    pub fn by_server_id(&self, id: ServerId) -> Option<&RemoteDeck> {
        self.all.get(&id).and_then(|key| self.decks.get(key))
    }

    pub fn by_local_uuid(&self, uuid: &Uuid) -> Option<&RemoteDeck> {
        self.local.get(uuid).and_then(|key| self.decks.get(key))
    }

    pub fn by_arkhamdb_id(&self, id: u64) -> Option<&RemoteDeck> {
        self.arkhamdb.get(&id).and_then(|key| self.decks.get(key))
    }

    pub fn contains(&self, key: &DeckKey) -> bool {
        self.decks.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteDeck> {
        self.decks.values()
    }

    /// Decks that were first created on a device.
    pub fn local_origin(&self) -> impl Iterator<Item = &RemoteDeck> {
        self.local.values().filter_map(|key| self.decks.get(key))
    }

    pub fn len(&self) -> usize {
        self.decks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decks.is_empty()
    }
}

impl ChainIndex for DeckCache {
    fn link(&self, key: &DeckKey) -> Option<ChainLink> {
        self.decks.get(key).map(|deck| ChainLink {
            id: deck.id,
            previous: deck.previous,
            next: deck.next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: DeckId, server: i64) -> RemoteDeck {
        let content = DeckContent::default();
        RemoteDeck {
            id: id.with_server(ServerRef::Assigned(ServerId(server))),
            campaign: ServerId(1),
            owner: None,
            investigator_code: "01001".into(),
            previous: None,
            next: None,
            content_hash: content.content_hash().unwrap(),
            content,
        }
    }

    #[test]
    fn indexes_by_every_identity_form() {
        let uuid = Uuid::new_v4();
        let cache = DeckCache::from_decks([
            remote(DeckId::local(uuid), 10),
            remote(DeckId::legacy(77, Some(3)), 11),
        ]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.by_server_id(ServerId(10)).unwrap().key(), DeckKey::Local(uuid));
        assert!(cache.by_local_uuid(&uuid).is_some());
        assert_eq!(cache.by_arkhamdb_id(77).unwrap().key(), DeckKey::ArkhamDb(77));
        assert_eq!(cache.local_origin().count(), 1);
    }

    #[test]
    fn reinserting_moves_server_index() {
        let uuid = Uuid::new_v4();
        let mut cache = DeckCache::new();
        cache.insert(remote(DeckId::local(uuid), 10));
        cache.insert(remote(DeckId::local(uuid), 12));

        assert_eq!(cache.len(), 1);
        assert!(cache.by_server_id(ServerId(10)).is_none());
        assert!(cache.by_server_id(ServerId(12)).is_some());
    }
}
