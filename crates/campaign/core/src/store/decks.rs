//! Device-side deck collection.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deck::{ChainIndex, ChainLink, Deck, backward_chain, traverse_chain};
use crate::identity::{DeckId, DeckKey};

/// All decks on the device plus the "my decks" list, which holds only the
/// newest version of each lineage, most recently written first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckStore {
    decks: BTreeMap<DeckKey, Deck>,
    my_decks: Vec<DeckKey>,
    /// Device uuid -> legacy identity it was replaced with.
    replaced_local_ids: BTreeMap<Uuid, DeckId>,
}

impl DeckStore {
    pub fn get(&self, key: &DeckKey) -> Option<&Deck> {
        self.decks.get(key)
    }

    pub fn contains(&self, key: &DeckKey) -> bool {
        self.decks.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deck> {
        self.decks.values()
    }

    pub fn len(&self) -> usize {
        self.decks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decks.is_empty()
    }

    pub fn my_decks(&self) -> &[DeckKey] {
        &self.my_decks
    }

    pub fn replaced_local_id(&self, uuid: &Uuid) -> Option<&DeckId> {
        self.replaced_local_ids.get(uuid)
    }

    /// Versions of the lineage containing `key`, oldest first.
    pub fn chain(&self, key: &DeckKey) -> Vec<&Deck> {
        traverse_chain(self, key)
            .iter()
            .filter_map(|id| self.decks.get(&id.key()))
            .collect()
    }

    fn scenario_count(&self, deck: &Deck) -> u32 {
        let Some(previous) = deck.previous else {
            return 0;
        };
        let older = backward_chain(self, &previous.key())
            .into_iter()
            .filter(|id| !id.same_deck(&deck.id))
            .count();
        // a dangling previous still counts as one upgrade
        u32::try_from(older.max(1)).unwrap_or(u32::MAX)
    }

    /// Inserts or replaces a deck, recomputing its scenario count.
    ///
    /// A deck not seen before becomes the head of its lineage in "my decks",
    /// replacing its previous version. A write to an existing deck moves it to
    /// the front when `is_write` is set.
    pub fn upsert(&mut self, mut deck: Deck, is_write: bool) {
        let key = deck.key();
        deck.scenario_count = self.scenario_count(&deck);
        let is_new = !self.decks.contains_key(&key);

        if let Some(previous) = deck.previous {
            if let Some(prev) = self.decks.get_mut(&previous.key()) {
                prev.next = Some(deck.id);
            }
        }

        if is_new {
            let previous = deck.previous.map(|p| p.key());
            self.my_decks
                .retain(|k| *k != key && Some(*k) != previous);
            self.my_decks.insert(0, key);
        } else if is_write {
            self.my_decks.retain(|k| *k != key);
            self.my_decks.insert(0, key);
        }
        self.decks.insert(key, deck);
    }

    /// Deletes a deck and, with `delete_all_versions`, every older version.
    ///
    /// Successors are never deleted: their `previous` is left dangling. A
    /// single delete clears the predecessor's forward link. Returns the
    /// removed keys.
    pub fn delete(&mut self, id: &DeckId, delete_all_versions: bool) -> BTreeSet<DeckKey> {
        let key = id.key();
        let mut removed = BTreeSet::new();
        if !self.decks.contains_key(&key) {
            return removed;
        }

        if delete_all_versions {
            for version in backward_chain(self, &key) {
                removed.insert(version.key());
            }
        } else {
            removed.insert(key);
            let previous = self.decks.get(&key).and_then(|deck| deck.previous);
            if let Some(prev) = previous.and_then(|p| self.decks.get_mut(&p.key())) {
                if prev.next.is_some_and(|next| next.same_deck(id)) {
                    prev.next = None;
                }
            }
        }

        for key in &removed {
            self.decks.remove(key);
        }
        self.my_decks.retain(|k| !removed.contains(k));
        removed
    }

    /// Re-identifies a device deck as a legacy deck after it was published.
    pub fn replace_local(&mut self, local: Uuid, mut deck: Deck) {
        let old_key = DeckKey::Local(local);
        let new_key = deck.key();
        deck.scenario_count = self.scenario_count(&deck);
        self.decks.remove(&old_key);
        for existing in self.decks.values_mut() {
            if existing.previous.is_some_and(|p| p.key() == old_key) {
                existing.previous = Some(deck.id);
            }
            if existing.next.is_some_and(|n| n.key() == old_key) {
                existing.next = Some(deck.id);
            }
        }
        self.decks.insert(new_key, deck.clone());
        for key in &mut self.my_decks {
            if *key == old_key {
                *key = new_key;
            }
        }
        self.replaced_local_ids.insert(local, deck.id);
    }

    /// Drops every deck that did not originate on this device.
    pub fn clear_remote(&mut self) {
        self.decks.retain(|_, deck| deck.id.is_local_origin());
        let decks = &self.decks;
        self.my_decks.retain(|key| decks.contains_key(key));
        self.replaced_local_ids.clear();
    }
}

impl ChainIndex for DeckStore {
    fn link(&self, key: &DeckKey) -> Option<ChainLink> {
        self.decks.get(key).map(|deck| ChainLink {
            id: deck.id,
            previous: deck.previous.map(|p| p.key()),
            next: deck.next.map(|n| n.key()),
        })
    }
}
