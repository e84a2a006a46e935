//! Deck snapshots and their version lineage.
//!
//! A deck is one version of an investigator's card list. Upgrading a deck
//! between scenarios creates a new version linked to the old one through
//! `previous` / `next`, forming a chain ordered oldest to newest.
mod cache;
mod lineage;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::{ContentHash, HashError};
use crate::identity::{DeckId, DeckKey};

pub use cache::{DeckCache, RemoteDeck};
pub use lineage::{
    ChainIndex, ChainLink, ChainStep, LegacySyncPlan, LegacyUpload, LineageError, ReconcilePlan,
    backward_chain, detect_drift, plan_legacy_sync, plan_reconcile, traverse_chain, upload_steps,
    validate_next_link,
};

/// Card list and metadata of a deck version. This is the hashed part of a deck.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckContent {
    pub name: String,
    #[serde(default)]
    pub slots: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub side_slots: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ignore_deck_limit_slots: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taboo_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_adjustment: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exile_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DeckContent {
    pub fn content_hash(&self) -> Result<ContentHash, HashError> {
        ContentHash::of(self)
    }
}

/// One version of a deck.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub investigator_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<DeckId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<DeckId>,
    pub content: DeckContent,
    /// Number of earlier versions, i.e. scenarios this deck has been upgraded through.
    #[serde(default)]
    pub scenario_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(
        id: DeckId,
        investigator_code: impl Into<String>,
        content: DeckContent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            investigator_code: investigator_code.into(),
            previous: None,
            next: None,
            content,
            scenario_count: 0,
            updated_at: now,
        }
    }

    pub fn key(&self) -> DeckKey {
        self.id.key()
    }

    /// Builds the next version of this deck. The caller still has to record
    /// the forward link on `self`.
    pub fn upgrade(&self, id: DeckId, content: DeckContent, now: DateTime<Utc>) -> Deck {
        Deck {
            id,
            investigator_code: self.investigator_code.clone(),
            previous: Some(self.id),
            next: None,
            content,
            scenario_count: self.scenario_count + 1,
            updated_at: now,
        }
    }

    pub fn content_hash(&self) -> Result<ContentHash, HashError> {
        self.content.content_hash()
    }
}
