//! Chain traversal, drift detection and reconciliation planning.
//!
//! Every walk here is bounded by a visited set over the index it walks, so a
//! malformed or cyclic chain terminates instead of looping. References to
//! decks missing from the index end the walk: the chain is treated as
//! truncated at that point.
use std::collections::{BTreeMap, BTreeSet};

use super::cache::DeckCache;
use super::{Deck, DeckContent};
use crate::error::{CoreError, ErrorSeverity};
use crate::hash::{ContentHash, HashError};
use crate::identity::{DeckId, DeckKey, UploadedCampaignId};

/// Links of one node as seen by a [`ChainIndex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainLink {
    pub id: DeckId,
    pub previous: Option<DeckKey>,
    pub next: Option<DeckKey>,
}

/// Anything that can answer "what are the neighbours of this deck".
pub trait ChainIndex {
    fn link(&self, key: &DeckKey) -> Option<ChainLink>;
}

/// Walks backward from `start`, returning `start` first and the oldest version last.
pub fn backward_chain<I: ChainIndex + ?Sized>(index: &I, start: &DeckKey) -> Vec<DeckId> {
    walk(index, start, |link| link.previous)
}

fn walk<I, F>(index: &I, start: &DeckKey, step: F) -> Vec<DeckId>
where
    I: ChainIndex + ?Sized,
    F: Fn(&ChainLink) -> Option<DeckKey>,
{
    let mut visited = BTreeSet::new();
    let mut out = Vec::new();
    let mut cursor = Some(*start);
    while let Some(key) = cursor {
        if !visited.insert(key) {
            break;
        }
        let Some(link) = index.link(&key) else {
            break;
        };
        out.push(link.id);
        cursor = step(&link);
    }
    out
}

/// Every version in the lineage of `start`, oldest to newest, each exactly once.
///
/// Returns an empty list when `start` itself is not in the index.
pub fn traverse_chain<I: ChainIndex + ?Sized>(index: &I, start: &DeckKey) -> Vec<DeckId> {
    let mut chain = backward_chain(index, start);
    chain.reverse();

    let mut seen: BTreeSet<DeckKey> = chain.iter().map(DeckId::key).collect();
    for id in walk(index, start, |link| link.next).into_iter().skip(1) {
        if seen.insert(id.key()) {
            chain.push(id);
        }
    }
    chain
}

/// True when `content` no longer matches the hash recorded remotely.
pub fn detect_drift(content: &DeckContent, recorded: &ContentHash) -> Result<bool, HashError> {
    Ok(content.content_hash()? != *recorded)
}

/// Rejects a next-version link that mixes a device-origin deck with a legacy one.
pub fn validate_next_link(deck: &DeckId, previous: &DeckId) -> Result<(), LineageError> {
    if deck.is_local_origin() != previous.is_local_origin() {
        return Err(LineageError::IdentityMismatch {
            deck: *deck,
            previous: *previous,
        });
    }
    if deck.same_deck(previous) {
        return Err(LineageError::SelfReference(deck.key()));
    }
    Ok(())
}

/// One create call of a chain upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainStep {
    Base { deck: DeckId },
    Next { deck: DeckId, previous: DeckId },
}

impl ChainStep {
    pub const fn deck(&self) -> &DeckId {
        match self {
            Self::Base { deck } | Self::Next { deck, .. } => deck,
        }
    }
}

/// Create calls needed to upload the lineage of `start`, oldest first.
///
/// The oldest reachable version becomes a base deck, even when its own
/// `previous` dangles. Fails before producing any step if a link mixes origins.
pub fn upload_steps<I: ChainIndex + ?Sized>(
    index: &I,
    start: &DeckKey,
) -> Result<Vec<ChainStep>, LineageError> {
    let chain = traverse_chain(index, start);
    let mut steps = Vec::with_capacity(chain.len());
    let mut previous: Option<DeckId> = None;
    for deck in chain {
        match previous {
            None => steps.push(ChainStep::Base { deck }),
            Some(prev) => {
                validate_next_link(&deck, &prev)?;
                steps.push(ChainStep::Next {
                    deck,
                    previous: prev,
                });
            }
        }
        previous = Some(deck);
    }
    Ok(steps)
}

/// Remote mutations that make the server match a local chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub creates: Vec<ChainStep>,
    pub deletes: Vec<DeckId>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.deletes.is_empty()
    }
}

/// Plans a one-directional push of `local_chain` (oldest first) onto `remote`.
///
/// Local versions missing remotely are created; remote versions of the same
/// investigator whose origin is gone locally are deleted. Nothing flows back.
pub fn plan_reconcile(local_chain: &[Deck], remote: &DeckCache) -> Result<ReconcilePlan, LineageError> {
    let mut plan = ReconcilePlan::default();
    let local_keys: BTreeSet<DeckKey> = local_chain.iter().map(Deck::key).collect();

    for deck in local_chain {
        if remote.contains(&deck.key()) {
            continue;
        }
        let previous = deck
            .previous
            .filter(|prev| local_keys.contains(&prev.key()) || remote.contains(&prev.key()));
        match previous {
            None => plan.creates.push(ChainStep::Base { deck: deck.id }),
            Some(previous) => {
                validate_next_link(&deck.id, &previous)?;
                plan.creates.push(ChainStep::Next {
                    deck: deck.id,
                    previous,
                });
            }
        }
    }

    let investigators: BTreeSet<&str> = local_chain
        .iter()
        .map(|deck| deck.investigator_code.as_str())
        .collect();
    for remote_deck in remote.iter() {
        if investigators.contains(remote_deck.investigator_code.as_str())
            && !local_keys.contains(&remote_deck.key())
        {
            plan.deletes.push(remote_deck.id);
        }
    }
    Ok(plan)
}

/// What the server holds for one imported legacy deck.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyUpload {
    pub id: DeckId,
    pub content_hash: ContentHash,
    pub campaigns: Vec<UploadedCampaignId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacySyncPlan {
    /// Decks whose content drifted, once per campaign that contains them.
    pub updates: Vec<(DeckId, UploadedCampaignId)>,
    /// Device-origin uploads that are not part of the import.
    pub deletes: Vec<(DeckId, UploadedCampaignId)>,
}

/// Plans the sync after re-importing decks from the legacy deck site.
pub fn plan_legacy_sync(
    imported: &[Deck],
    uploaded: &BTreeMap<DeckKey, LegacyUpload>,
) -> Result<LegacySyncPlan, HashError> {
    let mut plan = LegacySyncPlan::default();
    let mut found = BTreeSet::new();

    for deck in imported {
        found.insert(deck.key());
        let Some(upload) = uploaded.get(&deck.key()) else {
            continue;
        };
        if detect_drift(&deck.content, &upload.content_hash)? {
            for campaign in &upload.campaigns {
                plan.updates.push((deck.id, *campaign));
            }
        }
    }

    for (key, upload) in uploaded {
        if upload.id.is_local_origin() && !found.contains(key) {
            for campaign in &upload.campaigns {
                plan.deletes.push((upload.id, *campaign));
            }
        }
    }
    Ok(plan)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LineageError {
    #[error("cannot link {deck} to {previous}: local and legacy decks cannot share a chain")]
    IdentityMismatch { deck: DeckId, previous: DeckId },

    #[error("deck {0} cannot be its own previous version")]
    SelfReference(DeckKey),

    #[error("previous version {previous} of deck {deck} is not stored")]
    MissingPrevious { deck: DeckId, previous: DeckId },

    #[error(transparent)]
    Hash(#[from] HashError),
}

impl CoreError for LineageError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::IdentityMismatch { .. } => ErrorSeverity::Validation,
            Self::SelfReference(_) => ErrorSeverity::Internal,
            Self::MissingPrevious { .. } => ErrorSeverity::Validation,
            Self::Hash(err) => err.severity(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::IdentityMismatch { .. } => "LINEAGE_IDENTITY_MISMATCH",
            Self::SelfReference(_) => "LINEAGE_SELF_REFERENCE",
            Self::MissingPrevious { .. } => "LINEAGE_MISSING_PREVIOUS",
            Self::Hash(err) => err.error_code(),
        }
    }
}
