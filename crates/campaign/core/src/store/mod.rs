//! Device store state and its pure reducers.
//!
//! [`reduce`] never mutates its input: it clones the state, applies the action
//! to the copy and returns it. Actions carry their own `now`, so reducing the
//! same action sequence always produces the same state.
mod campaign;
mod decks;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deck::Deck;
use crate::error::{CoreError, ErrorSeverity};
use crate::guide::{AchievementOp, GuideInput, GuideLog};
use crate::identity::{DeckId, DeckKey};

pub use campaign::{
    BlessCurse, Campaign, CampaignLink, CampaignPatch, ChaosBagResults, Direction,
    InvestigatorData,
};
pub use decks::DeckStore;

/// Chain uploads in flight. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Campaign uuid -> investigators whose chain is uploading.
    pub uploading: BTreeMap<Uuid, BTreeSet<String>>,
    /// Campaign uuid -> decks already handed to the remote API.
    pub uploaded: BTreeMap<Uuid, BTreeSet<DeckKey>>,
}

impl SyncProgress {
    pub fn is_uploading(&self, campaign: &Uuid, investigator: &str) -> bool {
        self.uploading
            .get(campaign)
            .is_some_and(|set| set.contains(investigator))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    pub campaigns: BTreeMap<Uuid, Campaign>,
    #[serde(default)]
    pub chaos_bag_results: BTreeMap<Uuid, ChaosBagResults>,
    #[serde(default)]
    pub decks: DeckStore,
    #[serde(default)]
    pub guides: BTreeMap<Uuid, GuideLog>,
    #[serde(default)]
    pub sync: SyncProgress,
}

impl LocalState {
    pub fn campaign(&self, uuid: &Uuid) -> Option<&Campaign> {
        self.campaigns.get(uuid)
    }

    pub fn require_campaign(&self, uuid: &Uuid) -> Result<&Campaign, StoreError> {
        self.campaign(uuid).ok_or(StoreError::CampaignNotFound(*uuid))
    }

    pub fn require_deck(&self, id: &DeckId) -> Result<&Deck, StoreError> {
        self.decks
            .get(&id.key())
            .ok_or(StoreError::DeckNotFound(id.key()))
    }

    pub fn guide(&self, uuid: &Uuid) -> Option<&GuideLog> {
        self.guides.get(uuid)
    }

    /// Copy suitable for whole-state persistence: transient sync progress is dropped.
    pub fn persistable(&self) -> LocalState {
        LocalState {
            sync: SyncProgress::default(),
            ..self.clone()
        }
    }

    /// Applies `action` in place.
    pub fn apply(&mut self, action: &StoreAction) {
        match action {
            StoreAction::NewCampaign { campaign, .. } => {
                let uuid = campaign.uuid();
                self.chaos_bag_results.insert(uuid, ChaosBagResults::default());
                if campaign.guided {
                    self.guides.entry(uuid).or_default();
                }
                self.campaigns.insert(uuid, campaign.clone());
            }
            StoreAction::NewLinkedCampaign {
                uuid,
                uuid_a,
                uuid_b,
                name,
                cycle_code,
                cycle_code_a,
                cycle_code_b,
                now,
            } => {
                let mut a = Campaign::new_guided(
                    *uuid_a,
                    format!("{name} (Campaign A)"),
                    cycle_code_a.clone(),
                    *now,
                );
                let mut b = Campaign::new_guided(
                    *uuid_b,
                    format!("{name} (Campaign B)"),
                    cycle_code_b.clone(),
                    *now,
                );
                a.linked_campaign = Some(*uuid_b);
                b.linked_campaign = Some(*uuid_a);
                let mut parent = Campaign::new_guided(*uuid, name.clone(), cycle_code.clone(), *now);
                parent.link = Some(CampaignLink {
                    campaign_a: *uuid_a,
                    campaign_b: *uuid_b,
                });
                for campaign in [parent, a, b] {
                    let id = campaign.uuid();
                    self.chaos_bag_results.insert(id, ChaosBagResults::default());
                    self.guides.entry(id).or_default();
                    self.campaigns.insert(id, campaign);
                }
            }
            StoreAction::UpdateCampaign {
                campaign,
                patch,
                now,
            } => {
                if let Some(existing) = self.campaigns.get_mut(campaign) {
                    patch.apply(existing);
                    existing.updated_at = *now;
                }
            }
            StoreAction::DeleteCampaign { campaign, .. } => {
                self.campaigns.remove(campaign);
                self.chaos_bag_results.remove(campaign);
                self.guides.remove(campaign);
                self.sync.uploading.remove(campaign);
                self.sync.uploaded.remove(campaign);
            }
            StoreAction::AddInvestigator {
                campaign,
                investigator,
                deck,
                now,
            } => {
                if let Some(existing) = self.campaigns.get_mut(campaign) {
                    match deck {
                        Some(deck) => {
                            if !existing.deck_ids.iter().any(|d| d.same_deck(deck)) {
                                existing.deck_ids.push(*deck);
                            }
                        }
                        None => {
                            existing.non_deck_investigators.insert(investigator.clone());
                        }
                    }
                    existing.updated_at = *now;
                }
            }
            StoreAction::RemoveInvestigator {
                campaign,
                investigator,
                deck,
                now,
            } => {
                if let Some(existing) = self.campaigns.get_mut(campaign) {
                    match deck {
                        Some(deck) => existing.deck_ids.retain(|d| !d.same_deck(deck)),
                        None => {
                            existing.non_deck_investigators.remove(investigator);
                        }
                    }
                    existing.updated_at = *now;
                }
            }
            StoreAction::AdjustSpentXp {
                campaign,
                investigator,
                direction,
                now,
            } => {
                if let Some(existing) = self.campaigns.get_mut(campaign) {
                    let data = existing
                        .investigator_data
                        .entry(investigator.clone())
                        .or_default();
                    data.spent_xp = direction.step(data.spent_xp);
                    existing.updated_at = *now;
                }
            }
            StoreAction::UpdateChaosBagResults {
                campaign, results, ..
            } => {
                self.chaos_bag_results.insert(*campaign, results.clone());
            }
            StoreAction::AdjustBlessCurse {
                campaign,
                token,
                direction,
                ..
            } => {
                let results = self.chaos_bag_results.entry(*campaign).or_default();
                match token {
                    BlessCurse::Bless => results.bless_tokens = direction.step(results.bless_tokens),
                    BlessCurse::Curse => results.curse_tokens = direction.step(results.curse_tokens),
                }
            }
            StoreAction::UpsertDeck { deck, is_write, .. } => {
                self.decks.upsert(deck.clone(), *is_write);
            }
            StoreAction::DeleteDeck {
                deck,
                delete_all_versions,
                ..
            } => {
                let removed = self.decks.delete(deck, *delete_all_versions);
                for campaign in self.campaigns.values_mut() {
                    campaign.deck_ids.retain(|d| !removed.contains(&d.key()));
                }
            }
            StoreAction::ReplaceLocalDeck { local, deck, .. } => {
                self.decks.replace_local(*local, deck.clone());
                let old = DeckKey::Local(*local);
                for campaign in self.campaigns.values_mut() {
                    for id in &mut campaign.deck_ids {
                        if id.key() == old {
                            *id = deck.id;
                        }
                    }
                }
            }
            StoreAction::ClearRemoteDecks { .. } => {
                self.decks.clear_remote();
                for campaign in self.campaigns.values_mut() {
                    campaign.deck_ids.retain(DeckId::is_local_origin);
                }
            }
            StoreAction::GuideSetInput {
                campaign,
                input,
                now,
            } => {
                self.guides
                    .entry(*campaign)
                    .or_default()
                    .append_input(input.clone(), *now);
            }
            StoreAction::GuideUndo {
                campaign,
                scenario,
                now,
            } => {
                if let Some(log) = self.guides.get_mut(campaign) {
                    if !log.undo_targets(scenario).is_empty() {
                        log.append_undo(scenario.clone(), *now);
                    }
                }
            }
            StoreAction::GuideResetScenario {
                campaign,
                scenario,
                now,
            } => {
                self.guides
                    .entry(*campaign)
                    .or_default()
                    .append_reset(scenario.clone(), *now);
            }
            StoreAction::GuideUpdateAchievement {
                campaign,
                id,
                op,
                now,
            } => {
                self.guides
                    .entry(*campaign)
                    .or_default()
                    .append_achievement(id.clone(), *op, *now);
            }
            StoreAction::SyncDeck {
                campaign,
                investigator,
                uploading,
                ..
            } => {
                let set = self.sync.uploading.entry(*campaign).or_default();
                if *uploading {
                    set.insert(investigator.clone());
                } else {
                    set.remove(investigator);
                    if set.is_empty() {
                        self.sync.uploading.remove(campaign);
                    }
                }
            }
            StoreAction::UploadDeck { campaign, deck, .. } => {
                self.sync
                    .uploaded
                    .entry(*campaign)
                    .or_default()
                    .insert(deck.key());
            }
        }
    }
}

/// Typed device-store action. Every action carries the time it was issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreAction {
    NewCampaign {
        campaign: Campaign,
        now: DateTime<Utc>,
    },
    /// Creates the parent and both halves; the halves reference each other.
    NewLinkedCampaign {
        uuid: Uuid,
        uuid_a: Uuid,
        uuid_b: Uuid,
        name: String,
        cycle_code: String,
        cycle_code_a: String,
        cycle_code_b: String,
        now: DateTime<Utc>,
    },
    UpdateCampaign {
        campaign: Uuid,
        patch: CampaignPatch,
        now: DateTime<Utc>,
    },
    DeleteCampaign {
        campaign: Uuid,
        now: DateTime<Utc>,
    },
    AddInvestigator {
        campaign: Uuid,
        investigator: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deck: Option<DeckId>,
        now: DateTime<Utc>,
    },
    /// Removes by deck when given, otherwise by investigator code.
    RemoveInvestigator {
        campaign: Uuid,
        investigator: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deck: Option<DeckId>,
        now: DateTime<Utc>,
    },
    AdjustSpentXp {
        campaign: Uuid,
        investigator: String,
        direction: Direction,
        now: DateTime<Utc>,
    },
    UpdateChaosBagResults {
        campaign: Uuid,
        results: ChaosBagResults,
        now: DateTime<Utc>,
    },
    AdjustBlessCurse {
        campaign: Uuid,
        token: BlessCurse,
        direction: Direction,
        now: DateTime<Utc>,
    },
    UpsertDeck {
        deck: Deck,
        #[serde(default)]
        is_write: bool,
        now: DateTime<Utc>,
    },
    DeleteDeck {
        deck: DeckId,
        delete_all_versions: bool,
        now: DateTime<Utc>,
    },
    ReplaceLocalDeck {
        local: Uuid,
        deck: Deck,
        now: DateTime<Utc>,
    },
    ClearRemoteDecks {
        now: DateTime<Utc>,
    },
    GuideSetInput {
        campaign: Uuid,
        input: GuideInput,
        now: DateTime<Utc>,
    },
    GuideUndo {
        campaign: Uuid,
        scenario: String,
        now: DateTime<Utc>,
    },
    GuideResetScenario {
        campaign: Uuid,
        scenario: String,
        now: DateTime<Utc>,
    },
    GuideUpdateAchievement {
        campaign: Uuid,
        id: String,
        op: AchievementOp,
        now: DateTime<Utc>,
    },
    SyncDeck {
        campaign: Uuid,
        investigator: String,
        uploading: bool,
        now: DateTime<Utc>,
    },
    UploadDeck {
        campaign: Uuid,
        deck: DeckId,
        now: DateTime<Utc>,
    },
}

impl StoreAction {
    /// False for transient sync progress, which is never journaled.
    pub const fn is_persistent(&self) -> bool {
        !matches!(self, Self::SyncDeck { .. } | Self::UploadDeck { .. })
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::NewCampaign { now, .. }
            | Self::NewLinkedCampaign { now, .. }
            | Self::UpdateCampaign { now, .. }
            | Self::DeleteCampaign { now, .. }
            | Self::AddInvestigator { now, .. }
            | Self::RemoveInvestigator { now, .. }
            | Self::AdjustSpentXp { now, .. }
            | Self::UpdateChaosBagResults { now, .. }
            | Self::AdjustBlessCurse { now, .. }
            | Self::UpsertDeck { now, .. }
            | Self::DeleteDeck { now, .. }
            | Self::ReplaceLocalDeck { now, .. }
            | Self::ClearRemoteDecks { now }
            | Self::GuideSetInput { now, .. }
            | Self::GuideUndo { now, .. }
            | Self::GuideResetScenario { now, .. }
            | Self::GuideUpdateAchievement { now, .. }
            | Self::SyncDeck { now, .. }
            | Self::UploadDeck { now, .. } => *now,
        }
    }

    /// The serialized `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewCampaign { .. } => "new_campaign",
            Self::NewLinkedCampaign { .. } => "new_linked_campaign",
            Self::UpdateCampaign { .. } => "update_campaign",
            Self::DeleteCampaign { .. } => "delete_campaign",
            Self::AddInvestigator { .. } => "add_investigator",
            Self::RemoveInvestigator { .. } => "remove_investigator",
            Self::AdjustSpentXp { .. } => "adjust_spent_xp",
            Self::UpdateChaosBagResults { .. } => "update_chaos_bag_results",
            Self::AdjustBlessCurse { .. } => "adjust_bless_curse",
            Self::UpsertDeck { .. } => "upsert_deck",
            Self::DeleteDeck { .. } => "delete_deck",
            Self::ReplaceLocalDeck { .. } => "replace_local_deck",
            Self::ClearRemoteDecks { .. } => "clear_remote_decks",
            Self::GuideSetInput { .. } => "guide_set_input",
            Self::GuideUndo { .. } => "guide_undo",
            Self::GuideResetScenario { .. } => "guide_reset_scenario",
            Self::GuideUpdateAchievement { .. } => "guide_update_achievement",
            Self::SyncDeck { .. } => "sync_deck",
            Self::UploadDeck { .. } => "upload_deck",
        }
    }
}

/// Pure reducer: returns the state after `action`, leaving `state` untouched.
pub fn reduce(state: &LocalState, action: &StoreAction) -> LocalState {
    let mut next = state.clone();
    next.apply(action);
    next
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("campaign {0} not found in local store")]
    CampaignNotFound(Uuid),

    #[error("deck {0} not found in local store")]
    DeckNotFound(DeckKey),
}

impl CoreError for StoreError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::CampaignNotFound(_) => "STORE_CAMPAIGN_NOT_FOUND",
            Self::DeckNotFound(_) => "STORE_DECK_NOT_FOUND",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::DeckContent;
    use crate::identity::ServerId;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn with_campaign() -> (LocalState, Uuid) {
        let uuid = Uuid::new_v4();
        let state = reduce(
            &LocalState::default(),
            &StoreAction::NewCampaign {
                campaign: Campaign::new_guided(uuid, "Night of the Zealot", "core", now()),
                now: now(),
            },
        );
        (state, uuid)
    }

    #[test]
    fn reduce_does_not_touch_input_state() {
        let (state, uuid) = with_campaign();
        let before = state.clone();
        let after = reduce(
            &state,
            &StoreAction::DeleteCampaign {
                campaign: uuid,
                now: now(),
            },
        );
        assert_eq!(state, before);
        assert!(after.campaigns.is_empty());
    }

    #[test]
    fn updating_missing_campaign_is_noop() {
        let state = LocalState::default();
        let after = reduce(
            &state,
            &StoreAction::UpdateCampaign {
                campaign: Uuid::new_v4(),
                patch: CampaignPatch::promote(ServerId(1)),
                now: now(),
            },
        );
        assert_eq!(after, state);
    }

    #[test]
    fn promotion_sets_server_id() {
        let (state, uuid) = with_campaign();
        let after = reduce(
            &state,
            &StoreAction::UpdateCampaign {
                campaign: uuid,
                patch: CampaignPatch::promote(ServerId(42)),
                now: now(),
            },
        );
        assert_eq!(after.campaigns[&uuid].id.server_id, Some(ServerId(42)));
    }

    #[test]
    fn linked_campaign_halves_reference_each_other() {
        let (uuid, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let state = reduce(
            &LocalState::default(),
            &StoreAction::NewLinkedCampaign {
                uuid,
                uuid_a: a,
                uuid_b: b,
                name: "Dream-Eaters".into(),
                cycle_code: "tde".into(),
                cycle_code_a: "tdea".into(),
                cycle_code_b: "tdeb".into(),
                now: now(),
            },
        );
        assert_eq!(state.campaigns.len(), 3);
        assert_eq!(state.campaigns[&a].linked_campaign, Some(b));
        assert_eq!(state.campaigns[&b].linked_campaign, Some(a));
        assert_eq!(state.campaigns[&uuid].linked_uuids(), vec![a, b]);
    }

    #[test]
    fn spent_xp_never_goes_negative() {
        let (mut state, uuid) = with_campaign();
        for direction in [Direction::Inc, Direction::Dec, Direction::Dec] {
            state = reduce(
                &state,
                &StoreAction::AdjustSpentXp {
                    campaign: uuid,
                    investigator: "01001".into(),
                    direction,
                    now: now(),
                },
            );
        }
        assert_eq!(state.campaigns[&uuid].investigator_data["01001"].spent_xp, 0);
    }

    #[test]
    fn deleting_a_deck_removes_it_from_campaigns() {
        let (state, uuid) = with_campaign();
        let deck = Deck::new(DeckId::new_local(), "01001", DeckContent::default(), now());
        let mut state = reduce(
            &state,
            &StoreAction::UpsertDeck {
                deck: deck.clone(),
                is_write: true,
                now: now(),
            },
        );
        state = reduce(
            &state,
            &StoreAction::AddInvestigator {
                campaign: uuid,
                investigator: "01001".into(),
                deck: Some(deck.id),
                now: now(),
            },
        );
        state = reduce(
            &state,
            &StoreAction::DeleteDeck {
                deck: deck.id,
                delete_all_versions: false,
                now: now(),
            },
        );
        assert!(state.campaigns[&uuid].deck_ids.is_empty());
        assert!(state.require_deck(&deck.id).is_err());
    }

    #[test]
    fn clear_remote_strips_legacy_decks_from_campaigns() {
        let (mut state, uuid) = with_campaign();
        let local = DeckId::new_local();
        let legacy = DeckId::legacy(3, None);
        for deck in [local, legacy] {
            state.apply(&StoreAction::AddInvestigator {
                campaign: uuid,
                investigator: "01001".into(),
                deck: Some(deck),
                now: now(),
            });
        }
        state.apply(&StoreAction::ClearRemoteDecks { now: now() });
        assert_eq!(state.campaigns[&uuid].deck_ids, vec![local]);
    }

    #[test]
    fn sync_progress_is_transient() {
        let (state, uuid) = with_campaign();
        let action = StoreAction::SyncDeck {
            campaign: uuid,
            investigator: "01001".into(),
            uploading: true,
            now: now(),
        };
        assert!(!action.is_persistent());
        let state = reduce(&state, &action);
        assert!(state.sync.is_uploading(&uuid, "01001"));
        assert!(!state.persistable().sync.is_uploading(&uuid, "01001"));
    }

    #[test]
    fn local_undo_without_target_appends_nothing() {
        let (state, uuid) = with_campaign();
        let state = reduce(
            &state,
            &StoreAction::GuideUndo {
                campaign: uuid,
                scenario: "the_gathering".into(),
                now: now(),
            },
        );
        assert!(state.guides[&uuid].is_empty());
    }

    #[test]
    fn actions_round_trip_through_json() {
        let action = StoreAction::GuideUpdateAchievement {
            campaign: Uuid::new_v4(),
            id: "seals".into(),
            op: AchievementOp::Inc { max: Some(3) },
            now: now(),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"guide_update_achievement\""));
        let back: StoreAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }
}
