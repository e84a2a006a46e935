//! Campaign records held in the device store.
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::guide::ChaosBag;
use crate::identity::{CampaignId, DeckId, ServerId};

/// The two halves of a linked campaign, referenced from the parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignLink {
    pub campaign_a: Uuid,
    pub campaign_b: Uuid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigatorData {
    #[serde(default)]
    pub spent_xp: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub cycle_code: String,
    pub guided: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    /// Chaos bag chosen at creation. Guided campaigns derive the current bag by replay.
    #[serde(default)]
    pub chaos_bag: ChaosBag,
    #[serde(default)]
    pub deck_ids: Vec<DeckId>,
    #[serde(default)]
    pub non_deck_investigators: BTreeSet<String>,
    #[serde(default)]
    pub investigator_data: BTreeMap<String, InvestigatorData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<CampaignLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_campaign: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new_guided(
        uuid: Uuid,
        name: impl Into<String>,
        cycle_code: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CampaignId::local(uuid),
            name: name.into(),
            cycle_code: cycle_code.into(),
            guided: true,
            difficulty: None,
            chaos_bag: ChaosBag::default(),
            deck_ids: Vec::new(),
            non_deck_investigators: BTreeSet::new(),
            investigator_data: BTreeMap::new(),
            link: None,
            linked_campaign: None,
            updated_at: now,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.id.uuid
    }

    /// The linked halves, parent first, when this campaign is a link parent.
    pub fn linked_uuids(&self) -> Vec<Uuid> {
        match self.link {
            Some(link) => vec![link.campaign_a, link.campaign_b],
            None => Vec::new(),
        }
    }
}

/// Partial campaign update. Unset fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guided: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos_bag: Option<ChaosBag>,
    /// Set once the campaign is promoted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<ServerId>,
}

impl CampaignPatch {
    pub fn promote(server_id: ServerId) -> Self {
        Self {
            server_id: Some(server_id),
            ..Self::default()
        }
    }

    pub(crate) fn apply(&self, campaign: &mut Campaign) {
        if let Some(name) = &self.name {
            campaign.name = name.clone();
        }
        if let Some(difficulty) = &self.difficulty {
            campaign.difficulty = Some(difficulty.clone());
        }
        if let Some(guided) = self.guided {
            campaign.guided = guided;
        }
        if let Some(chaos_bag) = &self.chaos_bag {
            campaign.chaos_bag = chaos_bag.clone();
        }
        if let Some(server_id) = self.server_id {
            campaign.id = campaign.id.promoted(server_id);
        }
    }
}

/// Results of drawing from the chaos bag during play.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaosBagResults {
    #[serde(default)]
    pub drawn_tokens: Vec<String>,
    #[serde(default)]
    pub sealed_tokens: Vec<String>,
    #[serde(default)]
    pub total_drawn: u32,
    #[serde(default)]
    pub bless_tokens: u32,
    #[serde(default)]
    pub curse_tokens: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inc,
    Dec,
}

impl Direction {
    pub(crate) fn step(self, value: u32) -> u32 {
        match self {
            Self::Inc => value.saturating_add(1),
            Self::Dec => value.saturating_sub(1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlessCurse {
    Bless,
    Curse,
}
