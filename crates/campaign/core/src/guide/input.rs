//! Typed guide inputs.
//!
//! Serialized with an internal `type` tag so a log written by one build reads
//! back in another regardless of field order.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-investigator outcome recorded between scenarios.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigatorTraumaData {
    #[serde(default)]
    pub physical: u32,
    #[serde(default)]
    pub mental: u32,
    #[serde(default)]
    pub killed: bool,
    #[serde(default)]
    pub insane: bool,
    #[serde(default)]
    pub earned_xp: u32,
    #[serde(default)]
    pub spent_xp: u32,
}

/// One player answer in the campaign guide.
///
/// `scenario` is absent for campaign-level prompts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuideInput {
    StartScenario {
        scenario: String,
    },
    StartSideScenario {
        scenario: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_scenario: Option<String>,
    },
    Decision {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
        step: String,
        decision: bool,
    },
    Count {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
        step: String,
        count: i64,
    },
    Choice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
        step: String,
        choice: i64,
    },
    ChoiceList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
        step: String,
        choices: BTreeMap<String, Vec<i64>>,
    },
    StringChoices {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
        step: String,
        choices: BTreeMap<String, Vec<String>>,
    },
    Supplies {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
        step: String,
        /// investigator code -> supply id -> count
        supplies: BTreeMap<String, BTreeMap<String, u32>>,
    },
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
        step: String,
        text: String,
    },
    CampaignLink {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
        step: String,
        decision: String,
    },
    InterScenario {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
        investigator_data: BTreeMap<String, InvestigatorTraumaData>,
        /// Token id -> change in count.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        chaos_bag: BTreeMap<String, i32>,
    },
}

/// Recorded value of an answered step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum GuideAnswer {
    Decision(bool),
    Count(i64),
    Choice(i64),
    ChoiceList(BTreeMap<String, Vec<i64>>),
    StringChoices(BTreeMap<String, Vec<String>>),
    Supplies(BTreeMap<String, BTreeMap<String, u32>>),
    Text(String),
    CampaignLink(String),
}

impl GuideInput {
    /// Scenario the input belongs to, if any.
    pub fn scenario(&self) -> Option<&str> {
        match self {
            Self::StartScenario { scenario } | Self::StartSideScenario { scenario, .. } => {
                Some(scenario)
            }
            Self::Decision { scenario, .. }
            | Self::Count { scenario, .. }
            | Self::Choice { scenario, .. }
            | Self::ChoiceList { scenario, .. }
            | Self::StringChoices { scenario, .. }
            | Self::Supplies { scenario, .. }
            | Self::Text { scenario, .. }
            | Self::CampaignLink { scenario, .. }
            | Self::InterScenario { scenario, .. } => scenario.as_deref(),
        }
    }

    pub fn step(&self) -> Option<&str> {
        match self {
            Self::StartScenario { .. }
            | Self::StartSideScenario { .. }
            | Self::InterScenario { .. } => None,
            Self::Decision { step, .. }
            | Self::Count { step, .. }
            | Self::Choice { step, .. }
            | Self::ChoiceList { step, .. }
            | Self::StringChoices { step, .. }
            | Self::Supplies { step, .. }
            | Self::Text { step, .. }
            | Self::CampaignLink { step, .. } => Some(step),
        }
    }

    /// The serialized `type` tag.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StartScenario { .. } => "start_scenario",
            Self::StartSideScenario { .. } => "start_side_scenario",
            Self::Decision { .. } => "decision",
            Self::Count { .. } => "count",
            Self::Choice { .. } => "choice",
            Self::ChoiceList { .. } => "choice_list",
            Self::StringChoices { .. } => "string_choices",
            Self::Supplies { .. } => "supplies",
            Self::Text { .. } => "text",
            Self::CampaignLink { .. } => "campaign_link",
            Self::InterScenario { .. } => "inter_scenario",
        }
    }

    /// The value recorded for `(scenario, step)`, for inputs that answer a step.
    pub fn answer(&self) -> Option<GuideAnswer> {
        Some(match self {
            Self::Decision { decision, .. } => GuideAnswer::Decision(*decision),
            Self::Count { count, .. } => GuideAnswer::Count(*count),
            Self::Choice { choice, .. } => GuideAnswer::Choice(*choice),
            Self::ChoiceList { choices, .. } => GuideAnswer::ChoiceList(choices.clone()),
            Self::StringChoices { choices, .. } => GuideAnswer::StringChoices(choices.clone()),
            Self::Supplies { supplies, .. } => GuideAnswer::Supplies(supplies.clone()),
            Self::Text { text, .. } => GuideAnswer::Text(text.clone()),
            Self::CampaignLink { decision, .. } => GuideAnswer::CampaignLink(decision.clone()),
            Self::StartScenario { .. }
            | Self::StartSideScenario { .. }
            | Self::InterScenario { .. } => return None,
        })
    }
}
