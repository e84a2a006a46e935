//! Derives campaign state by folding the effective guide inputs.
//!
//! Every collection in [`CampaignState`] is ordered, so replaying one log
//! twice yields byte-identical serialized state.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::achievement::Achievements;
use super::input::{GuideAnswer, GuideInput, InvestigatorTraumaData};
use super::log::GuideLog;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Active,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioState {
    pub status: ScenarioStatus,
    pub side: bool,
    pub answers: BTreeMap<String, GuideAnswer>,
}

impl ScenarioState {
    fn started(side: bool) -> Self {
        Self {
            status: ScenarioStatus::Active,
            side,
            answers: BTreeMap::new(),
        }
    }
}

/// Where the campaign as a whole stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "scenario", rename_all = "snake_case")]
pub enum CampaignPhase {
    Idle,
    ScenarioActive(String),
    ScenarioCompleted(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignLog {
    pub sections: BTreeMap<String, Vec<String>>,
    pub counts: BTreeMap<String, i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigatorState {
    pub physical_trauma: u32,
    pub mental_trauma: u32,
    pub killed: bool,
    pub insane: bool,
    pub earned_xp: u32,
    pub spent_xp: u32,
    pub supplies: BTreeMap<String, u32>,
}

impl InvestigatorState {
    fn apply(&mut self, data: &InvestigatorTraumaData) {
        self.physical_trauma = self.physical_trauma.saturating_add(data.physical);
        self.mental_trauma = self.mental_trauma.saturating_add(data.mental);
        self.earned_xp = self.earned_xp.saturating_add(data.earned_xp);
        self.spent_xp = self.spent_xp.saturating_add(data.spent_xp);
        self.killed |= data.killed;
        self.insane |= data.insane;
    }

    pub fn available_xp(&self) -> u32 {
        self.earned_xp.saturating_sub(self.spent_xp)
    }

    pub fn is_eliminated(&self) -> bool {
        self.killed || self.insane
    }
}

/// Token id to count. Counts never drop below zero; empty tokens are removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChaosBag(pub BTreeMap<String, u32>);

impl ChaosBag {
    pub fn apply_delta(&mut self, token: &str, delta: i32) {
        let current = self.0.get(token).copied().unwrap_or(0);
        let next = if delta >= 0 {
            current.saturating_add(delta.unsigned_abs())
        } else {
            current.saturating_sub(delta.unsigned_abs())
        };
        if next == 0 {
            self.0.remove(token);
        } else {
            self.0.insert(token.to_string(), next);
        }
    }

    pub fn count(&self, token: &str) -> u32 {
        self.0.get(token).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }
}

/// A step in this campaign that points at a decision in a linked campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedReference {
    pub scenario: Option<String>,
    pub step: String,
    pub decision: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignState {
    pub scenarios: BTreeMap<String, ScenarioState>,
    /// Scenarios in the order they were first started.
    pub scenario_order: Vec<String>,
    pub campaign_answers: BTreeMap<String, GuideAnswer>,
    pub campaign_log: CampaignLog,
    pub investigators: BTreeMap<String, InvestigatorState>,
    pub chaos_bag: ChaosBag,
    pub linked_references: Vec<LinkedReference>,
    pub achievements: Achievements,
}

impl CampaignState {
    /// Starts from a campaign whose chaos bag was chosen at creation.
    pub fn with_chaos_bag(chaos_bag: ChaosBag) -> Self {
        Self {
            chaos_bag,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> CampaignPhase {
        if let Some(active) = self.active_scenario() {
            return CampaignPhase::ScenarioActive(active.to_string());
        }
        match self.scenario_order.last() {
            Some(last) => CampaignPhase::ScenarioCompleted(last.clone()),
            None => CampaignPhase::Idle,
        }
    }

    pub fn active_scenario(&self) -> Option<&str> {
        self.scenarios
            .iter()
            .find(|(_, scenario)| scenario.status == ScenarioStatus::Active)
            .map(|(id, _)| id.as_str())
    }

    pub fn answer(&self, scenario: Option<&str>, step: &str) -> Option<&GuideAnswer> {
        match scenario {
            Some(scenario) => self.scenarios.get(scenario)?.answers.get(step),
            None => self.campaign_answers.get(step),
        }
    }

    fn start(&mut self, scenario: &str, side: bool) {
        for state in self.scenarios.values_mut() {
            if state.status == ScenarioStatus::Active {
                state.status = ScenarioStatus::Completed;
            }
        }
        self.scenarios
            .insert(scenario.to_string(), ScenarioState::started(side));
        self.scenario_order.retain(|id| id != scenario);
        self.scenario_order.push(scenario.to_string());
    }

    fn record(&mut self, scenario: Option<&str>, step: &str, answer: GuideAnswer) {
        let answers = match scenario {
            Some(scenario) => {
                &mut self
                    .scenarios
                    .entry(scenario.to_string())
                    .or_insert_with(|| ScenarioState::started(false))
                    .answers
            }
            None => &mut self.campaign_answers,
        };
        answers.insert(step.to_string(), answer);
    }

    /// Folds one input into the state.
    pub fn apply(&mut self, input: &GuideInput) {
        match input {
            GuideInput::StartScenario { scenario } => self.start(scenario, false),
            GuideInput::StartSideScenario { scenario, .. } => self.start(scenario, true),
            GuideInput::InterScenario {
                scenario,
                investigator_data,
                chaos_bag,
            } => {
                if let Some(state) = scenario.as_ref().and_then(|s| self.scenarios.get_mut(s)) {
                    state.status = ScenarioStatus::Completed;
                }
                for (code, data) in investigator_data {
                    self.investigators.entry(code.clone()).or_default().apply(data);
                }
                for (token, delta) in chaos_bag {
                    self.chaos_bag.apply_delta(token, *delta);
                }
            }
            other => {
                let (Some(step), Some(answer)) = (other.step(), other.answer()) else {
                    return;
                };
                let scenario = other.scenario();
                match other {
                    GuideInput::Count { count, .. } => {
                        self.campaign_log.counts.insert(step.to_string(), *count);
                    }
                    GuideInput::StringChoices { choices, .. } => {
                        let entries = choices.values().flatten().cloned().collect();
                        self.campaign_log.sections.insert(step.to_string(), entries);
                    }
                    GuideInput::Text { text, .. } => {
                        self.campaign_log
                            .sections
                            .insert(step.to_string(), vec![text.clone()]);
                    }
                    GuideInput::Supplies { supplies, .. } => {
                        for (code, counts) in supplies {
                            self.investigators.entry(code.clone()).or_default().supplies =
                                counts.clone();
                        }
                    }
                    GuideInput::CampaignLink { decision, .. } => {
                        self.linked_references.push(LinkedReference {
                            scenario: scenario.map(str::to_string),
                            step: step.to_string(),
                            decision: decision.clone(),
                        });
                    }
                    _ => {}
                }
                self.record(scenario, step, answer);
            }
        }
    }
}

/// Replays `log` from an empty campaign.
pub fn replay(log: &GuideLog) -> CampaignState {
    replay_from(CampaignState::default(), log)
}

/// Replays `log` on top of `initial`.
pub fn replay_from(initial: CampaignState, log: &GuideLog) -> CampaignState {
    let mut state = initial;
    for entry in log.effective_inputs() {
        if let Some(input) = entry.input() {
            state.apply(input);
        }
    }
    state.achievements = log.achievements();
    state
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::guide::AchievementOp;

    fn start(scenario: &str) -> GuideInput {
        GuideInput::StartScenario {
            scenario: scenario.into(),
        }
    }

    fn sample_log() -> GuideLog {
        let now = Utc::now();
        let mut log = GuideLog::new();
        log.append_input(start("the_gathering"), now);
        log.append_input(
            GuideInput::Count {
                scenario: Some("the_gathering".into()),
                step: "cultists_got_away".into(),
                count: 2,
            },
            now,
        );
        let mut investigator_data = BTreeMap::new();
        investigator_data.insert(
            "01001".to_string(),
            InvestigatorTraumaData {
                physical: 1,
                earned_xp: 4,
                spent_xp: 1,
                ..InvestigatorTraumaData::default()
            },
        );
        let mut chaos_bag = BTreeMap::new();
        chaos_bag.insert("cultist".to_string(), 1);
        chaos_bag.insert("elder_sign".to_string(), -3);
        log.append_input(
            GuideInput::InterScenario {
                scenario: Some("the_gathering".into()),
                investigator_data,
                chaos_bag,
            },
            now,
        );
        log.append_achievement("survivor", AchievementOp::Inc { max: Some(2) }, now);
        log
    }

    #[test]
    fn replay_derives_trauma_log_and_bag() {
        let initial = CampaignState::with_chaos_bag(ChaosBag(
            [("elder_sign".to_string(), 1), ("cultist".to_string(), 1)].into(),
        ));
        let state = replay_from(initial, &sample_log());

        let roland = &state.investigators["01001"];
        assert_eq!(roland.physical_trauma, 1);
        assert_eq!(roland.available_xp(), 3);
        assert_eq!(state.campaign_log.counts["cultists_got_away"], 2);
        assert_eq!(state.chaos_bag.count("cultist"), 2);
        assert_eq!(state.chaos_bag.count("elder_sign"), 0);
        assert_eq!(state.achievements.count("survivor"), 1);
        assert_eq!(
            state.phase(),
            CampaignPhase::ScenarioCompleted("the_gathering".into())
        );
    }

    #[test]
    fn starting_a_scenario_completes_the_active_one() {
        let now = Utc::now();
        let mut log = GuideLog::new();
        log.append_input(start("a"), now);
        log.append_input(start("b"), now);

        let state = replay(&log);
        assert_eq!(state.scenarios["a"].status, ScenarioStatus::Completed);
        assert_eq!(state.phase(), CampaignPhase::ScenarioActive("b".into()));
    }

    #[test]
    fn empty_log_is_idle() {
        assert_eq!(replay(&GuideLog::new()).phase(), CampaignPhase::Idle);
    }

    #[test]
    fn replay_is_byte_identical() {
        let log = sample_log();
        let first = serde_json::to_vec(&replay(&log)).unwrap();
        let second = serde_json::to_vec(&replay(&log)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn answers_are_last_write_wins_and_links_are_collected() {
        let now = Utc::now();
        let mut log = GuideLog::new();
        for decision in [true, false] {
            log.append_input(
                GuideInput::Decision {
                    scenario: None,
                    step: "prologue".into(),
                    decision,
                },
                now,
            );
        }
        log.append_input(
            GuideInput::CampaignLink {
                scenario: Some("x".into()),
                step: "link".into(),
                decision: "campaign_b".into(),
            },
            now,
        );

        let state = replay(&log);
        assert_eq!(
            state.answer(None, "prologue"),
            Some(&GuideAnswer::Decision(false))
        );
        assert_eq!(state.linked_references.len(), 1);
        assert_eq!(state.linked_references[0].decision, "campaign_b");
    }

    #[test]
    fn undone_inputs_do_not_reach_state() {
        let now = Utc::now();
        let mut log = sample_log();
        log.append_undo("the_gathering", now);
        let state = replay(&log);
        // the inter-scenario input was the tail
        assert!(state.investigators.is_empty());
        assert_eq!(
            state.phase(),
            CampaignPhase::ScenarioActive("the_gathering".into())
        );
    }
}
