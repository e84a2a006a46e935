//! Campaign guide: typed inputs, the append-only log and its replay.
mod achievement;
mod input;
mod log;
mod replay;

pub use achievement::{AchievementOp, AchievementValue, Achievements};
pub use input::{GuideAnswer, GuideInput, InvestigatorTraumaData};
pub use log::{GuideEntry, GuideEntryBody, GuideLog};
pub use replay::{
    CampaignLog, CampaignPhase, CampaignState, ChaosBag, InvestigatorState, LinkedReference,
    ScenarioState, ScenarioStatus, replay, replay_from,
};
