//! Campaign achievements: booleans and saturating counters.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AchievementOp {
    Set,
    Clear,
    Inc {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<u32>,
    },
    Dec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AchievementValue {
    Binary(bool),
    Count(u32),
}

impl AchievementValue {
    fn count(self) -> u32 {
        match self {
            Self::Binary(true) => 1,
            Self::Binary(false) => 0,
            Self::Count(n) => n,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Achievements(BTreeMap<String, AchievementValue>);

impl Achievements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one operation. `inc` saturates at `max` when given, `dec` at zero.
    pub fn apply(&mut self, id: &str, op: AchievementOp) {
        let current = self.0.get(id).copied();
        let next = match op {
            AchievementOp::Set => AchievementValue::Binary(true),
            AchievementOp::Clear => AchievementValue::Binary(false),
            AchievementOp::Inc { max } => {
                let value = current.map_or(0, AchievementValue::count).saturating_add(1);
                AchievementValue::Count(max.map_or(value, |max| value.min(max)))
            }
            AchievementOp::Dec => {
                AchievementValue::Count(current.map_or(0, AchievementValue::count).saturating_sub(1))
            }
        };
        self.0.insert(id.to_string(), next);
    }

    pub fn get(&self, id: &str) -> Option<AchievementValue> {
        self.0.get(id).copied()
    }

    pub fn is_set(&self, id: &str) -> bool {
        matches!(self.get(id), Some(AchievementValue::Binary(true)))
    }

    pub fn count(&self, id: &str) -> u32 {
        self.get(id).map_or(0, AchievementValue::count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, AchievementValue)> {
        self.0.iter().map(|(id, value)| (id.as_str(), *value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inc_saturates_at_max() {
        let mut achievements = Achievements::new();
        for _ in 0..5 {
            achievements.apply("seals", AchievementOp::Inc { max: Some(3) });
        }
        assert_eq!(achievements.count("seals"), 3);
    }

    #[test]
    fn dec_floors_at_zero() {
        let mut achievements = Achievements::new();
        for _ in 0..3 {
            achievements.apply("seals", AchievementOp::Inc { max: Some(3) });
        }
        for _ in 0..5 {
            achievements.apply("seals", AchievementOp::Dec);
        }
        assert_eq!(achievements.count("seals"), 0);
    }

    #[test]
    fn inc_without_max_is_unbounded() {
        let mut achievements = Achievements::new();
        for _ in 0..10 {
            achievements.apply("kills", AchievementOp::Inc { max: None });
        }
        assert_eq!(achievements.count("kills"), 10);
    }

    #[test]
    fn last_binary_operation_wins() {
        let mut achievements = Achievements::new();
        achievements.apply("brave", AchievementOp::Set);
        achievements.apply("brave", AchievementOp::Clear);
        assert!(!achievements.is_set("brave"));
        achievements.apply("brave", AchievementOp::Set);
        assert!(achievements.is_set("brave"));
    }
}
