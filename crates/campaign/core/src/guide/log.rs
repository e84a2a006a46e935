//! Append-only guide log.
//!
//! Entries are never edited. Undo and reset are themselves entries, consumed
//! when the effective input list is materialized.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::achievement::{AchievementOp, Achievements};
use super::input::GuideInput;
use crate::identity::ServerRef;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuideEntryBody {
    Input { input: GuideInput },
    Undo { scenario: String },
    Reset { scenario: String },
    Achievement { id: String, op: AchievementOp },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideEntry {
    /// Position in the log, strictly increasing.
    pub seq: u64,
    /// Server row backing this entry, for server-authoritative logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<ServerRef>,
    pub timestamp: DateTime<Utc>,
    pub body: GuideEntryBody,
}

impl GuideEntry {
    pub fn input(&self) -> Option<&GuideInput> {
        match &self.body {
            GuideEntryBody::Input { input } => Some(input),
            _ => None,
        }
    }

    pub fn scenario(&self) -> Option<&str> {
        match &self.body {
            GuideEntryBody::Input { input } => input.scenario(),
            GuideEntryBody::Undo { scenario } | GuideEntryBody::Reset { scenario } => {
                Some(scenario)
            }
            GuideEntryBody::Achievement { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideLog {
    entries: Vec<GuideEntry>,
    /// Next sequence number. Never lowered, so removed seqs are not reused.
    #[serde(default)]
    next_seq: u64,
}

impl GuideLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a log from stored entries, ordering them by `seq`.
    pub fn from_entries(mut entries: Vec<GuideEntry>) -> Self {
        entries.sort_by_key(|entry| entry.seq);
        let next_seq = entries.last().map_or(0, |entry| entry.seq + 1);
        Self { entries, next_seq }
    }

    pub fn entries(&self) -> &[GuideEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_seq(&self) -> u64 {
        self.entries
            .last()
            .map_or(0, |entry| entry.seq + 1)
            .max(self.next_seq)
    }

    /// Appends `body` and returns the new entry's sequence number.
    pub fn append(&mut self, body: GuideEntryBody, now: DateTime<Utc>) -> u64 {
        self.append_with_remote(body, None, now)
    }

    pub fn append_with_remote(
        &mut self,
        body: GuideEntryBody,
        remote: Option<ServerRef>,
        now: DateTime<Utc>,
    ) -> u64 {
        let seq = self.next_seq();
        self.next_seq = seq + 1;
        self.entries.push(GuideEntry {
            seq,
            remote,
            timestamp: now,
            body,
        });
        seq
    }

    pub fn append_input(&mut self, input: GuideInput, now: DateTime<Utc>) -> u64 {
        self.append(GuideEntryBody::Input { input }, now)
    }

    pub fn append_undo(&mut self, scenario: impl Into<String>, now: DateTime<Utc>) -> u64 {
        self.append(
            GuideEntryBody::Undo {
                scenario: scenario.into(),
            },
            now,
        )
    }

    pub fn append_reset(&mut self, scenario: impl Into<String>, now: DateTime<Utc>) -> u64 {
        self.append(
            GuideEntryBody::Reset {
                scenario: scenario.into(),
            },
            now,
        )
    }

    pub fn append_achievement(
        &mut self,
        id: impl Into<String>,
        op: AchievementOp,
        now: DateTime<Utc>,
    ) -> u64 {
        self.append(GuideEntryBody::Achievement { id: id.into(), op }, now)
    }

    /// Input entries that survive every undo and reset marker, in log order.
    pub fn effective_inputs(&self) -> Vec<&GuideEntry> {
        let mut effective: Vec<&GuideEntry> = Vec::new();
        for entry in &self.entries {
            match &entry.body {
                GuideEntryBody::Input { .. } => effective.push(entry),
                GuideEntryBody::Undo { scenario } => {
                    if let Some(at) = last_input_of(&effective, scenario) {
                        effective.truncate(at);
                    }
                }
                GuideEntryBody::Reset { scenario } => {
                    effective.retain(|e| e.scenario() != Some(scenario.as_str()));
                }
                GuideEntryBody::Achievement { .. } => {}
            }
        }
        effective
    }

    /// Entries an undo of `scenario` would remove: its most recent input and
    /// everything after it. Empty when nothing is undoable.
    pub fn undo_targets(&self, scenario: &str) -> Vec<&GuideEntry> {
        let effective = self.effective_inputs();
        match last_input_of(&effective, scenario) {
            Some(at) => effective[at..].to_vec(),
            None => Vec::new(),
        }
    }

    /// Effective inputs belonging to `scenario`.
    pub fn scenario_inputs(&self, scenario: &str) -> Vec<&GuideEntry> {
        self.effective_inputs()
            .into_iter()
            .filter(|entry| entry.scenario() == Some(scenario))
            .collect()
    }

    /// Folds every achievement entry in log order. Undo markers do not affect them.
    pub fn achievements(&self) -> Achievements {
        let mut achievements = Achievements::new();
        for entry in &self.entries {
            if let GuideEntryBody::Achievement { id, op } = &entry.body {
                achievements.apply(id, *op);
            }
        }
        achievements
    }

    /// Physically drops the entries backed by `remote` rows.
    ///
    /// Only server-authoritative mirrors use this, since the server deletes
    /// rows on `remove_inputs`.
    pub fn remove_remote(&mut self, remote: &[ServerRef]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.remote.is_none_or(|r| !remote.contains(&r)));
        before - self.entries.len()
    }

    /// Puts previously removed entries back at their original positions.
    pub fn restore(&mut self, removed: impl IntoIterator<Item = GuideEntry>) {
        let next_seq = self.next_seq();
        self.entries.extend(removed);
        self.entries.sort_by_key(|entry| entry.seq);
        self.next_seq = next_seq.max(self.next_seq());
    }

    /// Replaces a pending server ref with its acknowledged value.
    pub fn resolve_remote(&mut self, pending: ServerRef, assigned: ServerRef) {
        for entry in &mut self.entries {
            if entry.remote == Some(pending) {
                entry.remote = Some(assigned);
            }
        }
    }
}

fn last_input_of(effective: &[&GuideEntry], scenario: &str) -> Option<usize> {
    effective
        .iter()
        .rposition(|entry| entry.scenario() == Some(scenario))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(scenario: &str, step: &str) -> GuideInput {
        GuideInput::Decision {
            scenario: Some(scenario.into()),
            step: step.into(),
            decision: true,
        }
    }

    fn steps(log: &GuideLog) -> Vec<String> {
        log.effective_inputs()
            .iter()
            .filter_map(|entry| entry.input()?.step().map(str::to_string))
            .collect()
    }

    #[test]
    fn undo_removes_the_scenario_tail() {
        let now = Utc::now();
        let mut log = GuideLog::new();
        log.append_input(decision("s1", "A"), now);
        log.append_input(decision("s1", "B"), now);
        log.append_input(decision("s2", "C"), now);

        log.append_undo("s1", now);
        assert_eq!(steps(&log), vec!["A"]);

        log.append_undo("s1", now);
        assert!(steps(&log).is_empty());
    }

    #[test]
    fn undo_without_matching_input_is_noop() {
        let now = Utc::now();
        let mut log = GuideLog::new();
        log.append_input(decision("s1", "A"), now);

        assert!(log.undo_targets("s2").is_empty());
        log.append_undo("s2", now);
        assert_eq!(steps(&log), vec!["A"]);
    }

    #[test]
    fn reset_voids_earlier_inputs_of_that_scenario_only() {
        let now = Utc::now();
        let mut log = GuideLog::new();
        log.append_input(decision("s1", "A"), now);
        log.append_input(decision("s2", "B"), now);
        log.append_reset("s1", now);
        log.append_input(decision("s1", "C"), now);

        assert_eq!(steps(&log), vec!["B", "C"]);
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn undo_leaves_achievements_alone() {
        let now = Utc::now();
        let mut log = GuideLog::new();
        log.append_input(decision("s1", "A"), now);
        log.append_achievement("brave", AchievementOp::Set, now);
        log.append_undo("s1", now);

        assert!(steps(&log).is_empty());
        assert!(log.achievements().is_set("brave"));
    }

    #[test]
    fn undo_targets_include_later_inputs() {
        let now = Utc::now();
        let mut log = GuideLog::new();
        log.append_input(decision("s1", "A"), now);
        log.append_input(decision("s1", "B"), now);
        log.append_input(decision("s2", "C"), now);

        let targets: Vec<u64> = log.undo_targets("s1").iter().map(|e| e.seq).collect();
        assert_eq!(targets, vec![1, 2]);
    }

    #[test]
    fn remote_rows_are_removed_by_identity() {
        let now = Utc::now();
        let pending = ServerRef::pending();
        let mut log = GuideLog::new();
        log.append_with_remote(
            GuideEntryBody::Input {
                input: decision("s1", "A"),
            },
            Some(pending),
            now,
        );
        let assigned = ServerRef::Assigned(crate::identity::ServerId(4));
        log.resolve_remote(pending, assigned);
        assert_eq!(log.remove_remote(&[assigned]), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn removed_seqs_are_not_reused() {
        let now = Utc::now();
        let removed_ref = ServerRef::Assigned(crate::identity::ServerId(1));
        let mut log = GuideLog::new();
        log.append_input(decision("s1", "A"), now);
        log.append_with_remote(
            GuideEntryBody::Input {
                input: decision("s1", "B"),
            },
            Some(removed_ref),
            now,
        );
        let removed: Vec<GuideEntry> = log.entries()[1..].to_vec();
        log.remove_remote(&[removed_ref]);

        assert_eq!(log.append_input(decision("s1", "C"), now), 2);
        log.restore(removed);
        let seqs: Vec<u64> = log.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(steps(&log), vec!["A", "B", "C"]);
        assert_eq!(log.append_undo("s1", now), 3);
    }
}
