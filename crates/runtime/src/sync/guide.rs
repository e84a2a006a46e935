//! Guide-log writers.
//!
//! A campaign's guide log lives either in the device store or on the server.
//! [`select_writer`] makes that choice once per operation, using the same
//! authority rule as the campaign-level resolver, and every guide mutation
//! goes through the returned [`GuideLogWriter`].
use chrono::{DateTime, Utc};
use uuid::Uuid;

use campaign_core::{
    AchievementOp, AchievementValue, Campaign, DataSource, GuideEntry, GuideEntryBody, GuideInput,
    GuideLog, ServerRef, Session, StoreAction, UploadedCampaignId, is_server_authoritative,
};

use super::{RemoteCache, RemoteCall, RemoteRequest};
use crate::api::{AchievementRequest, Result, RuntimeError, SetInputRequest};
use crate::repository::LocalStore;

/// Outcome of one guide mutation.
#[derive(Debug)]
pub struct GuideWrite {
    /// Remote call still to be sent; `None` once the write is complete.
    pub call: Option<RemoteCall>,
    /// Inputs added or removed by the write.
    pub affected: usize,
}

impl GuideWrite {
    fn local(affected: usize) -> Self {
        Self {
            call: None,
            affected,
        }
    }

    fn noop() -> Self {
        Self::local(0)
    }
}

/// Appends to a campaign's guide log of record.
pub trait GuideLogWriter: Send + Sync {
    fn source(&self) -> DataSource;

    fn set_input(&self, input: GuideInput, now: DateTime<Utc>) -> Result<GuideWrite>;

    /// Drops the newest input of `scenario` and everything after it.
    /// Does nothing when the scenario has no effective input.
    fn undo(&self, scenario: &str, now: DateTime<Utc>) -> Result<GuideWrite>;

    fn reset_scenario(&self, scenario: &str, now: DateTime<Utc>) -> Result<GuideWrite>;

    fn set_binary_achievement(&self, id: &str, value: bool, now: DateTime<Utc>)
    -> Result<GuideWrite>;

    fn inc_achievement(&self, id: &str, max: Option<u32>, now: DateTime<Utc>) -> Result<GuideWrite>;

    fn dec_achievement(&self, id: &str, now: DateTime<Utc>) -> Result<GuideWrite>;
}

/// Picks the writer for `campaign` under `session`.
pub fn select_writer<'a>(
    campaign: &Campaign,
    session: &Session,
    store: &'a dyn LocalStore,
    cache: &'a RemoteCache,
) -> Box<dyn GuideLogWriter + 'a> {
    match campaign.id.uploaded() {
        Some(uploaded) if is_server_authoritative(&campaign.id, session) => {
            Box::new(RemoteGuideWriter::new(cache, uploaded))
        }
        _ => Box::new(LocalGuideWriter::new(store, campaign.uuid())),
    }
}

/// Writes to the device store's append-only log.
pub struct LocalGuideWriter<'a> {
    store: &'a dyn LocalStore,
    campaign: Uuid,
}

impl<'a> LocalGuideWriter<'a> {
    pub fn new(store: &'a dyn LocalStore, campaign: Uuid) -> Self {
        Self { store, campaign }
    }

    fn log(&self) -> Result<GuideLog> {
        Ok(self
            .store
            .snapshot()?
            .guide(&self.campaign)
            .cloned()
            .unwrap_or_default())
    }

    fn achievement(&self, id: &str, op: AchievementOp, now: DateTime<Utc>) -> Result<GuideWrite> {
        self.store.dispatch(&StoreAction::GuideUpdateAchievement {
            campaign: self.campaign,
            id: id.to_string(),
            op,
            now,
        })?;
        Ok(GuideWrite::local(0))
    }
}

impl GuideLogWriter for LocalGuideWriter<'_> {
    fn source(&self) -> DataSource {
        DataSource::Local
    }

    fn set_input(&self, input: GuideInput, now: DateTime<Utc>) -> Result<GuideWrite> {
        self.store.dispatch(&StoreAction::GuideSetInput {
            campaign: self.campaign,
            input,
            now,
        })?;
        Ok(GuideWrite::local(1))
    }

    fn undo(&self, scenario: &str, now: DateTime<Utc>) -> Result<GuideWrite> {
        let targets = self.log()?.undo_targets(scenario).len();
        if targets == 0 {
            return Ok(GuideWrite::noop());
        }
        self.store.dispatch(&StoreAction::GuideUndo {
            campaign: self.campaign,
            scenario: scenario.to_string(),
            now,
        })?;
        Ok(GuideWrite::local(targets))
    }

    fn reset_scenario(&self, scenario: &str, now: DateTime<Utc>) -> Result<GuideWrite> {
        let inputs = self.log()?.scenario_inputs(scenario).len();
        self.store.dispatch(&StoreAction::GuideResetScenario {
            campaign: self.campaign,
            scenario: scenario.to_string(),
            now,
        })?;
        Ok(GuideWrite::local(inputs))
    }

    fn set_binary_achievement(
        &self,
        id: &str,
        value: bool,
        now: DateTime<Utc>,
    ) -> Result<GuideWrite> {
        let op = if value {
            AchievementOp::Set
        } else {
            AchievementOp::Clear
        };
        self.achievement(id, op, now)
    }

    fn inc_achievement(&self, id: &str, max: Option<u32>, now: DateTime<Utc>) -> Result<GuideWrite> {
        self.achievement(id, AchievementOp::Inc { max }, now)
    }

    fn dec_achievement(&self, id: &str, now: DateTime<Utc>) -> Result<GuideWrite> {
        self.achievement(id, AchievementOp::Dec, now)
    }
}

/// Writes to the server's log through the optimistic remote cache.
///
/// The server deletes rows on undo, so undo and reset remove entries by
/// identity instead of appending markers.
pub struct RemoteGuideWriter<'a> {
    cache: &'a RemoteCache,
    campaign: UploadedCampaignId,
}

impl<'a> RemoteGuideWriter<'a> {
    pub fn new(cache: &'a RemoteCache, campaign: UploadedCampaignId) -> Self {
        Self { cache, campaign }
    }

    fn log(&self) -> Result<GuideLog> {
        Ok(self
            .cache
            .guide(self.campaign.server_id)?
            .unwrap_or_default())
    }

    fn remove(&self, refs: Vec<ServerRef>) -> Result<GuideWrite> {
        if refs.is_empty() {
            return Ok(GuideWrite::noop());
        }

        let optimistic = self.cache.remove_entries(self.campaign.server_id, &refs)?;
        let affected = refs.len();
        let call = RemoteCall::new(
            self.campaign.uuid,
            RemoteRequest::RemoveInputs {
                campaign: self.campaign,
                inputs: refs,
            },
            optimistic,
        );
        Ok(GuideWrite {
            call: Some(call),
            affected,
        })
    }

    fn achievement(
        &self,
        id: &str,
        op: AchievementOp,
        now: DateTime<Utc>,
    ) -> Result<GuideWrite> {
        let (_, optimistic) = self.cache.append_entry(
            self.campaign.server_id,
            GuideEntryBody::Achievement {
                id: id.to_string(),
                op,
            },
            now,
        )?;
        let value = self
            .log()?
            .achievements()
            .get(id)
            .unwrap_or(AchievementValue::Count(0));

        let max = match op {
            AchievementOp::Inc { max } => max,
            _ => None,
        };
        let request = AchievementRequest {
            campaign: self.campaign,
            id: id.to_string(),
            max,
            optimistic: value,
        };
        let request = match op {
            AchievementOp::Set | AchievementOp::Clear => RemoteRequest::SetBinaryAchievement(request),
            AchievementOp::Inc { .. } => RemoteRequest::IncAchievement(request),
            AchievementOp::Dec => RemoteRequest::DecAchievement(request),
        };

        Ok(GuideWrite {
            call: Some(RemoteCall::new(self.campaign.uuid, request, optimistic)),
            affected: 0,
        })
    }
}

impl GuideLogWriter for RemoteGuideWriter<'_> {
    fn source(&self) -> DataSource {
        DataSource::Remote
    }

    fn set_input(&self, input: GuideInput, now: DateTime<Utc>) -> Result<GuideWrite> {
        let (entry, optimistic) = self.cache.append_entry(
            self.campaign.server_id,
            GuideEntryBody::Input {
                input: input.clone(),
            },
            now,
        )?;
        let request = RemoteRequest::SetInput(SetInputRequest {
            campaign: self.campaign,
            input,
            optimistic: entry,
        });
        Ok(GuideWrite {
            call: Some(RemoteCall::new(self.campaign.uuid, request, optimistic)),
            affected: 1,
        })
    }

    fn undo(&self, scenario: &str, _now: DateTime<Utc>) -> Result<GuideWrite> {
        let log = self.log()?;
        self.remove(remote_refs(log.undo_targets(scenario))?)
    }

    fn reset_scenario(&self, scenario: &str, _now: DateTime<Utc>) -> Result<GuideWrite> {
        let log = self.log()?;
        self.remove(remote_refs(log.scenario_inputs(scenario))?)
    }

    fn set_binary_achievement(
        &self,
        id: &str,
        value: bool,
        now: DateTime<Utc>,
    ) -> Result<GuideWrite> {
        let op = if value {
            AchievementOp::Set
        } else {
            AchievementOp::Clear
        };
        self.achievement(id, op, now)
    }

    fn inc_achievement(&self, id: &str, max: Option<u32>, now: DateTime<Utc>) -> Result<GuideWrite> {
        self.achievement(id, AchievementOp::Inc { max }, now)
    }

    fn dec_achievement(&self, id: &str, now: DateTime<Utc>) -> Result<GuideWrite> {
        self.achievement(id, AchievementOp::Dec, now)
    }
}

/// Server rows behind `entries`. Fails when any entry never got one.
fn remote_refs(entries: Vec<&GuideEntry>) -> Result<Vec<ServerRef>> {
    entries
        .iter()
        .map(|entry| {
            entry
                .remote
                .ok_or(RuntimeError::UnsyncedGuideEntry { seq: entry.seq })
        })
        .collect()
}
