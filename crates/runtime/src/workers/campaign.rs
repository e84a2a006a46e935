//! Campaign worker: the single actor that orders one campaign's mutations.
//!
//! Commands are handled one at a time. Each handler applies the optimistic
//! result, replies to the caller, and queues any remote call on the
//! campaign's [`Dispatcher`], so callers never wait for the network.
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use campaign_core::{
    DataSource, Deck, DeckId, DeckKey, GuideInput, LineageError, LocalState, Session, StoreAction,
    UploadedCampaignId, backward_chain, is_server_authoritative, validate_next_link,
};

use super::dispatcher::{Dispatcher, Job};
use crate::api::{MutationKind, PendingMutation, Result, RuntimeError};
use crate::events::{DeckEvent, GuideEvent};
use crate::sync::{
    DeckActions, GuideLogWriter, GuideWrite, RemoteCall, SyncOrchestrator, require_uploaded,
    select_writer,
};

/// How an achievement changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AchievementUpdate {
    SetBinary(bool),
    Inc { max: Option<u32> },
    Dec,
}

/// Commands that can be sent to a campaign worker
pub enum Command {
    SetInput {
        input: GuideInput,
        reply: oneshot::Sender<Result<PendingMutation>>,
    },
    Undo {
        scenario: String,
        reply: oneshot::Sender<Result<PendingMutation>>,
    },
    ResetScenario {
        scenario: String,
        reply: oneshot::Sender<Result<PendingMutation>>,
    },
    Achievement {
        id: String,
        update: AchievementUpdate,
        reply: oneshot::Sender<Result<PendingMutation>>,
    },
    UpdateDeck {
        deck: Deck,
        reply: oneshot::Sender<Result<PendingMutation>>,
    },
    DeleteDeck {
        deck: DeckId,
        all_versions: bool,
        reply: oneshot::Sender<Result<PendingMutation>>,
    },
    /// Uploads the chain containing `deck`, resuming after a partial upload.
    UploadChain {
        deck: DeckId,
        reply: oneshot::Sender<Result<PendingMutation>>,
    },
    /// Uploads the chain of every investigator deck in the campaign.
    UploadAllChains {
        reply: oneshot::Sender<Result<Vec<PendingMutation>>>,
    },
    Promote {
        reply: oneshot::Sender<Result<Vec<UploadedCampaignId>>>,
    },
    /// A call whose optimistic write was applied outside this worker.
    Remote {
        call: RemoteCall,
        reply: oneshot::Sender<Result<PendingMutation>>,
    },
}

/// Remote work behind one deck save.
enum DeckMirror {
    /// A single call, or none when nothing changed.
    Call(Option<RemoteCall>),
    /// Missing predecessors go up first through a chain upload.
    Chain,
}

pub struct CampaignWorker {
    campaign: Uuid,
    orchestrator: SyncOrchestrator,
    command_rx: mpsc::Receiver<Command>,
    dispatch_tx: mpsc::Sender<Job>,
    dispatcher: JoinHandle<()>,
}

impl CampaignWorker {
    /// Creates the worker and spawns its dispatcher.
    pub fn new(
        campaign: Uuid,
        orchestrator: SyncOrchestrator,
        command_rx: mpsc::Receiver<Command>,
        dispatch_buffer_size: usize,
    ) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(dispatch_buffer_size.max(1));
        let dispatcher =
            tokio::spawn(Dispatcher::new(campaign, orchestrator.clone(), dispatch_rx).run());

        Self {
            campaign,
            orchestrator,
            command_rx,
            dispatch_tx,
            dispatcher,
        }
    }

    /// Main worker loop. Drains the dispatcher before returning.
    pub async fn run(mut self) {
        info!("Campaign worker {} started", self.campaign);
        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    self.handle_command(cmd).await;
                }
                else => break,
            }
        }

        drop(self.dispatch_tx);
        if let Err(err) = self.dispatcher.await {
            warn!("Dispatcher for campaign {} panicked: {}", self.campaign, err);
        }
        info!("Campaign worker {} stopped", self.campaign);
    }

    async fn handle_command(&self, cmd: Command) {
        match cmd {
            Command::SetInput { input, reply } => {
                let result = self.set_input(input).await;
                if reply.send(result).is_err() {
                    debug!("SetInput reply channel closed (caller dropped)");
                }
            }
            Command::Undo { scenario, reply } => {
                let result = self.undo(scenario).await;
                if reply.send(result).is_err() {
                    debug!("Undo reply channel closed (caller dropped)");
                }
            }
            Command::ResetScenario { scenario, reply } => {
                let result = self.reset_scenario(scenario).await;
                if reply.send(result).is_err() {
                    debug!("ResetScenario reply channel closed (caller dropped)");
                }
            }
            Command::Achievement { id, update, reply } => {
                let result = self.achievement(id, update).await;
                if reply.send(result).is_err() {
                    debug!("Achievement reply channel closed (caller dropped)");
                }
            }
            Command::UpdateDeck { deck, reply } => {
                let result = self.update_deck(deck).await;
                if reply.send(result).is_err() {
                    debug!("UpdateDeck reply channel closed (caller dropped)");
                }
            }
            Command::DeleteDeck {
                deck,
                all_versions,
                reply,
            } => {
                let result = self.delete_deck(deck, all_versions).await;
                if reply.send(result).is_err() {
                    debug!("DeleteDeck reply channel closed (caller dropped)");
                }
            }
            Command::UploadChain { deck, reply } => {
                let result = self.upload_chain(deck).await;
                if reply.send(result).is_err() {
                    debug!("UploadChain reply channel closed (caller dropped)");
                }
            }
            Command::UploadAllChains { reply } => {
                let result = self.upload_all_chains().await;
                if reply.send(result).is_err() {
                    debug!("UploadAllChains reply channel closed (caller dropped)");
                }
            }
            Command::Promote { reply } => {
                let result = self.orchestrator.promote(self.campaign, Utc::now()).await;
                if reply.send(result).is_err() {
                    debug!("Promote reply channel closed (caller dropped)");
                }
            }
            Command::Remote { call, reply } => {
                let result = self.submit(call).await;
                if reply.send(result).is_err() {
                    debug!("Remote reply channel closed (caller dropped)");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    async fn submit(&self, call: RemoteCall) -> Result<PendingMutation> {
        let kind = call.kind();
        let (ack, ack_rx) = oneshot::channel();
        self.enqueue(Job::Single { call, ack }).await?;
        Ok(PendingMutation::in_flight(kind, ack_rx))
    }

    async fn enqueue(&self, job: Job) -> Result<()> {
        if let Err(mpsc::error::SendError(job)) = self.dispatch_tx.send(job).await {
            job.discard(&self.orchestrator);
            return Err(RuntimeError::CommandChannelClosed);
        }
        Ok(())
    }

    async fn finish(&self, write: GuideWrite, source: DataSource) -> Result<PendingMutation> {
        match write.call {
            Some(call) => self.submit(call).await,
            None => Ok(PendingMutation::settled(source)),
        }
    }

    fn snapshot(&self) -> Result<(LocalState, Session)> {
        let state = self.orchestrator.store().snapshot()?;
        state.require_campaign(&self.campaign)?;
        Ok((state, self.orchestrator.session().current()))
    }

    // ------------------------------------------------------------------
    // Guide log
    // ------------------------------------------------------------------

    /// Runs `op` against the writer selected for this campaign right now.
    fn guide_write<F>(&self, op: F) -> Result<(GuideWrite, DataSource)>
    where
        F: FnOnce(&dyn GuideLogWriter) -> Result<GuideWrite>,
    {
        let (state, session) = self.snapshot()?;
        let campaign = state.require_campaign(&self.campaign)?;
        let writer = select_writer(
            campaign,
            &session,
            self.orchestrator.store(),
            self.orchestrator.cache(),
        );
        debug!("Guide write for {} goes to {}", self.campaign, writer.source());
        let write = op(writer.as_ref())?;
        Ok((write, writer.source()))
    }

    async fn set_input(&self, input: GuideInput) -> Result<PendingMutation> {
        let label = input
            .step()
            .or_else(|| input.scenario())
            .unwrap_or_default()
            .to_string();
        let (write, source) = self.guide_write(|w| w.set_input(input, Utc::now()))?;
        self.orchestrator.events().publish(GuideEvent::InputAppended {
            campaign: self.campaign,
            source,
            input: label,
        });
        self.finish(write, source).await
    }

    async fn undo(&self, scenario: String) -> Result<PendingMutation> {
        let (write, source) = self.guide_write(|w| w.undo(&scenario, Utc::now()))?;
        if write.affected > 0 {
            self.orchestrator.events().publish(GuideEvent::InputsUndone {
                campaign: self.campaign,
                scenario,
                removed: write.affected,
            });
        } else {
            debug!("Nothing to undo in {} of {}", scenario, self.campaign);
        }
        self.finish(write, source).await
    }

    async fn reset_scenario(&self, scenario: String) -> Result<PendingMutation> {
        let (write, source) = self.guide_write(|w| w.reset_scenario(&scenario, Utc::now()))?;
        self.orchestrator.events().publish(GuideEvent::ScenarioReset {
            campaign: self.campaign,
            scenario,
        });
        self.finish(write, source).await
    }

    async fn achievement(&self, id: String, update: AchievementUpdate) -> Result<PendingMutation> {
        let now = Utc::now();
        let (write, source) = self.guide_write(|w| match update {
            AchievementUpdate::SetBinary(value) => w.set_binary_achievement(&id, value, now),
            AchievementUpdate::Inc { max } => w.inc_achievement(&id, max, now),
            AchievementUpdate::Dec => w.dec_achievement(&id, now),
        })?;
        self.orchestrator.events().publish(GuideEvent::AchievementUpdated {
            campaign: self.campaign,
            id,
        });
        self.finish(write, source).await
    }

    // ------------------------------------------------------------------
    // Decks
    // ------------------------------------------------------------------

    /// Saves `deck` on the device and, for server-backed campaigns, mirrors it.
    ///
    /// The remote call is built first, so an invalid chain link fails before
    /// anything is written. A deck whose previous version never reached the
    /// server is sent with its whole chain, oldest first.
    async fn update_deck(&self, deck: Deck) -> Result<PendingMutation> {
        let (state, session) = self.snapshot()?;
        let campaign = state.require_campaign(&self.campaign)?;
        let authoritative = is_server_authoritative(&campaign.id, &session);

        let mirror = if authoritative {
            let uploaded = require_uploaded(&campaign.id)?;
            let cache = self.orchestrator.cache();
            let actions = DeckActions::new(cache, &session)?;
            if cache.deck(uploaded.server_id, &deck.key())?.is_some() {
                DeckMirror::Call(actions.update_deck(uploaded, &deck)?)
            } else {
                match deck.previous {
                    None => DeckMirror::Call(Some(actions.create_base_deck(uploaded, &deck)?)),
                    Some(previous)
                        if cache.deck(uploaded.server_id, &previous.key())?.is_some() =>
                    {
                        DeckMirror::Call(Some(actions.create_next_deck(uploaded, &deck, previous)?))
                    }
                    Some(previous) => {
                        validate_next_link(&deck.id, &previous)?;
                        if !state.decks.contains(&previous.key()) {
                            return Err(LineageError::MissingPrevious {
                                deck: deck.id,
                                previous,
                            }
                            .into());
                        }
                        DeckMirror::Chain
                    }
                }
            }
        } else {
            DeckMirror::Call(None)
        };

        if let Err(err) = self.orchestrator.store().dispatch(&StoreAction::UpsertDeck {
            deck: deck.clone(),
            is_write: true,
            now: Utc::now(),
        }) {
            if let DeckMirror::Call(call) = mirror {
                self.orchestrator.discard(call.into_iter());
            }
            return Err(err.into());
        }

        let source = if authoritative {
            DataSource::Remote
        } else {
            DataSource::Local
        };
        self.publish_saved(deck.id, source);
        match mirror {
            DeckMirror::Call(Some(call)) => self.submit(call).await,
            DeckMirror::Call(None) => Ok(PendingMutation::settled(source)),
            DeckMirror::Chain => {
                debug!("Previous version of {} not on the server, uploading its chain", deck.id);
                self.upload_chain(deck.id).await
            }
        }
    }

    fn publish_saved(&self, deck: DeckId, source: DataSource) {
        self.orchestrator
            .events()
            .publish(DeckEvent::DeckSaved { deck, source });
    }

    async fn delete_deck(&self, deck: DeckId, all_versions: bool) -> Result<PendingMutation> {
        let (state, session) = self.snapshot()?;
        let campaign = state.require_campaign(&self.campaign)?;
        let removed: Vec<DeckKey> = if all_versions {
            backward_chain(&state.decks, &deck.key())
                .iter()
                .map(DeckId::key)
                .collect()
        } else {
            vec![deck.key()]
        };

        let remote = match campaign.id.uploaded() {
            Some(uploaded)
                if is_server_authoritative(&campaign.id, &session)
                    && self
                        .orchestrator
                        .cache()
                        .deck(uploaded.server_id, &deck.key())?
                        .is_some() =>
            {
                let actions = DeckActions::new(self.orchestrator.cache(), &session)?;
                Some(actions.delete_deck(uploaded, deck, all_versions)?)
            }
            _ => None,
        };

        if let Err(err) = self.orchestrator.store().dispatch(&StoreAction::DeleteDeck {
            deck,
            delete_all_versions: all_versions,
            now: Utc::now(),
        }) {
            self.orchestrator.discard(remote.into_iter());
            return Err(err.into());
        }
        self.orchestrator
            .events()
            .publish(DeckEvent::DecksDeleted { removed });

        match remote {
            Some(call) => self.submit(call).await,
            None => Ok(PendingMutation::settled(DataSource::Local)),
        }
    }

    async fn upload_chain(&self, deck: DeckId) -> Result<PendingMutation> {
        let Some(upload) = self
            .orchestrator
            .plan_chain_upload(self.campaign, deck, Utc::now())?
        else {
            return Ok(PendingMutation::settled(DataSource::Remote));
        };

        let kind = upload
            .steps
            .first()
            .map_or(MutationKind::CreateBaseDeck, |(_, call)| call.kind());
        let (ack, ack_rx) = oneshot::channel();
        self.enqueue(Job::Chain { upload, ack }).await?;
        Ok(PendingMutation::in_flight(kind, ack_rx))
    }

    async fn upload_all_chains(&self) -> Result<Vec<PendingMutation>> {
        let heads = self.orchestrator.chain_heads(self.campaign)?;
        let mut uploads = Vec::with_capacity(heads.len());
        for deck in heads {
            let pending = self.upload_chain(deck).await?;
            if !pending.is_settled() {
                uploads.push(pending);
            }
        }
        Ok(uploads)
    }
}
