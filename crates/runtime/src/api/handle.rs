//! Cloneable façade for issuing commands to one campaign.
//!
//! [`CampaignHandle`] hides channel plumbing. Mutations return once their
//! optimistic state is applied, promotion once it is queued; reads go
//! straight to the resolver.
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use campaign_core::{
    CampaignState, ChaosBagResults, Deck, DeckId, GuideInput, UploadedCampaignId,
};

use super::errors::{Result, RuntimeError};
use super::pending::{PendingMutation, PendingPromotion, Promotion};
use crate::events::{Event, Topic};
use crate::runtime::Registry;
use crate::sync::{RemoteCall, ResolvedDeck};
use crate::workers::{AchievementUpdate, Command};

/// Client-facing handle to one campaign's worker
#[derive(Clone)]
pub struct CampaignHandle {
    campaign: Uuid,
    command_tx: mpsc::Sender<Command>,
    registry: Arc<Registry>,
}

impl CampaignHandle {
    pub(crate) fn new(
        campaign: Uuid,
        command_tx: mpsc::Sender<Command>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            campaign,
            command_tx,
            registry,
        }
    }

    pub fn campaign(&self) -> Uuid {
        self.campaign
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    // ------------------------------------------------------------------
    // Guide log
    // ------------------------------------------------------------------

    /// Appends one answer to the campaign guide.
    pub async fn set_input(&self, input: GuideInput) -> Result<PendingMutation> {
        self.request(|reply| Command::SetInput { input, reply })
            .await
    }

    /// Undoes the newest input of `scenario` and everything after it.
    pub async fn undo(&self, scenario: impl Into<String>) -> Result<PendingMutation> {
        let scenario = scenario.into();
        self.request(|reply| Command::Undo { scenario, reply }).await
    }

    pub async fn reset_scenario(&self, scenario: impl Into<String>) -> Result<PendingMutation> {
        let scenario = scenario.into();
        self.request(|reply| Command::ResetScenario { scenario, reply })
            .await
    }

    pub async fn set_binary_achievement(
        &self,
        id: impl Into<String>,
        value: bool,
    ) -> Result<PendingMutation> {
        self.achievement(id.into(), AchievementUpdate::SetBinary(value))
            .await
    }

    /// Increments a counter achievement, clamped at `max` when given.
    pub async fn inc_achievement(
        &self,
        id: impl Into<String>,
        max: Option<u32>,
    ) -> Result<PendingMutation> {
        self.achievement(id.into(), AchievementUpdate::Inc { max })
            .await
    }

    pub async fn dec_achievement(&self, id: impl Into<String>) -> Result<PendingMutation> {
        self.achievement(id.into(), AchievementUpdate::Dec).await
    }

    async fn achievement(&self, id: String, update: AchievementUpdate) -> Result<PendingMutation> {
        self.request(|reply| Command::Achievement { id, update, reply })
            .await
    }

    // ------------------------------------------------------------------
    // Decks
    // ------------------------------------------------------------------

    /// Saves a deck. For server-backed campaigns the server copy is created or
    /// updated; unchanged content sends nothing.
    pub async fn update_deck(&self, deck: Deck) -> Result<PendingMutation> {
        self.request(|reply| Command::UpdateDeck { deck, reply })
            .await
    }

    pub async fn delete_deck(&self, deck: DeckId, all_versions: bool) -> Result<PendingMutation> {
        self.request(|reply| Command::DeleteDeck {
            deck,
            all_versions,
            reply,
        })
        .await
    }

    /// Uploads every version of the chain containing `deck`, oldest first.
    ///
    /// Versions already on the server are skipped, so calling this again
    /// after a partial failure resumes the upload.
    pub async fn upload_deck_chain(&self, deck: DeckId) -> Result<PendingMutation> {
        self.request(|reply| Command::UploadChain { deck, reply })
            .await
    }

    pub(crate) async fn upload_all_chains(&self) -> Result<Vec<PendingMutation>> {
        self.request(|reply| Command::UploadAllChains { reply })
            .await
    }

    pub(crate) async fn submit(&self, call: RemoteCall) -> Result<PendingMutation> {
        self.request(|reply| Command::Remote { call, reply }).await
    }

    // ------------------------------------------------------------------
    // Promotion
    // ------------------------------------------------------------------

    /// Gives the campaign a server identity and starts uploading every
    /// member's deck chains.
    ///
    /// Returns as soon as the promotion is queued on the campaign's worker.
    /// Promoting an already promoted campaign resumes unfinished uploads.
    pub async fn promote(&self) -> Result<PendingPromotion> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Promote { reply: reply_tx })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let handle = self.clone();
        tokio::spawn(async move {
            let outcome = handle.finish_promotion(reply_rx).await;
            if outcome_tx.send(outcome).is_err() {
                debug!("Promotion outcome channel closed (caller dropped)");
            }
        });
        Ok(PendingPromotion::new(outcome_rx))
    }

    async fn finish_promotion(
        &self,
        reply: oneshot::Receiver<Result<Vec<UploadedCampaignId>>>,
    ) -> Result<Promotion> {
        let campaigns = reply.await.map_err(RuntimeError::ReplyChannelClosed)??;

        let mut uploads = Vec::new();
        for member in &campaigns {
            let handle = if member.uuid == self.campaign {
                self.clone()
            } else {
                self.registry.handle(member.uuid)?
            };
            uploads.extend(handle.upload_all_chains().await?);
        }
        Ok(Promotion { campaigns, uploads })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Replays the authoritative guide log.
    pub fn guide_state(&self) -> Result<CampaignState> {
        self.registry.orchestrator().guide_state(self.campaign)
    }

    pub fn deck(&self, deck: DeckId) -> Result<Option<ResolvedDeck>> {
        self.registry.orchestrator().deck(self.campaign, deck)
    }

    /// Versions up to and including `deck`, oldest first.
    pub fn deck_history(&self, deck: DeckId) -> Result<Vec<ResolvedDeck>> {
        self.registry.orchestrator().deck_history(self.campaign, deck)
    }

    pub fn chaos_bag_results(&self) -> Result<ChaosBagResults> {
        self.registry.orchestrator().chaos_bag_results(self.campaign)
    }

    /// Subscribe to events from a specific topic
    ///
    /// Events of every campaign are delivered; filter on their `campaign` field.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.registry.orchestrator().events().subscribe(topic)
    }
}
