//! List campaigns and replay guide logs from the device store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use uuid::Uuid;

use campaign_core::{CampaignState, GuideEntryBody, LocalState, replay_from};

/// List campaigns, or replay one campaign's guide log
#[derive(Parser)]
pub struct Replay {
    /// Data directory or journal file
    #[arg(value_name = "JOURNAL")]
    journal: PathBuf,

    /// Campaign to replay. Lists every campaign when omitted.
    #[arg(short, long, value_name = "UUID")]
    campaign: Option<Uuid>,

    /// Print a readable summary instead of the replayed state as JSON
    #[arg(short, long)]
    summary: bool,
}

impl Replay {
    pub fn execute(self) -> Result<()> {
        let state = super::load_state(&self.journal)?;
        match self.campaign {
            Some(uuid) => replay_campaign(&state, uuid, self.summary),
            None => {
                list_campaigns(&state);
                Ok(())
            }
        }
    }
}

fn list_campaigns(state: &LocalState) {
    if state.campaigns.is_empty() {
        println!("{}", style("No campaigns").dim());
        return;
    }
    for campaign in state.campaigns.values() {
        let server = match campaign.id.server_id {
            Some(id) => style(id.to_string()).green(),
            None => style("local".to_string()).dim(),
        };
        let entries = state.guide(&campaign.uuid()).map_or(0, |log| log.len());
        println!(
            "{}  {:<32} {:<8} {} guide entries",
            campaign.uuid(),
            style(&campaign.name).bold(),
            server,
            entries
        );
    }
}

fn replay_campaign(state: &LocalState, uuid: Uuid, summary: bool) -> Result<()> {
    let campaign = state
        .campaign(&uuid)
        .with_context(|| format!("Campaign {uuid} not in store"))?;
    let log = state.guide(&uuid).cloned().unwrap_or_default();
    let replayed = replay_from(CampaignState::with_chaos_bag(campaign.chaos_bag.clone()), &log);

    if !summary {
        println!("{}", serde_json::to_string_pretty(&replayed)?);
        return Ok(());
    }

    println!("{} {}", style("Campaign:").bold().cyan(), campaign.name);
    println!("{} {:?}", style("Phase:").bold().cyan(), replayed.phase());

    let markers = log
        .entries()
        .iter()
        .filter(|e| !matches!(e.body, GuideEntryBody::Input { .. }))
        .count();
    println!(
        "{} {} ({} effective inputs, {} markers)",
        style("Entries:").bold().cyan(),
        log.len(),
        log.effective_inputs().len(),
        markers
    );
    println!();

    println!("{}", style("Scenarios:").bold().green());
    for id in &replayed.scenario_order {
        if let Some(scenario) = replayed.scenarios.get(id) {
            println!(
                "  {:<32} {:?} ({} answers)",
                id,
                scenario.status,
                scenario.answers.len()
            );
        }
    }

    if !replayed.achievements.is_empty() {
        println!();
        println!("{}", style("Achievements:").bold().green());
        for (id, value) in replayed.achievements.iter() {
            println!("  {:<32} {:?}", id, value);
        }
    }

    println!();
    println!(
        "{} {} tokens",
        style("Chaos bag:").bold().cyan(),
        replayed.chaos_bag.total()
    );
    Ok(())
}
