//! Print a deck's version chain from the device store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use uuid::Uuid;

use campaign_core::DeckKey;

/// Print the version chain containing a deck
#[derive(Parser)]
pub struct Chain {
    /// Data directory or journal file
    #[arg(value_name = "JOURNAL")]
    journal: PathBuf,

    /// Local uuid of any version in the chain
    #[arg(value_name = "DECK", conflicts_with = "legacy")]
    deck: Option<Uuid>,

    /// Legacy deck-site id of any version in the chain
    #[arg(long, value_name = "ID")]
    legacy: Option<u64>,
}

impl Chain {
    pub fn execute(self) -> Result<()> {
        let key = match (self.deck, self.legacy) {
            (Some(uuid), _) => DeckKey::Local(uuid),
            (None, Some(id)) => DeckKey::ArkhamDb(id),
            (None, None) => anyhow::bail!("Pass a deck uuid or --legacy <ID>"),
        };

        let state = super::load_state(&self.journal)?;
        let chain = state.decks.chain(&key);
        if chain.is_empty() {
            anyhow::bail!("Deck {key} not in store");
        }

        println!(
            "{} {} ({} versions)",
            style("Investigator:").bold().cyan(),
            chain[0].investigator_code,
            chain.len()
        );
        for deck in chain {
            let hash = deck
                .content_hash()
                .with_context(|| format!("Failed to hash {}", deck.id))?;
            let marker = if deck.key() == key {
                style("*").bold().yellow()
            } else {
                style(" ")
            };
            println!(
                "{} {:>2}  {:<48} {}  {}",
                marker,
                deck.scenario_count,
                deck.id.to_string(),
                style(&hash.to_string()[..12]).dim(),
                deck.content.name
            );
        }
        Ok(())
    }
}
