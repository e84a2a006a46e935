//! Compute deck content hashes.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use campaign_core::{Deck, DeckContent};

/// Compute the content hash of a deck file
///
/// Accepts either a full deck or just its content, as JSON.
#[derive(Parser)]
pub struct Hash {
    #[arg(value_name = "FILE")]
    path: PathBuf,
}

impl Hash {
    pub fn execute(self) -> Result<()> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let content = match serde_json::from_str::<Deck>(&raw) {
            Ok(deck) => deck.content,
            Err(_) => serde_json::from_str::<DeckContent>(&raw)
                .with_context(|| format!("{} is neither a deck nor deck content", self.path.display()))?,
        };
        println!("{}", content.content_hash()?);
        Ok(())
    }
}
