//! Command implementations
//!
//! Each command is a separate module that implements its own CLI args and execution logic.

mod actions;
mod chain;
mod hash;
mod replay;

pub use actions::Actions;
pub use chain::Chain;
pub use hash::Hash;
pub use replay::Replay;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use campaign_core::LocalState;
use sync_runtime::repository::JOURNAL_FILENAME;
use sync_runtime::{FileJournalStore, LocalStore};

/// Accepts either the journal file or the data directory holding it.
fn journal_dir(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        anyhow::bail!("Journal not found: {}", path.display());
    }
    if path.is_dir() {
        return Ok(path.to_path_buf());
    }
    if path.file_name().is_some_and(|name| name == JOURNAL_FILENAME) {
        return Ok(path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf));
    }
    anyhow::bail!(
        "{} is not a data directory or {} file",
        path.display(),
        JOURNAL_FILENAME
    )
}

/// Replays the journal at `path` into a state snapshot.
fn load_state(path: &Path) -> Result<LocalState> {
    let dir = journal_dir(path)?;
    let store = FileJournalStore::open(&dir)
        .with_context(|| format!("Failed to open journal in {}", dir.display()))?;
    Ok(store.snapshot()?)
}
