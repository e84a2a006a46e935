//! Device store backed by an append-only action journal.

use std::path::Path;
use std::sync::{Mutex, RwLock};

use campaign_core::{LocalState, StoreAction};

use super::FileRepository;
use crate::repository::{LocalStore, RepositoryError, Result};

pub const JOURNAL_FILENAME: &str = "store.journal";

/// Journals persistent actions to disk and keeps the reduced state in memory.
///
/// Opening replays the journal from the start. A record torn by a crash at
/// the tail is dropped and the file truncated to the last complete record.
pub struct FileJournalStore {
    journal: Mutex<FileRepository<StoreAction>>,
    state: RwLock<LocalState>,
}

impl FileJournalStore {
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let mut journal = FileRepository::open_or_create(base_dir, JOURNAL_FILENAME)?;
        let (actions, end) = journal.read_all()?;
        if end < journal.size() {
            journal.truncate(end)?;
        }

        let mut state = LocalState::default();
        for action in &actions {
            state.apply(action);
        }

        tracing::info!(
            "Replayed {} store actions from {}",
            actions.len(),
            journal.path().display()
        );

        Ok(Self {
            journal: Mutex::new(journal),
            state: RwLock::new(state),
        })
    }
}

impl LocalStore for FileJournalStore {
    fn snapshot(&self) -> Result<LocalState> {
        let state = self
            .state
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(state.clone())
    }

    fn dispatch(&self, action: &StoreAction) -> Result<()> {
        // Held across the reduce so journal order matches state order.
        let mut journal = self
            .journal
            .lock()
            .map_err(|_| RepositoryError::LockPoisoned)?;

        if action.is_persistent() {
            journal.append(action)?;
            journal.flush()?;
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        state.apply(action);

        tracing::trace!("Dispatched {}", action.kind());
        Ok(())
    }
}
