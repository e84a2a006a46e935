//! In-memory device store for tests and ephemeral sessions.

use std::sync::RwLock;

use campaign_core::{LocalState, StoreAction};

use super::{LocalStore, RepositoryError, Result};

/// Device store that keeps its state in memory only.
pub struct InMemoryLocalStore {
    state: RwLock<LocalState>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::with_state(LocalState::default())
    }

    pub fn with_state(state: LocalState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for InMemoryLocalStore {
    fn snapshot(&self) -> Result<LocalState> {
        let state = self
            .state
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(state.clone())
    }

    fn dispatch(&self, action: &StoreAction) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        state.apply(action);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use campaign_core::Campaign;
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn dispatch_reduces_into_snapshot() {
        let store = InMemoryLocalStore::new();
        let uuid = Uuid::new_v4();
        store
            .dispatch(&StoreAction::NewCampaign {
                campaign: Campaign::new_guided(uuid, "Carcosa", "ptc", Utc::now()),
                now: Utc::now(),
            })
            .unwrap();

        let state = store.snapshot().unwrap();
        assert!(state.campaign(&uuid).is_some());
        assert!(state.guide(&uuid).is_some());
    }
}
