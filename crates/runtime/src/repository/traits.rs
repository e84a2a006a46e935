//! Repository contract for the device store.

use campaign_core::{LocalState, StoreAction};

use super::Result;

/// Device-side store of campaigns, decks and guide logs.
///
/// Implementations reduce actions with [`campaign_core::reduce`] semantics and
/// decide for themselves how (and whether) to persist them.
pub trait LocalStore: Send + Sync {
    /// Clone of the current state.
    fn snapshot(&self) -> Result<LocalState>;

    /// Applies `action`. Persistent actions must be durable before this returns.
    fn dispatch(&self, action: &StoreAction) -> Result<()>;

    /// Applies a batch in order, stopping at the first failure.
    fn dispatch_all(&self, actions: &[StoreAction]) -> Result<()> {
        for action in actions {
            self.dispatch(action)?;
        }
        Ok(())
    }
}
