//! Persistence for the device store.
//!
//! The device store is an action journal: every persistent [`StoreAction`]
//! is appended before it is reduced into the in-memory [`LocalState`], and the
//! state is rebuilt by replaying the journal on open. Transient sync progress
//! is reduced but never written.
//!
//! [`StoreAction`]: campaign_core::StoreAction
//! [`LocalState`]: campaign_core::LocalState

mod error;
mod file;
mod memory;
mod traits;

pub use error::{RepositoryError, Result};
pub use file::{FileJournalStore, FileRepository, JOURNAL_FILENAME};
pub use memory::InMemoryLocalStore;
pub use traits::LocalStore;
