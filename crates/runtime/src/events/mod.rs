//! Topic-based event bus for sync observers.
//!
//! UI layers subscribe to [`Topic::Sync`] for upload spinners and
//! acknowledgment status, [`Topic::Guide`] for log changes and
//! [`Topic::Deck`] for deck edits.

mod bus;
mod types;

pub use bus::{Event, EventBus, Topic};
pub use types::{DeckEvent, GuideEvent, SyncEvent};
