//! File-backed persistence for the device store.

mod journal;
mod log;

pub use journal::{FileJournalStore, JOURNAL_FILENAME};
pub use log::FileRepository;
