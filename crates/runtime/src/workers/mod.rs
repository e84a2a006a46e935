//! Worker tasks that back the runtime orchestration.
//!
//! Each campaign gets a campaign worker, which applies optimistic state in
//! command order, and a dispatcher, which sends the resulting remote calls
//! one at a time.

mod campaign;
mod dispatcher;

pub use campaign::{AchievementUpdate, CampaignWorker, Command};
pub use dispatcher::{Dispatcher, Job};
