//! Runtime configuration.
use std::env;
use std::path::PathBuf;

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Queue depth of each campaign worker's command channel.
    pub command_buffer_size: usize,
    /// Queue depth of each campaign's remote dispatch channel.
    pub dispatch_buffer_size: usize,
    /// Broadcast capacity per event topic.
    pub event_buffer_size: usize,
    /// Where the device-store journal lives.
    pub data_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            dispatch_buffer_size: 64,
            event_buffer_size: 100,
            data_dir: default_data_dir(),
        }
    }
}

impl RuntimeConfig {
    /// Construct runtime configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CAMPAIGN_SYNC_COMMAND_BUFFER` - campaign worker queue depth (default: 32)
    /// - `CAMPAIGN_SYNC_DISPATCH_BUFFER` - remote dispatch queue depth (default: 64)
    /// - `CAMPAIGN_SYNC_EVENT_BUFFER` - event capacity per topic (default: 100)
    /// - `CAMPAIGN_SYNC_DATA_DIR` - device-store directory
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = read_env::<usize>("CAMPAIGN_SYNC_COMMAND_BUFFER") {
            config.command_buffer_size = size.max(1);
        }
        if let Some(size) = read_env::<usize>("CAMPAIGN_SYNC_DISPATCH_BUFFER") {
            config.dispatch_buffer_size = size.max(1);
        }
        if let Some(size) = read_env::<usize>("CAMPAIGN_SYNC_EVENT_BUFFER") {
            config.event_buffer_size = size.max(1);
        }
        if let Some(dir) = read_env::<PathBuf>("CAMPAIGN_SYNC_DATA_DIR") {
            config.data_dir = dir;
        }

        config
    }
}

/// Platform data directory, e.g. `~/.local/share/campaign-sync` on Linux.
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "campaign-sync")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./campaign_data"))
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}
