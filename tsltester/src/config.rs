//! Configuration loading for the tester

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tslcore::{ConfigSnapshot, Destination, SavedConfig, TslResult, DEFAULT_HOST, DEFAULT_PORT};

use crate::sequence::SequenceIntervals;

/// Runtime settings, read from a JSON file. Missing fields take defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Whether frames are sent at all
    pub enabled: bool,
    pub demo_interval_ms: u64,
    pub chase_interval_ms: u64,
    pub random_interval_ms: u64,
    pub send_timeout_ms: u64,
    pub send_queue_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            enabled: false,
            demo_interval_ms: constants::DEMO_INTERVAL.as_millis() as u64,
            chase_interval_ms: constants::CHASE_INTERVAL.as_millis() as u64,
            random_interval_ms: constants::RANDOM_INTERVAL.as_millis() as u64,
            send_timeout_ms: constants::SEND_TIMEOUT.as_millis() as u64,
            send_queue_size: constants::SEND_QUEUE_SIZE,
        }
    }
}

impl Settings {
    pub fn destination(&self) -> TslResult<Destination> {
        Destination::new(self.host.clone(), self.port)
    }

    pub fn intervals(&self) -> SequenceIntervals {
        SequenceIntervals {
            demo: Duration::from_millis(self.demo_interval_ms.max(1)),
            chase: Duration::from_millis(self.chase_interval_ms.max(1)),
            random: Duration::from_millis(self.random_interval_ms.max(1)),
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Load settings from a JSON file
pub fn load_settings<P: AsRef<Path>>(path: P) -> TslResult<Settings> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let settings: Settings = serde_json::from_reader(reader)?;
    settings.destination()?;
    Ok(settings)
}

/// Load a saved labels/connection file over `current`. Anything the file
/// leaves out keeps its current value.
pub fn load_saved_config<P: AsRef<Path>>(path: P, current: &ConfigSnapshot) -> TslResult<ConfigSnapshot> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let saved: SavedConfig = serde_json::from_reader(reader)?;
    saved.apply_to(current)
}

/// Write the labels and connection settings of a snapshot
pub fn save_saved_config<P: AsRef<Path>>(path: P, snapshot: &ConfigSnapshot) -> TslResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &SavedConfig::from_snapshot(snapshot))?;
    writer.flush()?;
    Ok(())
}

/// Configuration constants
pub mod constants {
    use std::time::Duration;

    /// Saved configuration read at startup when present
    pub const DEFAULT_CONFIG_FILE: &str = "tsl_tester_config.json";

    pub const DEMO_INTERVAL: Duration = Duration::from_millis(700);

    pub const CHASE_INTERVAL: Duration = Duration::from_millis(1000);

    pub const RANDOM_INTERVAL: Duration = Duration::from_millis(1000);

    /// Write timeout on the UDP socket
    pub const SEND_TIMEOUT: Duration = Duration::from_millis(300);

    /// Frames waiting for the send thread before new ones are dropped
    pub const SEND_QUEUE_SIZE: usize = 256;
}
