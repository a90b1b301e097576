//! Type definitions shared by the codec, the bank, and the tester

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TslError, TslResult};

/// Conventional TSL 3.1 UDP port
pub const DEFAULT_PORT: u16 = 5727;

/// Default receiver address used by a fresh configuration
pub const DEFAULT_HOST: &str = "192.168.1.100";

/// Tally state of one input, derived from its two tally flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TallyState {
    /// Neither program nor preview
    Off,
    /// On air (Tally 1, red)
    Program,
    /// In preview (Tally 2, green)
    Preview,
    /// Program and preview at once
    Both,
}

impl TallyState {
    pub fn from_flags(program: bool, preview: bool) -> Self {
        match (program, preview) {
            (false, false) => TallyState::Off,
            (true, false) => TallyState::Program,
            (false, true) => TallyState::Preview,
            (true, true) => TallyState::Both,
        }
    }

    /// Returns the `(program, preview)` pair
    pub fn flags(&self) -> (bool, bool) {
        match self {
            TallyState::Off => (false, false),
            TallyState::Program => (true, false),
            TallyState::Preview => (false, true),
            TallyState::Both => (true, true),
        }
    }

    /// Next state in the OFF -> PGM -> PVW -> BOTH -> OFF cycle
    pub fn next(&self) -> Self {
        match self {
            TallyState::Off => TallyState::Program,
            TallyState::Program => TallyState::Preview,
            TallyState::Preview => TallyState::Both,
            TallyState::Both => TallyState::Off,
        }
    }
}

impl fmt::Display for TallyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TallyState::Off => "OFF",
            TallyState::Program => "PGM",
            TallyState::Preview => "PVW",
            TallyState::Both => "BOTH",
        };
        f.write_str(s)
    }
}

impl FromStr for TallyState {
    type Err = TslError;

    fn from_str(s: &str) -> TslResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "x" => Ok(TallyState::Off),
            "pgm" | "program" | "p" => Ok(TallyState::Program),
            "pvw" | "preview" | "v" => Ok(TallyState::Preview),
            "both" => Ok(TallyState::Both),
            _ => Err(TslError::Config(format!("Invalid tally state: {}", s))),
        }
    }
}

/// Bulk label presets applied across the whole bank
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LabelPreset {
    /// "CAM n"
    CamNumber,
    /// "CAMERA n"
    CameraNumber,
    /// "INPUT n"
    InputNumber,
    /// "SOURCE n"
    SourceNumber,
    /// Empty labels
    Clear,
}

impl LabelPreset {
    /// Label for the given 0-based address
    pub fn label_for(&self, address: u8) -> String {
        let n = address as u32 + 1;
        match self {
            LabelPreset::CamNumber => format!("CAM {}", n),
            LabelPreset::CameraNumber => format!("CAMERA {}", n),
            LabelPreset::InputNumber => format!("INPUT {}", n),
            LabelPreset::SourceNumber => format!("SOURCE {}", n),
            LabelPreset::Clear => String::new(),
        }
    }
}

impl FromStr for LabelPreset {
    type Err = TslError;

    fn from_str(s: &str) -> TslResult<Self> {
        let key = s.trim().trim_end_matches('#').trim().to_ascii_lowercase();
        match key.as_str() {
            "cam" => Ok(LabelPreset::CamNumber),
            "camera" => Ok(LabelPreset::CameraNumber),
            "input" => Ok(LabelPreset::InputNumber),
            "source" => Ok(LabelPreset::SourceNumber),
            "clear" => Ok(LabelPreset::Clear),
            _ => Err(TslError::Config(format!("Invalid label preset: {}", s))),
        }
    }
}

/// Where frames are sent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl Destination {
    /// Create a validated destination
    pub fn new(host: impl Into<String>, port: u16) -> TslResult<Self> {
        let dest = Self {
            host: host.into(),
            port,
        };
        dest.validate()?;
        Ok(dest)
    }

    /// Check the host is present and the port is within 1-65535
    pub fn validate(&self) -> TslResult<()> {
        if self.host.trim().is_empty() {
            return Err(TslError::Config("Missing destination host".to_string()));
        }
        if self.port == 0 {
            return Err(TslError::Config("Port must be 1-65535".to_string()));
        }
        Ok(())
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
