//! Plain-data snapshots of the bank and destination
//!
//! [`ConfigSnapshot`] is the in/out form used by persistence. [`SavedConfig`]
//! is the on-disk JSON layout (`ip`, `port`, `labels` keyed by input number).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bank::{InputState, TallyBank, BANK_SIZE};
use crate::error::{TslError, TslResult};
use crate::types::Destination;

/// One input as stored in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputRecord {
    pub address: u8,
    pub label: String,
    #[serde(default)]
    pub program: bool,
    #[serde(default)]
    pub preview: bool,
}

/// Bank contents plus destination, as plain data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub destination: Destination,
    pub inputs: Vec<InputRecord>,
}

impl ConfigSnapshot {
    pub fn capture(bank: &TallyBank, destination: &Destination) -> Self {
        let inputs = bank
            .iter()
            .map(|input| InputRecord {
                address: input.address(),
                label: input.label().to_string(),
                program: input.program(),
                preview: input.preview(),
            })
            .collect();

        Self {
            destination: destination.clone(),
            inputs,
        }
    }

    /// Rebuild a bank and destination. Nothing is returned unless every
    /// field is valid, so callers can swap state in only on success.
    pub fn restore(&self) -> TslResult<(TallyBank, Destination)> {
        self.destination
            .validate()
            .map_err(|e| TslError::InvalidSnapshot(e.to_string()))?;

        if self.inputs.len() != BANK_SIZE {
            return Err(TslError::InvalidSnapshot(format!(
                "expected {} inputs, got {}",
                BANK_SIZE,
                self.inputs.len()
            )));
        }

        let inputs = self
            .inputs
            .iter()
            .map(|record| {
                let mut input = InputState::new(record.address)
                    .map_err(|e| TslError::InvalidSnapshot(e.to_string()))?;
                input.set_flags(record.program, record.preview);
                input.set_label(record.label.clone());
                Ok(input)
            })
            .collect::<TslResult<Vec<InputState>>>()?;

        let bank = TallyBank::from_inputs(inputs)?;
        Ok((bank, self.destination.clone()))
    }
}

/// Port as written by older config files, either `"5727"` or `5727`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    pub fn to_port(&self) -> Result<u16, String> {
        let value = match self {
            PortValue::Number(n) => *n,
            PortValue::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("Invalid port: {}", s))?,
        };
        match u16::try_from(value) {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(format!("Port must be 1-65535, got {}", value)),
        }
    }
}

/// JSON representation of a saved configuration. Every field is optional;
/// loading only replaces what the file contains.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortValue>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl SavedConfig {
    /// Labels only; tally state is not written to disk
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let labels = snapshot
            .inputs
            .iter()
            .map(|record| ((record.address as u32 + 1).to_string(), record.label.clone()))
            .collect();

        Self {
            ip: Some(snapshot.destination.host.clone()),
            port: Some(PortValue::Text(snapshot.destination.port.to_string())),
            labels,
        }
    }

    /// Overlay this file on `base`. Destination fields and labels missing
    /// from the file keep their value in `base`, as do tally states. Label
    /// keys outside 1-80 are skipped; keys that are not numbers are an error.
    pub fn apply_to(&self, base: &ConfigSnapshot) -> TslResult<ConfigSnapshot> {
        let mut snapshot = base.clone();

        if let Some(ip) = &self.ip {
            snapshot.destination.host = ip.clone();
        }
        if let Some(port) = &self.port {
            snapshot.destination.port = port.to_port().map_err(TslError::InvalidSnapshot)?;
        }
        snapshot
            .destination
            .validate()
            .map_err(|e| TslError::InvalidSnapshot(e.to_string()))?;

        for (key, label) in &self.labels {
            let number: usize = key
                .trim()
                .parse()
                .map_err(|_| TslError::InvalidSnapshot(format!("Invalid input number: {}", key)))?;
            if number == 0 || number > BANK_SIZE {
                continue;
            }
            if let Some(record) = snapshot
                .inputs
                .iter_mut()
                .find(|record| record.address as usize == number - 1)
            {
                record.label = label.clone();
            }
        }
        Ok(snapshot)
    }

    /// Overlay this file on a fresh bank and the default destination
    pub fn to_snapshot(&self) -> TslResult<ConfigSnapshot> {
        self.apply_to(&ConfigSnapshot::capture(&TallyBank::new(), &Destination::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LabelPreset, TallyState, DEFAULT_HOST};

    #[test]
    fn test_capture_restore() {
        let mut bank = TallyBank::new();
        bank.apply_label_preset(LabelPreset::CamNumber);
        bank.set_label(3, "JIB CAMERA OVER STAGE").unwrap();
        bank.set_tally(3, true, false).unwrap();
        let dest = Destination::new("10.1.2.3", 9000).unwrap();

        let snapshot = ConfigSnapshot::capture(&bank, &dest);
        let (restored, restored_dest) = snapshot.restore().unwrap();

        assert_eq!(restored, bank);
        assert_eq!(restored_dest, dest);
        assert_eq!(restored.get(3).unwrap().label(), "JIB CAMERA OVER STAGE");
    }

    #[test]
    fn test_restore_wrong_count() {
        let bank = TallyBank::new();
        let mut snapshot = ConfigSnapshot::capture(&bank, &Destination::default());
        snapshot.inputs.pop();
        assert_eq!(snapshot.inputs.len(), 79);
        assert!(matches!(snapshot.restore(), Err(TslError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_restore_bad_fields() {
        let bank = TallyBank::new();

        let mut bad_port = ConfigSnapshot::capture(&bank, &Destination::default());
        bad_port.destination.port = 0;
        assert!(matches!(bad_port.restore(), Err(TslError::InvalidSnapshot(_))));

        let mut duplicate = ConfigSnapshot::capture(&bank, &Destination::default());
        duplicate.inputs[1].address = 0;
        assert!(matches!(duplicate.restore(), Err(TslError::InvalidSnapshot(_))));

        let mut bad_address = ConfigSnapshot::capture(&bank, &Destination::default());
        bad_address.inputs[79].address = 200;
        assert!(matches!(bad_address.restore(), Err(TslError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_snapshot_json_tallies_optional() {
        let bank = TallyBank::new();
        let snapshot = ConfigSnapshot::capture(&bank, &Destination::default());
        let mut value = serde_json::to_value(&snapshot).unwrap();
        for record in value["inputs"].as_array_mut().unwrap() {
            let record = record.as_object_mut().unwrap();
            record.remove("program");
            record.remove("preview");
        }
        let parsed: ConfigSnapshot = serde_json::from_value(value).unwrap();
        let (restored, _) = parsed.restore().unwrap();
        assert!(restored.iter().all(|i| i.state() == TallyState::Off));
    }

    #[test]
    fn test_saved_config_parse() {
        let json = r#"{
            "ip": "192.168.10.20",
            "port": "6000",
            "labels": { "1": "HOST", "80": "WIDE" }
        }"#;
        let saved: SavedConfig = serde_json::from_str(json).unwrap();
        let (bank, dest) = saved.to_snapshot().unwrap().restore().unwrap();

        assert_eq!(dest.host, "192.168.10.20");
        assert_eq!(dest.port, 6000);
        assert_eq!(bank.get(0).unwrap().label(), "HOST");
        assert_eq!(bank.get(79).unwrap().label(), "WIDE");
        assert_eq!(bank.get(1).unwrap().label(), "INPUT 2");
    }

    #[test]
    fn test_saved_config_numeric_port_and_defaults() {
        let saved: SavedConfig = serde_json::from_str(r#"{ "port": 5728 }"#).unwrap();
        let snapshot = saved.to_snapshot().unwrap();
        assert_eq!(snapshot.destination.port, 5728);
        assert_eq!(snapshot.destination.host, DEFAULT_HOST);
    }

    #[test]
    fn test_saved_config_rejects_bad_values() {
        let bad_key: SavedConfig = serde_json::from_str(r#"{ "labels": { "cam": "X" } }"#).unwrap();
        assert!(matches!(bad_key.to_snapshot(), Err(TslError::InvalidSnapshot(_))));

        let bad_port: SavedConfig = serde_json::from_str(r#"{ "port": "70000" }"#).unwrap();
        assert!(bad_port.to_snapshot().is_err());
    }

    #[test]
    fn test_saved_config_roundtrip_labels() {
        let mut bank = TallyBank::new();
        bank.apply_label_preset(LabelPreset::CameraNumber);
        bank.set_label(40, "  spaced  label  ").unwrap();
        let snapshot = ConfigSnapshot::capture(&bank, &Destination::default());

        let saved = SavedConfig::from_snapshot(&snapshot);
        let json = serde_json::to_string_pretty(&saved).unwrap();
        let parsed: SavedConfig = serde_json::from_str(&json).unwrap();
        let (restored, _) = parsed.to_snapshot().unwrap().restore().unwrap();

        for (a, b) in bank.iter().zip(restored.iter()) {
            assert_eq!(a.label(), b.label());
        }
        assert_eq!(saved.port, Some(PortValue::Text("5727".to_string())));
    }

    #[test]
    fn test_partial_file_keeps_current_values() {
        let mut bank = TallyBank::new();
        bank.set_label(1, "KEEP ME").unwrap();
        bank.set_tally(2, true, false).unwrap();
        let base = ConfigSnapshot::capture(&bank, &Destination::new("10.0.0.50", 6000).unwrap());

        let saved: SavedConfig = serde_json::from_str(r#"{ "labels": { "1": "HOST" } }"#).unwrap();
        let (merged, dest) = saved.apply_to(&base).unwrap().restore().unwrap();

        assert_eq!(dest, Destination::new("10.0.0.50", 6000).unwrap());
        assert_eq!(merged.get(0).unwrap().label(), "HOST");
        assert_eq!(merged.get(1).unwrap().label(), "KEEP ME");
        assert!(merged.get(2).unwrap().program());

        let port_only: SavedConfig = serde_json::from_str(r#"{ "port": "7000" }"#).unwrap();
        let merged = port_only.apply_to(&base).unwrap();
        assert_eq!(merged.destination.host, "10.0.0.50");
        assert_eq!(merged.destination.port, 7000);
    }

    #[test]
    fn test_out_of_range_label_keys_skipped() {
        let base = ConfigSnapshot::capture(&TallyBank::new(), &Destination::default());
        let saved: SavedConfig =
            serde_json::from_str(r#"{ "labels": { "0": "ZERO", "81": "X", "5": "FIVE" } }"#).unwrap();
        let merged = saved.apply_to(&base).unwrap();
        assert_eq!(merged.inputs[4].label, "FIVE");
        assert_eq!(merged.inputs[0].label, "INPUT 1");
        assert_eq!(merged.inputs.len(), BANK_SIZE);
    }

    #[test]
    fn test_empty_ip_rejected() {
        let base = ConfigSnapshot::capture(&TallyBank::new(), &Destination::default());
        let saved: SavedConfig = serde_json::from_str(r#"{ "ip": "" }"#).unwrap();
        assert!(matches!(saved.apply_to(&base), Err(TslError::InvalidSnapshot(_))));
    }
}
