//! Configuration structures for the UE control-plane core
//!
//! Timer intervals follow the srsRAN UE defaults; all values can be
//! overridden from a YAML document.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::Plmn;

/// Default T300 (connection establishment guard) interval in milliseconds.
pub const DEFAULT_T300_MS: u64 = 2000;

/// Default T304 (mobility command guard) interval in milliseconds.
pub const DEFAULT_T304_MS: u64 = 1000;

/// Default neighbour-cell staleness timeout in milliseconds.
///
/// A neighbour that has not produced an RSRP report for this long is
/// eligible for pruning.
pub const DEFAULT_NEIGHBOUR_TIMEOUT_MS: u64 = 5000;

/// Default capacity for task message channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default carrier frequency number searched during cell selection.
pub const DEFAULT_EARFCN: u32 = 3400;

/// UE control-plane configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeConfig {
    /// Home PLMN the UE considers "network selected"
    pub plmn: Plmn,
    /// Carrier frequency number searched during cell selection
    #[serde(default = "default_earfcn")]
    pub earfcn: u32,
    /// Connection establishment guard timer interval (ms)
    #[serde(default = "default_t300_ms")]
    pub t300_ms: u64,
    /// Mobility command guard timer interval (ms)
    #[serde(default = "default_t304_ms")]
    pub t304_ms: u64,
    /// Neighbour-cell staleness timeout (ms)
    #[serde(default = "default_neighbour_timeout_ms")]
    pub neighbour_timeout_ms: u64,
    /// Capacity of the task message channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_earfcn() -> u32 {
    DEFAULT_EARFCN
}

fn default_t300_ms() -> u64 {
    DEFAULT_T300_MS
}

fn default_t304_ms() -> u64 {
    DEFAULT_T304_MS
}

fn default_neighbour_timeout_ms() -> u64 {
    DEFAULT_NEIGHBOUR_TIMEOUT_MS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for UeConfig {
    fn default() -> Self {
        Self {
            plmn: Plmn::default(),
            earfcn: DEFAULT_EARFCN,
            t300_ms: DEFAULT_T300_MS,
            t304_ms: DEFAULT_T304_MS,
            neighbour_timeout_ms: DEFAULT_NEIGHBOUR_TIMEOUT_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl UeConfig {
    /// Parses a configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Loads a configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = UeConfig::default();
        assert_eq!(config.t300_ms, DEFAULT_T300_MS);
        assert_eq!(config.t304_ms, DEFAULT_T304_MS);
        assert_eq!(config.neighbour_timeout_ms, DEFAULT_NEIGHBOUR_TIMEOUT_MS);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r"
plmn:
  mcc: 999
  mnc: 70
  long_mnc: false
t300_ms: 1500
";
        let config = UeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.plmn, Plmn::new(999, 70, false));
        assert_eq!(config.t300_ms, 1500);
        // Omitted fields fall back to defaults
        assert_eq!(config.neighbour_timeout_ms, DEFAULT_NEIGHBOUR_TIMEOUT_MS);
    }

    #[test]
    fn test_config_invalid_yaml() {
        assert!(UeConfig::from_yaml_str("plmn: [not, a, map]").is_err());
    }
}
