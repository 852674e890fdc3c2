use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{Error, Result};

pub const DEFAULT_KEY_VALUE_CAPACITY: u32 = 65_521;
pub const DEFAULT_VALUE_PREFIX_LENGTH: u32 = 16;
pub const DEFAULT_SPATIAL_FANOUT: usize = 64;
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/map";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Store and import settings, read from a JSON file.
#[derive(Deserialize, Debug, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub data_path: String,
    #[serde(default)]
    pub dest_path: String,
    #[serde(default = "default_key_value_capacity")]
    pub key_value_capacity: u32,
    #[serde(default = "default_value_prefix_length")]
    pub value_prefix_length: u32,
    #[serde(default = "default_spatial_fanout")]
    pub spatial_fanout: usize,
    #[serde(default = "default_overpass_url")]
    pub overpass_url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_key_value_capacity() -> u32 {
    DEFAULT_KEY_VALUE_CAPACITY
}

fn default_value_prefix_length() -> u32 {
    DEFAULT_VALUE_PREFIX_LENGTH
}

fn default_spatial_fanout() -> usize {
    DEFAULT_SPATIAL_FANOUT
}

fn default_overpass_url() -> String {
    DEFAULT_OVERPASS_URL.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_path: String::new(),
            dest_path: String::new(),
            key_value_capacity: DEFAULT_KEY_VALUE_CAPACITY,
            value_prefix_length: DEFAULT_VALUE_PREFIX_LENGTH,
            spatial_fanout: DEFAULT_SPATIAL_FANOUT,
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl StoreConfig {
    pub fn load(path: &Path) -> Result<StoreConfig> {
        let file = File::open(path)?;
        let config: StoreConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_value_capacity < 1 {
            return Err("key_value_capacity must be at least 1".into());
        }
        if self.spatial_fanout < 2 {
            return Err(Error::from(format!("spatial_fanout must be at least 2, got {}", self.spatial_fanout)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"data_path": "london.osm.xz"}"#).unwrap();
        assert_eq!(config.data_path, "london.osm.xz");
        assert_eq!(config.key_value_capacity, DEFAULT_KEY_VALUE_CAPACITY);
        assert_eq!(config.spatial_fanout, DEFAULT_SPATIAL_FANOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_fanout() {
        let config: StoreConfig = serde_json::from_str(r#"{"spatial_fanout": 1}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Parse);
    }
}
