use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::blockchain::pow::{target_for, TARGET_BITS};

pub const DEFAULT_DATA_DIR: &str = "data/blockchain";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Errors that can occur while reading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Process configuration, read from `LEDGER_*` environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory of the block database
    pub data_dir: PathBuf,

    pub host: String,

    pub port: u16,

    /// Leading zero bits required in block hashes
    pub difficulty: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            difficulty: TARGET_BITS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to the
    /// defaults for missing keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            data_dir: lookup("LEDGER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            host: lookup("LEDGER_HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "LEDGER_PORT")?.unwrap_or(defaults.port),
            difficulty: parse(&lookup, "LEDGER_DIFFICULTY")?.unwrap_or(defaults.difficulty),
        };

        if target_for(config.difficulty).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "LEDGER_DIFFICULTY",
                value: config.difficulty.to_string(),
            });
        }

        Ok(config)
    }
}

fn parse<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => {
            let parsed: Result<T, _> = value.trim().parse();
            parsed
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue { key, value })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.difficulty, 24);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("LEDGER_DATA_DIR", "/tmp/ledger"),
            ("LEDGER_PORT", "9090"),
            ("LEDGER_DIFFICULTY", "16"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/ledger"));
        assert_eq!(config.port, 9090);
        assert_eq!(config.difficulty, 16);
        assert_eq!(config.host, DEFAULT_HOST);
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup_from(&[("LEDGER_PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("LEDGER_DIFFICULTY", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("LEDGER_DIFFICULTY", "300")])).is_err());
    }
}
