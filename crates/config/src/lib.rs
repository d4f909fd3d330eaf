use std::env;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use icn_common::PublicKey;

/// Errors that can occur in configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidEnvVar(String, String),

    #[error("Failed to read file: {0}")]
    FileReadError(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Whether anyone may supersede another key's domain claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionMode {
    /// A claim can only be changed by its owner
    #[default]
    None,
    /// The configured master public key may take over any claim
    Master,
}

/// What happens to unowned entries when a domain is claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPurge {
    /// Entries written before the claim stay in place
    #[default]
    Keep,
    /// Entries without an owner key are removed when the claim is taken
    RemoveUnowned,
}

/// Storage engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub protection_mode: ProtectionMode,
    #[serde(default)]
    pub master_public_key: Option<PublicKey>,
    #[serde(default)]
    pub claim_purge: ClaimPurge,
    /// Interval of the background expiration sweep, 0 disables it
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            protection_mode: ProtectionMode::default(),
            master_public_key: None,
            claim_purge: ClaimPurge::default(),
            sweep_interval_ms: default_sweep_interval_ms(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl StorageConfig {
    /// Load configuration from the process environment.
    ///
    /// If `ICN_STORAGE_CONFIG_FILE` names an existing file it is loaded first,
    /// then the individual `ICN_*` variables are applied on top.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`StorageConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("ICN_STORAGE_CONFIG_FILE") {
            Some(path) if Path::new(&path).exists() => Self::read_file(&path)?,
            _ => Self::default(),
        };

        if let Some(mode) = lookup("ICN_PROTECTION_MODE") {
            config.protection_mode = match mode.trim().to_ascii_lowercase().as_str() {
                "none" => ProtectionMode::None,
                "master" => ProtectionMode::Master,
                other => {
                    return Err(ConfigError::InvalidEnvVar(
                        "ICN_PROTECTION_MODE".to_string(),
                        other.to_string(),
                    ))
                }
            };
        }

        if let Some(key) = lookup("ICN_MASTER_PUBLIC_KEY") {
            let key = PublicKey::from_hex(key.trim()).map_err(|e| {
                ConfigError::InvalidEnvVar("ICN_MASTER_PUBLIC_KEY".to_string(), e.to_string())
            })?;
            config.master_public_key = Some(key);
        }

        if let Some(purge) = lookup("ICN_PURGE_ON_CLAIM") {
            let purge = purge.trim().parse::<bool>().map_err(|e| {
                ConfigError::InvalidEnvVar("ICN_PURGE_ON_CLAIM".to_string(), e.to_string())
            })?;
            config.claim_purge = if purge {
                ClaimPurge::RemoveUnowned
            } else {
                ClaimPurge::Keep
            };
        }

        if let Some(interval) = lookup("ICN_SWEEP_INTERVAL_MS") {
            config.sweep_interval_ms = interval.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnvVar("ICN_SWEEP_INTERVAL_MS".to_string(), e.to_string())
            })?;
        }

        if let Some(level) = lookup("ICN_LOG_LEVEL") {
            config.log_level = level.trim().to_string();
        }

        if let Some(dir) = lookup("ICN_LOG_DIR") {
            config.log_dir = Some(dir);
        }

        config.validate()?;
        debug!(
            protection_mode = ?config.protection_mode,
            claim_purge = ?config.claim_purge,
            "Loaded storage configuration"
        );
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(format!("Failed to read {}: {}", path, e)))?;

        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.protection_mode == ProtectionMode::Master && self.master_public_key.is_none() {
            return Err(ConfigError::Invalid(
                "protection_mode 'master' requires master_public_key".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Invalid(format!("Invalid log level: {}", other)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = StorageConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.protection_mode, ProtectionMode::None);
        assert_eq!(config.claim_purge, ClaimPurge::Keep);
        assert_eq!(config.master_public_key, None);
        assert_eq!(config.sweep_interval_ms, 60_000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let config = StorageConfig::from_lookup(lookup_from(&[
            ("ICN_PROTECTION_MODE", "master"),
            ("ICN_MASTER_PUBLIC_KEY", "0a0b0c"),
            ("ICN_PURGE_ON_CLAIM", "true"),
            ("ICN_SWEEP_INTERVAL_MS", "250"),
            ("ICN_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.protection_mode, ProtectionMode::Master);
        assert_eq!(config.master_public_key, Some(PublicKey::new(vec![0x0a, 0x0b, 0x0c])));
        assert_eq!(config.claim_purge, ClaimPurge::RemoveUnowned);
        assert_eq!(config.sweep_interval_ms, 250);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_env_values() {
        let result =
            StorageConfig::from_lookup(lookup_from(&[("ICN_PROTECTION_MODE", "sometimes")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));

        let result = StorageConfig::from_lookup(lookup_from(&[("ICN_PURGE_ON_CLAIM", "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));

        let result = StorageConfig::from_lookup(lookup_from(&[("ICN_MASTER_PUBLIC_KEY", "xyz")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_master_mode_requires_key() {
        let result = StorageConfig::from_lookup(lookup_from(&[("ICN_PROTECTION_MODE", "master")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file_with_env_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "protection_mode: master\nmaster_public_key: \"ff00\"\nclaim_purge: remove_unowned\n"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = StorageConfig::from_file(&path).unwrap();
        assert_eq!(config.protection_mode, ProtectionMode::Master);
        assert_eq!(config.claim_purge, ClaimPurge::RemoveUnowned);
        assert_eq!(config.sweep_interval_ms, 60_000);

        let config = StorageConfig::from_lookup(lookup_from(&[
            ("ICN_STORAGE_CONFIG_FILE", path.as_str()),
            ("ICN_PURGE_ON_CLAIM", "false"),
        ]))
        .unwrap();
        assert_eq!(config.protection_mode, ProtectionMode::Master);
        assert_eq!(config.claim_purge, ClaimPurge::Keep);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = StorageConfig::from_file("/nonexistent/storage.yaml");
        assert!(matches!(result, Err(ConfigError::FileReadError(_))));
    }
}
