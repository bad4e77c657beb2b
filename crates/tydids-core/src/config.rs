//! Runtime configuration: decode limits and secure element key derivation.
//!
//! Loaded from YAML, with environment overrides on top:
//!
//! ```yaml
//! limits:
//!   max_decode_depth: 5
//!   max_bundle_bytes: 65536
//! keystore:
//!   memory_kib: 19456
//!   iterations: 2
//!   parallelism: 1
//! ```
//!
//! | Variable                  | Field                      |
//! |---------------------------|----------------------------|
//! | `TYDIDS_MAX_DECODE_DEPTH` | `limits.max_decode_depth`  |
//! | `TYDIDS_MAX_BUNDLE_BYTES` | `limits.max_bundle_bytes`  |
//! | `TYDIDS_KDF_MEMORY_KIB`   | `keystore.memory_kib`      |

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_MAX_DECODE_DEPTH: &str = "TYDIDS_MAX_DECODE_DEPTH";
pub const ENV_MAX_BUNDLE_BYTES: &str = "TYDIDS_MAX_BUNDLE_BYTES";
pub const ENV_KDF_MEMORY_KIB: &str = "TYDIDS_KDF_MEMORY_KIB";

/// Upper bound accepted for Argon2 memory, also when opening foreign documents.
pub const MAX_KDF_MEMORY_KIB: u32 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {variable}: '{value}'")]
    InvalidEnv { variable: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Bounds applied when reconstructing records from transported bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenLimits {
    /// Maximum JSON parse passes while unwrapping a string-encoded object.
    pub max_decode_depth: usize,
    /// Maximum length of any single transported field.
    pub max_bundle_bytes: usize,
}

impl Default for OpenLimits {
    fn default() -> Self {
        Self {
            max_decode_depth: 5,
            max_bundle_bytes: 64 * 1024,
        }
    }
}

/// Partial overrides for `OpenLimits`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenLimitsOverrides {
    pub max_decode_depth: Option<usize>,
    pub max_bundle_bytes: Option<usize>,
}

impl OpenLimits {
    /// Apply overrides onto these limits. Only `Some` values override.
    pub fn apply(self, overrides: OpenLimitsOverrides) -> Self {
        Self {
            max_decode_depth: overrides.max_decode_depth.unwrap_or(self.max_decode_depth),
            max_bundle_bytes: overrides.max_bundle_bytes.unwrap_or(self.max_bundle_bytes),
        }
    }
}

/// Argon2id cost parameters for sealing secure elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfSettings {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == 0 || self.parallelism > 16 {
            return Err(ConfigError::Invalid(format!(
                "keystore.parallelism must be within 1..=16, got {}",
                self.parallelism
            )));
        }
        if self.iterations == 0 {
            return Err(ConfigError::Invalid(
                "keystore.iterations must be at least 1".to_string(),
            ));
        }
        if self.memory_kib < 8 * self.parallelism || self.memory_kib > MAX_KDF_MEMORY_KIB {
            return Err(ConfigError::Invalid(format!(
                "keystore.memory_kib must be within {}..={}, got {}",
                8 * self.parallelism,
                MAX_KDF_MEMORY_KIB,
                self.memory_kib
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TydidsConfig {
    pub limits: OpenLimits,
    pub keystore: KdfSettings,
}

impl TydidsConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Apply `TYDIDS_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let limits = OpenLimitsOverrides {
            max_decode_depth: parse_var(&lookup, ENV_MAX_DECODE_DEPTH)?,
            max_bundle_bytes: parse_var(&lookup, ENV_MAX_BUNDLE_BYTES)?,
        };
        self.limits = self.limits.apply(limits);
        if let Some(memory_kib) = parse_var(&lookup, ENV_KDF_MEMORY_KIB)? {
            self.keystore.memory_kib = memory_kib;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_decode_depth == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_decode_depth must be at least 1".to_string(),
            ));
        }
        if self.limits.max_bundle_bytes == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_bundle_bytes must be at least 1".to_string(),
            ));
        }
        self.keystore.validate()
    }
}

fn parse_var<F, T>(lookup: &F, variable: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(variable) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                variable: variable.to_string(),
                value: raw,
            }),
    }
}
