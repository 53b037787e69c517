//! Host configuration and gas schedule loading.

mod gas_schedule;

pub use gas_schedule::{
    BaseOperationCost, GasSchedule, GasScheduleHandle, HostApiCost, ManagedBufferApiCost,
};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default prefix of storage keys reserved for the host.
pub const DEFAULT_PROTECTED_KEY_PREFIX: &str = "VMHOST";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Limits and switches of one host instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Deepest allowed nesting of contract calls, the top-level call included.
    pub max_call_depth: usize,
    /// Maximum number of live instances within one transaction.
    pub max_instances: usize,
    pub block_gas_limit: u64,
    /// Wall-clock limit of one transaction; 0 disables the limit.
    pub execution_timeout_ms: u64,
    pub protected_key_prefix: String,
    /// Entry points that cannot be called directly.
    pub reserved_functions: Vec<String>,
    /// Warm instances kept per code hash.
    pub instance_pool_capacity: usize,
    /// Builtin function used for token transfers that precede a callback.
    pub esdt_transfer_function: String,
    pub enable_gas_trace: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 10,
            max_instances: 20,
            block_gas_limit: 1_500_000_000,
            execution_timeout_ms: 0,
            protected_key_prefix: DEFAULT_PROTECTED_KEY_PREFIX.to_string(),
            reserved_functions: vec!["init".to_string(), "callBack".to_string()],
            instance_pool_capacity: 4,
            esdt_transfer_function: "ESDTTransfer".to_string(),
            enable_gas_trace: false,
        }
    }
}

impl HostConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: HostConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be at least 1".into()));
        }
        if self.max_instances == 0 {
            return Err(ConfigError::Invalid("max_instances must be at least 1".into()));
        }
        if self.block_gas_limit == 0 {
            return Err(ConfigError::Invalid("block_gas_limit must be positive".into()));
        }
        if self.protected_key_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "protected_key_prefix must not be empty".into(),
            ));
        }
        if self.reserved_functions.iter().any(|name| name.is_empty()) {
            return Err(ConfigError::Invalid(
                "reserved_functions must not contain empty names".into(),
            ));
        }
        Ok(())
    }

    pub fn is_reserved(&self, function: &str) -> bool {
        self.reserved_functions.iter().any(|name| name == function)
    }

    pub fn protected_prefix(&self) -> &[u8] {
        self.protected_key_prefix.as_bytes()
    }
}
