use crate::{CustodyError, Result};
use primitive_types::H160;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest `decimals` whose scale factor `10^decimals` fits in a U256
pub const MAX_TOKEN_DECIMALS: u8 = 77;

/// Wrapped token metadata used when deploying a fresh factory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub address: H160,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "Wrapped Filecoin".to_string(),
            symbol: "WFIL".to_string(),
            decimals: 18,
            address: H160::from_low_u64_be(0xAA),
        }
    }
}

/// Operator configuration shared by the CLI and the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    pub data_dir: PathBuf,
    pub factory_address: H160,
    pub token: TokenConfig,

    /// Pending requests older than this are reported by the monitor
    pub stale_after_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./custody-data"),
            factory_address: H160::from_low_u64_be(0xF0),
            token: TokenConfig::default(),
            stale_after_secs: 24 * 60 * 60, // one day
            poll_interval_secs: 60,
        }
    }
}

impl CustodyConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&contents).map_err(|e| {
            CustodyError::ConfigError(format!(
                "Failed to parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.factory_address.is_zero() {
            return Err(CustodyError::ConfigError(
                "factory address must not be zero".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(CustodyError::ConfigError(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.token.symbol.is_empty() {
            return Err(CustodyError::ConfigError(
                "token symbol must not be empty".to_string(),
            ));
        }
        if self.token.decimals > MAX_TOKEN_DECIMALS {
            return Err(CustodyError::ConfigError(format!(
                "token decimals must be at most {}, got {}",
                MAX_TOKEN_DECIMALS, self.token.decimals
            )));
        }
        Ok(())
    }

    /// RocksDB directory for the factory store
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("factory")
    }
}
