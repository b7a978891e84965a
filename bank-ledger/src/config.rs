//! Configuration for the banking ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Card issuance configuration
    pub cards: CardConfig,

    /// Reference generation configuration
    pub references: ReferenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/bank-ledger"),
            service_name: "bank-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            cards: CardConfig::default(),
            references: ReferenceConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Card issuance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardConfig {
    /// Spending limit applied when the issuance request carries none
    pub default_spending_limit: Decimal,

    /// Years from issuance to expiry
    pub validity_years: u32,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            default_spending_limit: Decimal::new(500000, 2), // 5000.00
            validity_years: 4,
        }
    }
}

/// Reference generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Prefix for transaction references
    pub transaction_prefix: String,

    /// Draw-check-retry attempts before giving up
    ///
    /// Collisions are birthday-bound negligible at these lengths; the cap
    /// exists so a broken randomness source cannot loop forever.
    pub max_attempts: u32,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            transaction_prefix: "TXN".to_string(),
            max_attempts: 64,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("BANK_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(years) = std::env::var("BANK_LEDGER_CARD_VALIDITY_YEARS") {
            config.cards.validity_years = years
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid validity years: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "bank-ledger");
        assert_eq!(config.cards.validity_years, 4);
        assert_eq!(config.cards.default_spending_limit, Decimal::new(500000, 2));
        assert_eq!(config.references.transaction_prefix, "TXN");
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.references.max_attempts, config.references.max_attempts);
        assert_eq!(
            parsed.cards.default_spending_limit,
            config.cards.default_spending_limit
        );
    }
}
