//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub etherscan: EtherscanConfig,
    #[serde(default)]
    pub heuristics: HeuristicsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub exchanges: ExchangesConfig,
}

/// Etherscan API access, pagination and retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct EtherscanConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Transactions per page (Etherscan maximum: 1000)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Hard result-window ceiling; the API refuses deeper pagination
    #[serde(default = "default_pagination_window")]
    pub pagination_window: u32,
    /// Delay between successive page requests
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_contract_timeout_secs")]
    pub contract_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,
}

impl Default for EtherscanConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            page_size: default_page_size(),
            pagination_window: default_pagination_window(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            contract_timeout_secs: default_contract_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_secs: default_retry_max_secs(),
        }
    }
}

/// Clustering heuristic thresholds. Empirically tuned defaults from the
/// reference analysis, overridable per run.
#[derive(Debug, Clone, Deserialize)]
pub struct HeuristicsConfig {
    /// Reject deposits with more distinct senders than this
    #[serde(default = "default_sender_threshold")]
    pub sender_threshold: usize,
    /// Reject deposits with at least this many combined transactions
    #[serde(default = "default_transaction_ceiling")]
    pub transaction_ceiling: usize,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            sender_threshold: default_sender_threshold(),
            transaction_ceiling: default_transaction_ceiling(),
        }
    }
}

/// Clustering engine settings
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Concurrent candidate analyses (1 = serial, the reference behavior)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

/// Known-exchange reference data
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangesConfig {
    /// CSV file with exchange addresses and labels
    #[serde(default = "default_exchange_file")]
    pub file: String,
}

impl Default for ExchangesConfig {
    fn default() -> Self {
        Self {
            file: default_exchange_file(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.etherscan.io/api".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_pagination_window() -> u32 {
    10_000
}

fn default_request_delay_ms() -> u64 {
    550
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_contract_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_secs() -> u64 {
    4
}

fn default_retry_max_secs() -> u64 {
    10
}

fn default_sender_threshold() -> usize {
    1000
}

fn default_transaction_ceiling() -> usize {
    10_000
}

fn default_max_workers() -> usize {
    1
}

fn default_exchange_file() -> String {
    "collected_addresses.csv".to_string()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix CLUSTERSCAN_)
            .add_source(
                config::Environment::with_prefix("CLUSTERSCAN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Bare ETHERSCAN_API_KEY also works, .env friendly
        if config.etherscan.api_key.is_empty() {
            if let Ok(key) = std::env::var("ETHERSCAN_API_KEY") {
                config.etherscan.api_key = key;
            }
        }

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.etherscan.page_size == 0 {
            anyhow::bail!("etherscan.page_size must be at least 1");
        }

        if self.etherscan.pagination_window < self.etherscan.page_size {
            anyhow::bail!(
                "etherscan.pagination_window ({}) cannot be smaller than one page ({})",
                self.etherscan.pagination_window,
                self.etherscan.page_size
            );
        }

        if self.etherscan.max_retries == 0 {
            anyhow::bail!("etherscan.max_retries must be at least 1");
        }

        if self.engine.max_workers == 0 {
            anyhow::bail!("engine.max_workers must be at least 1");
        }

        if self.heuristics.sender_threshold == 0 {
            anyhow::bail!("heuristics.sender_threshold must be at least 1");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            etherscan: EtherscanConfig::default(),
            heuristics: HeuristicsConfig::default(),
            engine: EngineConfig::default(),
            exchanges: ExchangesConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_reference_values() {
        let config = Config::default();
        assert_eq!(config.etherscan.page_size, 1000);
        assert_eq!(config.etherscan.pagination_window, 10_000);
        assert_eq!(config.etherscan.request_delay_ms, 550);
        assert_eq!(config.heuristics.sender_threshold, 1000);
        assert_eq!(config.heuristics.transaction_ceiling, 10_000);
        assert_eq!(config.engine.max_workers, 1);
    }

    #[test]
    fn test_validate_rejects_small_window() {
        let mut config = Config::default();
        config.etherscan.pagination_window = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.engine.max_workers = 0;
        assert!(config.validate().is_err());
    }
}
