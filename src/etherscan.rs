//! Etherscan API client
//!
//! The only module that talks HTTP. Everything above consumes the
//! `ExplorerApi` trait, which keeps the fetcher, classifier and engine
//! testable without a network.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::EtherscanConfig;
use crate::error::{Error, Result};
use crate::retry::{with_retries, RetryPolicy};
use crate::types::{Address, Transaction};

/// Explorer response for "no transactions found"; success with empty result
const NO_TRANSACTIONS: &str = "No transactions found";

/// Which transaction list to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    Normal,
    Internal,
}

impl TxKind {
    pub fn action(&self) -> &'static str {
        match self {
            TxKind::Normal => "normal-transaction-list",
            TxKind::Internal => "internal-transaction-list",
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxKind::Normal => write!(f, "normal"),
            TxKind::Internal => write!(f, "internal"),
        }
    }
}

/// Low-level explorer operations
#[async_trait]
pub trait ExplorerApi: Send + Sync {
    /// Fetch one page of an address's transaction history, ascending by
    /// time. An address with no history yields an empty page.
    async fn transaction_page(
        &self,
        address: &Address,
        kind: TxKind,
        page: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>>;

    /// Look up the verified contract name for an address, if any
    async fn contract_name(&self, address: &Address) -> Result<Option<String>>;
}

/// Standard Etherscan JSON envelope
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
    #[serde(rename = "timeStamp", default)]
    time_stamp: String,
}

impl RawTransaction {
    fn into_transaction(self) -> Transaction {
        Transaction {
            from: Address::new(&self.from),
            to: Address::new(&self.to),
            // Wei values can exceed u64; parse the decimal string as u128
            value_wei: self.value.trim().parse().unwrap_or(0),
            timestamp: self.time_stamp.trim().parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContractSource {
    #[serde(rename = "ContractName", default)]
    contract_name: String,
}

/// HTTP client for the Etherscan API
pub struct EtherscanClient {
    client: Client,
    config: EtherscanConfig,
    retry: RetryPolicy,
}

impl EtherscanClient {
    pub fn new(config: &EtherscanConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy::from_config(config),
            config: config.clone(),
        })
    }

    async fn get_envelope(&self, params: &[(&str, &str)], timeout: Duration) -> Result<ApiEnvelope> {
        let response = self
            .client
            .get(&self.config.api_url)
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(timeout.as_secs())
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::Http(format!("HTTP {}", response.status())));
        }

        response
            .json::<ApiEnvelope>()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid API response: {}", e)))
    }

    /// One unretried page request
    async fn transaction_page_once(
        &self,
        address: &Address,
        kind: TxKind,
        page: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>> {
        let page_param = page.to_string();
        let offset_param = offset.to_string();
        let params = [
            ("module", "account"),
            ("action", kind.action()),
            ("address", address.as_str()),
            ("sort", "asc"),
            ("apikey", self.config.api_key.as_str()),
            ("offset", offset_param.as_str()),
            ("page", page_param.as_str()),
        ];

        debug!("Fetching {} transactions for {} (page {})", kind, address.short(), page);

        let envelope = self
            .get_envelope(&params, Duration::from_secs(self.config.timeout_secs))
            .await?;

        if envelope.status != "1" {
            if envelope.message == NO_TRANSACTIONS {
                return Ok(Vec::new());
            }
            return Err(Error::Api(format!(
                "{} ({} page {}): {}",
                envelope.message,
                kind.action(),
                page,
                address.short()
            )));
        }

        let raw: Vec<RawTransaction> = serde_json::from_value(envelope.result)
            .map_err(|e| Error::Serialization(format!("Malformed transaction list: {}", e)))?;

        Ok(raw.into_iter().map(RawTransaction::into_transaction).collect())
    }
}

#[async_trait]
impl ExplorerApi for EtherscanClient {
    async fn transaction_page(
        &self,
        address: &Address,
        kind: TxKind,
        page: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>> {
        with_retries(&self.retry, || {
            self.transaction_page_once(address, kind, page, offset)
        })
        .await
    }

    async fn contract_name(&self, address: &Address) -> Result<Option<String>> {
        let params = [
            ("module", "contract"),
            ("action", "source-lookup"),
            ("address", address.as_str()),
            ("apikey", self.config.api_key.as_str()),
        ];

        debug!("Looking up contract source for {}", address.short());

        let envelope = self
            .get_envelope(
                &params,
                Duration::from_secs(self.config.contract_timeout_secs),
            )
            .await?;

        if envelope.status != "1" {
            return Err(Error::Api(format!(
                "Contract lookup failed for {}: {}",
                address.short(),
                envelope.message
            )));
        }

        let sources: Vec<ContractSource> = serde_json::from_value(envelope.result)
            .map_err(|e| Error::Serialization(format!("Malformed contract metadata: {}", e)))?;

        Ok(sources
            .into_iter()
            .next()
            .map(|s| s.contract_name)
            .filter(|name| !name.is_empty()))
    }
}
