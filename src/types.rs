//! Core domain types shared across the fetch, clustering and funding layers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Wei per ETH (18-decimal fixed point)
pub const WEI_PER_ETH: f64 = 1e18;

/// A canonicalized (lowercase) Ethereum address.
///
/// Every comparison and set membership in the tool operates on this type,
/// so two textual casings of the same address always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Address(String);

impl Address {
    /// Canonicalize a raw string (trim + lowercase). Idempotent.
    pub fn new(raw: &str) -> Self {
        Address(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the standard format: "0x" followed by 40 hex characters.
    pub fn is_valid(&self) -> bool {
        self.0.len() == 42
            && self.0.starts_with("0x")
            && self.0[2..].chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Short prefix for log lines. Explorer data is not guaranteed ASCII,
    /// so truncation must respect char boundaries.
    pub fn short(&self) -> &str {
        self.0.get(..10).unwrap_or(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Address::new(raw)
    }
}

/// A single normal or internal transaction, as returned by the explorer.
///
/// The value stays in wei (`u128`) until a caller asks for ETH, so large
/// values never lose integer precision in transit.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub value_wei: u128,
    /// Unix seconds
    pub timestamp: i64,
}

impl Transaction {
    /// Value converted to ETH
    pub fn value_eth(&self) -> f64 {
        self.value_wei as f64 / WEI_PER_ETH
    }
}

/// A fetched transaction history, possibly truncated by the explorer's
/// pagination window or by retry exhaustion.
#[derive(Debug, Clone, Default)]
pub struct TxHistory {
    pub transactions: Vec<Transaction>,
    /// False when the history is known to be partial
    pub complete: bool,
}

impl TxHistory {
    pub fn empty() -> Self {
        TxHistory {
            transactions: Vec::new(),
            complete: true,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Append another history, AND-ing completeness
    pub fn merge(&mut self, other: TxHistory) {
        self.transactions.extend(other.transactions);
        self.complete &= other.complete;
    }
}

/// Read-only reference data: the known exchange addresses and their
/// display labels. Supplied externally, owned for the analysis session.
#[derive(Debug, Clone, Default)]
pub struct ExchangeSet {
    addresses: HashSet<Address>,
    labels: HashMap<Address, String>,
}

impl ExchangeSet {
    pub fn insert(&mut self, address: Address, label: Option<String>) {
        if let Some(label) = label {
            self.labels.insert(address.clone(), label);
        }
        self.addresses.insert(address);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    /// Display label for an exchange, falling back to the raw address
    pub fn label_for(&self, address: &Address) -> String {
        self.labels
            .get(address)
            .cloned()
            .unwrap_or_else(|| address.to_string())
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Per-sender aggregate accumulated while scanning a deposit's inbound
/// transactions
#[derive(Debug, Clone, Default, Serialize)]
pub struct SenderStats {
    pub count: u64,
    pub total_eth: f64,
}

/// A deposit address accepted as a collection point: more than one distinct
/// sender funded it and it forwarded onward to a known exchange.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub deposit: Address,
    pub exchange: Address,
    /// Senders ranked by descending transaction count
    pub related_users: Vec<Address>,
    pub user_stats: HashMap<Address, SenderStats>,
    pub cluster_size: usize,
    /// False when the underlying history was truncated
    pub complete: bool,
}

/// Aggregate for one known exchange address that paid into a target
#[derive(Debug, Clone, Serialize)]
pub struct FundingSource {
    pub label: String,
    pub count: u64,
    pub values: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    /// Unix seconds of the earliest observed transfer
    pub first_seen: i64,
    /// Unix seconds of the latest observed transfer
    pub last_seen: i64,
}

impl FundingSource {
    pub fn new(label: String, timestamp: i64) -> Self {
        FundingSource {
            label,
            count: 0,
            values: Vec::new(),
            timestamps: Vec::new(),
            first_seen: timestamp,
            last_seen: timestamp,
        }
    }

    /// Record one inbound transfer from this source
    pub fn record(&mut self, value_eth: f64, timestamp: i64) {
        self.count += 1;
        self.values.push(value_eth);
        self.timestamps.push(
            DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        );
        self.first_seen = self.first_seen.min(timestamp);
        self.last_seen = self.last_seen.max(timestamp);
    }

    pub fn total_eth(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn average_eth(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.total_eth() / self.values.len() as f64
        }
    }

    /// Days between the earliest and latest observed transfer
    pub fn span_days(&self) -> i64 {
        (self.last_seen - self.first_seen) / 86_400
    }
}
