//! Deposit address heuristics
//!
//! Decides whether a candidate deposit address is a collection point:
//! multiple independent senders funding one address that forwards onward to
//! a known exchange. Every rejection is typed so batch callers can tell a
//! heuristic "no cluster here" from a genuine failure.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::classifier::ContractClassifier;
use crate::config::HeuristicsConfig;
use crate::fetcher::TransactionFetcher;
use crate::types::{Address, Cluster, ExchangeSet, SenderStats};

/// Why a candidate was rejected (a normal outcome, not an error)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Smart contract that is not a known exchange wallet
    ContractAddress,
    /// Empty candidate address
    EmptyAddress,
    /// Combined transaction count at or above the ceiling; high-volume
    /// service, not a personal deposit address
    TransactionCeiling(usize),
    /// More distinct senders than the threshold allows
    TooManySenders(usize),
    /// Never forwarded funds to a known exchange
    NoExchangeForward,
    /// Only one distinct sender; no convergence evidence
    SingleSender,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ContractAddress => write!(f, "contract address"),
            RejectReason::EmptyAddress => write!(f, "empty address"),
            RejectReason::TransactionCeiling(n) => {
                write!(f, "{} transactions, likely a service", n)
            }
            RejectReason::TooManySenders(n) => write!(f, "{} unique senders", n),
            RejectReason::NoExchangeForward => write!(f, "no forward to a known exchange"),
            RejectReason::SingleSender => write!(f, "single funding source"),
        }
    }
}

/// Outcome of analyzing one candidate
#[derive(Debug, Clone)]
pub enum DepositOutcome {
    /// Candidate accepted
    Cluster(Cluster),
    /// Heuristic rejection
    Rejected(RejectReason),
    /// Hard failure (validation), distinct from a heuristic skip
    Failed(String),
}

impl DepositOutcome {
    pub fn into_cluster(self) -> Option<Cluster> {
        match self {
            DepositOutcome::Cluster(cluster) => Some(cluster),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, DepositOutcome::Rejected(_))
    }
}

pub struct DepositAnalyzer {
    fetcher: Arc<TransactionFetcher>,
    classifier: Arc<ContractClassifier>,
    heuristics: HeuristicsConfig,
}

impl DepositAnalyzer {
    pub fn new(
        fetcher: Arc<TransactionFetcher>,
        classifier: Arc<ContractClassifier>,
        heuristics: HeuristicsConfig,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            heuristics,
        }
    }

    /// Apply the clustering heuristics to one candidate, short-circuiting
    /// on the first applicable rejection.
    pub async fn analyze_deposit(
        &self,
        deposit: &Address,
        exchanges: &ExchangeSet,
    ) -> DepositOutcome {
        if deposit.is_empty() {
            return DepositOutcome::Rejected(RejectReason::EmptyAddress);
        }
        if !deposit.is_valid() {
            return DepositOutcome::Failed(format!("malformed address: {}", deposit));
        }

        // Known exchange deposit contracts are exempt from the contract gate
        if !exchanges.contains(deposit) && self.classifier.is_contract(deposit).await {
            debug!("Skipping contract address {}", deposit.short());
            return DepositOutcome::Rejected(RejectReason::ContractAddress);
        }

        let history = self.fetcher.fetch_combined(deposit).await;
        let transactions = &history.transactions;

        if transactions.len() >= self.heuristics.transaction_ceiling {
            return DepositOutcome::Rejected(RejectReason::TransactionCeiling(transactions.len()));
        }

        // Real inbound deposits only: not from exchanges, not from itself
        let mut sender_stats: HashMap<Address, SenderStats> = HashMap::new();
        for tx in transactions {
            if tx.to == *deposit && !exchanges.contains(&tx.from) && tx.from != *deposit {
                let stats = sender_stats.entry(tx.from.clone()).or_default();
                stats.count += 1;
                stats.total_eth += tx.value_eth();
            }
        }

        if sender_stats.len() > self.heuristics.sender_threshold {
            return DepositOutcome::Rejected(RejectReason::TooManySenders(sender_stats.len()));
        }

        // Earliest forward wins; transactions are in ascending time order
        let forwarded_to_exchange = transactions
            .iter()
            .find(|tx| tx.from == *deposit && exchanges.contains(&tx.to))
            .map(|tx| tx.to.clone());

        let Some(exchange) = forwarded_to_exchange else {
            return DepositOutcome::Rejected(RejectReason::NoExchangeForward);
        };

        // A cluster needs at least two independent funding sources
        if sender_stats.len() < 2 {
            return DepositOutcome::Rejected(RejectReason::SingleSender);
        }

        let mut ranked: Vec<(&Address, u64)> = sender_stats
            .iter()
            .map(|(address, stats)| (address, stats.count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let related_users: Vec<Address> = ranked.into_iter().map(|(a, _)| a.clone()).collect();
        let cluster_size = sender_stats.len();

        DepositOutcome::Cluster(Cluster {
            deposit: deposit.clone(),
            exchange,
            related_users,
            user_stats: sender_stats,
            cluster_size,
            complete: history.complete,
        })
    }
}
