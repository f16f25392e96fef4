//! Backward analysis: which known exchanges funded a target address
//!
//! The forward engine asks "where does this user's money converge";
//! this module asks the opposite — which recognized exchange wallets paid
//! into the target, with per-source statistics and a time-bucketed
//! activity summary.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{Error, Result};
use crate::fetcher::TransactionFetcher;
use crate::types::{Address, ExchangeSet, FundingSource};

/// Buckets in the textual activity summary
pub const ACTIVITY_SLOTS: usize = 12;

pub struct FundingAnalyzer {
    fetcher: Arc<TransactionFetcher>,
}

impl FundingAnalyzer {
    pub fn new(fetcher: Arc<TransactionFetcher>) -> Self {
        Self { fetcher }
    }

    /// Aggregate every inbound transfer from a known exchange into one
    /// `FundingSource` per sending address.
    pub async fn find_funding_sources(
        &self,
        target_address: &Address,
        exchanges: &ExchangeSet,
    ) -> Result<HashMap<Address, FundingSource>> {
        let target = Address::new(target_address.as_str());
        if !target.is_valid() {
            return Err(Error::InvalidAddress(target.to_string()));
        }

        info!("Fetching transaction history for {}", target);
        let history = self.fetcher.fetch_combined(&target).await;
        if history.is_empty() {
            info!("No transactions found for {}", target);
            return Ok(HashMap::new());
        }
        info!("Found {} total transactions", history.len());

        let mut sources: HashMap<Address, FundingSource> = HashMap::new();
        for tx in &history.transactions {
            if tx.to == target && exchanges.contains(&tx.from) {
                let source = sources.entry(tx.from.clone()).or_insert_with(|| {
                    FundingSource::new(exchanges.label_for(&tx.from), tx.timestamp)
                });
                source.record(tx.value_eth(), tx.timestamp);
            }
        }

        Ok(sources)
    }
}

/// Render a source's timestamps as a fixed-width activity bar.
///
/// The span `[earliest, latest]` is divided into `slots` equal-width
/// buckets; a bucket is marked when at least one timestamp falls in it.
/// All-identical timestamps degenerate to a single leading mark.
pub fn activity_bar(timestamps: &[DateTime<Utc>], slots: usize) -> String {
    if slots == 0 {
        return "|  |".to_string();
    }
    if timestamps.is_empty() {
        return format!("| {} |", " ".repeat(slots));
    }

    let mut seconds: Vec<i64> = timestamps.iter().map(|t| t.timestamp()).collect();
    seconds.sort_unstable();
    let start = seconds[0];
    let end = seconds[seconds.len() - 1];

    if start == end {
        return format!("| {}{} |", '\u{25a0}', " ".repeat(slots - 1));
    }

    let bucket_width = (end - start) as f64 / slots as f64;
    let mut buckets = vec![0usize; slots];
    for ts in seconds {
        let index = (((ts - start) as f64 / bucket_width) as usize).min(slots - 1);
        buckets[index] += 1;
    }

    let bar: String = buckets
        .iter()
        .map(|count| if *count > 0 { '\u{25a0}' } else { ' ' })
        .collect();
    format!("| {} |", bar)
}
