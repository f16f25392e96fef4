//! Clustering engine
//!
//! Derives the candidate deposit set from a user's outgoing transactions and
//! maps the deposit analyzer over it with bounded parallelism. The result
//! set is the same at any concurrency degree; progress reporting and
//! cancellation are side channels that never change what is found.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analyzer::{DepositAnalyzer, DepositOutcome};
use crate::error::{Error, Result};
use crate::fetcher::TransactionFetcher;
use crate::types::{Address, Cluster, ExchangeSet};

/// Completion snapshot emitted after each candidate analysis
#[derive(Debug, Clone, Copy)]
pub struct EngineProgress {
    pub completed: usize,
    pub total: usize,
}

pub struct ClusterEngine {
    fetcher: Arc<TransactionFetcher>,
    analyzer: Arc<DepositAnalyzer>,
    max_workers: usize,
}

impl ClusterEngine {
    pub fn new(
        fetcher: Arc<TransactionFetcher>,
        analyzer: Arc<DepositAnalyzer>,
        max_workers: usize,
    ) -> Self {
        Self {
            fetcher,
            analyzer,
            max_workers: max_workers.max(1),
        }
    }

    /// Find collection clusters among every address the user has ever paid.
    ///
    /// Returns clusters sorted by descending size (ties broken by ascending
    /// deposit address). On cancellation the clusters collected so far are
    /// returned.
    pub async fn cluster_addresses(
        &self,
        user_address: &Address,
        exchanges: &ExchangeSet,
        progress: Option<mpsc::Sender<EngineProgress>>,
        cancel: CancellationToken,
    ) -> Result<Vec<Cluster>> {
        let user = Address::new(user_address.as_str());
        if !user.is_valid() {
            return Err(Error::InvalidAddress(user.to_string()));
        }

        info!("Fetching transaction history for {}", user);
        let history = self.fetcher.fetch_combined(&user).await;
        if history.is_empty() {
            info!("No transactions found for {}", user);
            return Ok(Vec::new());
        }
        info!("Found {} total transactions", history.len());

        // Every distinct recipient the user has paid is a candidate
        let candidates: HashSet<Address> = history
            .transactions
            .iter()
            .filter(|tx| tx.from == user && !tx.to.is_empty())
            .map(|tx| tx.to.clone())
            .collect();

        if candidates.is_empty() {
            info!("No deposit addresses found for {}", user);
            return Ok(Vec::new());
        }

        let total = candidates.len();
        info!(
            "Analyzing {} deposit addresses ({} workers)",
            total, self.max_workers
        );

        let mut outcomes = stream::iter(candidates.into_iter().map(|deposit| {
            let analyzer = Arc::clone(&self.analyzer);
            async move {
                let outcome = analyzer.analyze_deposit(&deposit, exchanges).await;
                (deposit, outcome)
            }
        }))
        .buffer_unordered(self.max_workers);

        let mut clusters = Vec::new();
        let mut completed = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = outcomes.next() => next,
            };
            let Some((deposit, outcome)) = next else { break };

            completed += 1;
            if let Some(tx) = &progress {
                // Observability only; a slow consumer must never stall analysis
                let _ = tx.try_send(EngineProgress { completed, total });
            }

            match outcome {
                DepositOutcome::Cluster(cluster) => {
                    info!(
                        "Found cluster at {} (size {})",
                        cluster.deposit, cluster.cluster_size
                    );
                    clusters.push(cluster);
                }
                DepositOutcome::Rejected(reason) => {
                    debug!("Skipping {}: {}", deposit.short(), reason);
                }
                DepositOutcome::Failed(err) => {
                    // One candidate's failure never aborts its siblings
                    warn!("Analysis failed for {}: {}", deposit.short(), err);
                }
            }
        }

        if cancel.is_cancelled() {
            warn!(
                "Clustering cancelled after {}/{} candidates; returning {} clusters",
                completed,
                total,
                clusters.len()
            );
        }

        clusters.sort_by(|a, b| {
            b.cluster_size
                .cmp(&a.cluster_size)
                .then_with(|| a.deposit.cmp(&b.deposit))
        });

        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ContractClassifier;
    use crate::config::{EtherscanConfig, HeuristicsConfig};
    use crate::etherscan::{ExplorerApi, TxKind};
    use crate::types::Transaction;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ETH: u128 = 1_000_000_000_000_000_000;

    fn a(hex_digit: char) -> Address {
        Address::new(&format!("0x{}", hex_digit.to_string().repeat(40)))
    }

    fn tx(from: &Address, to: &Address, timestamp: i64) -> Transaction {
        Transaction {
            from: from.clone(),
            to: to.clone(),
            value_wei: ETH,
            timestamp,
        }
    }

    #[derive(Default)]
    struct ScriptedApi {
        histories: HashMap<Address, Vec<Transaction>>,
    }

    #[async_trait]
    impl ExplorerApi for ScriptedApi {
        async fn transaction_page(
            &self,
            address: &Address,
            kind: TxKind,
            page: u32,
            _offset: u32,
        ) -> crate::error::Result<Vec<Transaction>> {
            if kind == TxKind::Internal || page > 1 {
                return Ok(Vec::new());
            }
            Ok(self.histories.get(address).cloned().unwrap_or_default())
        }

        async fn contract_name(&self, _address: &Address) -> crate::error::Result<Option<String>> {
            Ok(None)
        }
    }

    fn engine(api: ScriptedApi, max_workers: usize) -> ClusterEngine {
        let api: Arc<dyn ExplorerApi> = Arc::new(api);
        let config = EtherscanConfig {
            request_delay_ms: 0,
            ..EtherscanConfig::default()
        };
        let fetcher = Arc::new(TransactionFetcher::new(api.clone(), &config));
        let analyzer = Arc::new(DepositAnalyzer::new(
            Arc::clone(&fetcher),
            Arc::new(ContractClassifier::new(api)),
            HeuristicsConfig::default(),
        ));
        ClusterEngine::new(fetcher, analyzer, max_workers)
    }

    /// User pays two deposits; deposit 1 clusters with 2 senders, deposit 2
    /// clusters with 3 senders, deposit 3 has no forward.
    fn scripted_world() -> (ScriptedApi, Address, ExchangeSet) {
        let user = a('1');
        let exchange = a('e');
        let (d1, d2, d3) = (a('2'), a('3'), a('4'));
        let (s1, s2, s3) = (a('a'), a('b'), a('c'));

        let mut api = ScriptedApi::default();
        api.histories.insert(
            user.clone(),
            vec![
                tx(&user, &d1, 10),
                tx(&user, &d2, 20),
                tx(&user, &d3, 30),
            ],
        );
        api.histories.insert(
            d1.clone(),
            vec![
                tx(&user, &d1, 10),
                tx(&s1, &d1, 11),
                tx(&d1, &exchange, 12),
            ],
        );
        api.histories.insert(
            d2.clone(),
            vec![
                tx(&user, &d2, 20),
                tx(&s2, &d2, 21),
                tx(&s3, &d2, 22),
                tx(&d2, &exchange, 23),
            ],
        );
        api.histories
            .insert(d3.clone(), vec![tx(&user, &d3, 30), tx(&s1, &d3, 31)]);

        let mut exchanges = ExchangeSet::default();
        exchanges.insert(exchange, Some("TestExchange".to_string()));
        (api, user, exchanges)
    }

    #[tokio::test]
    async fn test_clusters_sorted_by_size() {
        let (api, user, exchanges) = scripted_world();
        let clusters = engine(api, 1)
            .cluster_addresses(&user, &exchanges, None, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].cluster_size, 3);
        assert_eq!(clusters[0].deposit, a('3'));
        assert_eq!(clusters[1].cluster_size, 2);
        assert_eq!(clusters[1].deposit, a('2'));
    }

    #[tokio::test]
    async fn test_concurrency_degree_does_not_change_results() {
        let mut shapes = Vec::new();
        for workers in [1usize, 4, 16] {
            let (api, user, exchanges) = scripted_world();
            let clusters = engine(api, workers)
                .cluster_addresses(&user, &exchanges, None, CancellationToken::new())
                .await
                .unwrap();
            let shape: Vec<(Address, Address, usize)> = clusters
                .into_iter()
                .map(|c| (c.deposit, c.exchange, c.cluster_size))
                .collect();
            shapes.push(shape);
        }
        assert_eq!(shapes[0], shapes[1]);
        assert_eq!(shapes[1], shapes[2]);
    }

    #[tokio::test]
    async fn test_no_history_returns_empty() {
        let api = ScriptedApi::default();
        let exchanges = ExchangeSet::default();
        let clusters = engine(api, 2)
            .cluster_addresses(&a('1'), &exchanges, None, CancellationToken::new())
            .await
            .unwrap();
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_user_address_is_an_error() {
        let api = ScriptedApi::default();
        let exchanges = ExchangeSet::default();
        let result = engine(api, 1)
            .cluster_addresses(
                &Address::new("0xbogus"),
                &exchanges,
                None,
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_progress_reports_every_candidate() {
        let (api, user, exchanges) = scripted_world();
        let (progress_tx, mut progress_rx) = mpsc::channel(16);

        let clusters = engine(api, 2)
            .cluster_addresses(&user, &exchanges, Some(progress_tx), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(clusters.len(), 2);

        let mut last = None;
        while let Ok(update) = progress_rx.try_recv() {
            assert_eq!(update.total, 3);
            last = Some(update);
        }
        assert_eq!(last.unwrap().completed, 3);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_returns_cleanly() {
        let (api, user, exchanges) = scripted_world();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let clusters = engine(api, 1)
            .cluster_addresses(&user, &exchanges, None, cancel)
            .await
            .unwrap();
        // Nothing analyzed, nothing corrupted
        assert!(clusters.is_empty());
    }

    /// Serves scripted histories, but the second candidate's contract
    /// lookup cancels the token and stalls until the run is torn down.
    struct CancellingApi {
        histories: HashMap<Address, Vec<Transaction>>,
        cancel: CancellationToken,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl ExplorerApi for CancellingApi {
        async fn transaction_page(
            &self,
            address: &Address,
            kind: TxKind,
            page: u32,
            _offset: u32,
        ) -> crate::error::Result<Vec<Transaction>> {
            if kind == TxKind::Internal || page > 1 {
                return Ok(Vec::new());
            }
            Ok(self.histories.get(address).cloned().unwrap_or_default())
        }

        async fn contract_name(&self, _address: &Address) -> crate::error::Result<Option<String>> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 1 {
                self.cancel.cancel();
                std::future::pending::<()>().await;
            }
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_mid_run_cancellation_keeps_collected_clusters() {
        let user = a('1');
        let exchange = a('e');
        let (d1, d2) = (a('2'), a('3'));
        let (s1, s2) = (a('a'), a('b'));

        // Both candidates would cluster with two senders each
        let mut histories = HashMap::new();
        histories.insert(user.clone(), vec![tx(&user, &d1, 10), tx(&user, &d2, 20)]);
        histories.insert(
            d1.clone(),
            vec![tx(&user, &d1, 10), tx(&s1, &d1, 11), tx(&d1, &exchange, 12)],
        );
        histories.insert(
            d2.clone(),
            vec![tx(&user, &d2, 20), tx(&s2, &d2, 21), tx(&d2, &exchange, 22)],
        );

        let mut exchanges = ExchangeSet::default();
        exchanges.insert(exchange, Some("TestExchange".to_string()));

        let cancel = CancellationToken::new();
        let api: Arc<dyn ExplorerApi> = Arc::new(CancellingApi {
            histories,
            cancel: cancel.clone(),
            lookups: AtomicUsize::new(0),
        });
        let config = EtherscanConfig {
            request_delay_ms: 0,
            ..EtherscanConfig::default()
        };
        let fetcher = Arc::new(TransactionFetcher::new(Arc::clone(&api), &config));
        let analyzer = Arc::new(DepositAnalyzer::new(
            Arc::clone(&fetcher),
            Arc::new(ContractClassifier::new(api)),
            HeuristicsConfig::default(),
        ));

        let clusters = ClusterEngine::new(fetcher, analyzer, 1)
            .cluster_addresses(&user, &exchanges, None, cancel.clone())
            .await
            .unwrap();

        // The first candidate's cluster survives the cancelled second one
        assert!(cancel.is_cancelled());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].cluster_size, 2);
        assert!(clusters[0].deposit == d1 || clusters[0].deposit == d2);
    }
}
