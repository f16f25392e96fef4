//! Paginated, rate-limited transaction history retrieval
//!
//! Wraps `ExplorerApi` page requests into full histories. Two hard rules:
//! never request a page beyond the explorer's result window, and never turn
//! a mid-history failure into a hard error — return what was fetched and
//! mark the history incomplete.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::EtherscanConfig;
use crate::etherscan::{ExplorerApi, TxKind};
use crate::types::{Address, TxHistory};

pub struct TransactionFetcher {
    api: Arc<dyn ExplorerApi>,
    page_size: u32,
    pagination_window: u32,
    request_delay: Duration,
}

impl TransactionFetcher {
    pub fn new(api: Arc<dyn ExplorerApi>, config: &EtherscanConfig) -> Self {
        Self {
            api,
            page_size: config.page_size,
            pagination_window: config.pagination_window,
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Fetch the full history of one kind for an address.
    ///
    /// Pagination continues while pages come back full and the next page
    /// still fits inside the result window. A window overflow or exhausted
    /// retries ends the fetch with `complete = false`.
    pub async fn fetch_history(&self, address: &Address, kind: TxKind) -> TxHistory {
        let mut history = TxHistory::empty();
        let mut page = 1u32;

        loop {
            if page * self.page_size > self.pagination_window {
                warn!(
                    "Pagination window reached for {} ({}), returning partial history",
                    address.short(),
                    kind
                );
                history.complete = false;
                break;
            }

            let transactions = match self.api.transaction_page(address, kind, page, self.page_size).await {
                Ok(transactions) => transactions,
                Err(e) => {
                    warn!(
                        "Stopping {} fetch for {} at page {}: {}",
                        kind,
                        address.short(),
                        page,
                        e
                    );
                    history.complete = false;
                    break;
                }
            };

            // Upstream rate limit applies after every request, including the last
            sleep(self.request_delay).await;

            let full_page = transactions.len() as u32 >= self.page_size;
            history.transactions.extend(transactions);

            if !full_page {
                break;
            }
            page += 1;
        }

        debug!(
            "Fetched {} {} transactions for {} (complete: {})",
            history.len(),
            kind,
            address.short(),
            history.complete
        );
        history
    }

    /// Normal plus internal history, concatenated in fetch order
    pub async fn fetch_combined(&self, address: &Address) -> TxHistory {
        let mut history = self.fetch_history(address, TxKind::Normal).await;
        let internal = self.fetch_history(address, TxKind::Internal).await;
        history.merge(internal);
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::types::Transaction;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tx(n: u32) -> Transaction {
        Transaction {
            from: Address::new("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            to: Address::new("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
            value_wei: 1,
            timestamp: n as i64,
        }
    }

    /// Serves `full_pages` pages of `page_size` items, then `tail` items
    struct PagedApi {
        full_pages: u32,
        tail: u32,
        requests: AtomicU32,
        fail_from_page: Option<u32>,
    }

    impl PagedApi {
        fn new(full_pages: u32, tail: u32) -> Self {
            Self {
                full_pages,
                tail,
                requests: AtomicU32::new(0),
                fail_from_page: None,
            }
        }
    }

    #[async_trait]
    impl ExplorerApi for PagedApi {
        async fn transaction_page(
            &self,
            _address: &Address,
            kind: TxKind,
            page: u32,
            offset: u32,
        ) -> Result<Vec<Transaction>> {
            // Internal history stays empty so fetch_combined tests stay simple
            if kind == TxKind::Internal {
                return Ok(Vec::new());
            }
            self.requests.fetch_add(1, Ordering::SeqCst);
            if let Some(fail_from) = self.fail_from_page {
                if page >= fail_from {
                    return Err(Error::Api("rate limited".to_string()));
                }
            }
            let count = if page <= self.full_pages { offset } else { self.tail };
            Ok((0..count).map(tx).collect())
        }

        async fn contract_name(&self, _address: &Address) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn fetcher(api: Arc<dyn ExplorerApi>) -> TransactionFetcher {
        let config = EtherscanConfig {
            request_delay_ms: 0,
            ..EtherscanConfig::default()
        };
        TransactionFetcher::new(api, &config)
    }

    fn addr() -> Address {
        Address::new("0xcccccccccccccccccccccccccccccccccccccccc")
    }

    #[tokio::test]
    async fn test_short_history_single_page() {
        let api = Arc::new(PagedApi::new(0, 42));
        let fetcher = fetcher(api.clone());

        let history = fetcher.fetch_history(&addr(), TxKind::Normal).await;
        assert_eq!(history.len(), 42);
        assert!(history.complete);
        assert_eq!(api.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pagination_stops_at_partial_page() {
        // 9 full pages then 500: 9500 transactions over 10 requests
        let api = Arc::new(PagedApi::new(9, 500));
        let fetcher = fetcher(api.clone());

        let history = fetcher.fetch_history(&addr(), TxKind::Normal).await;
        assert_eq!(history.len(), 9_500);
        assert!(history.complete);
        assert_eq!(api.requests.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_pagination_window_never_exceeded() {
        // Every page full: the fetcher must stop after page 10 (10 * 1000)
        // and never issue an 11th request
        let api = Arc::new(PagedApi::new(u32::MAX, 0));
        let fetcher = fetcher(api.clone());

        let history = fetcher.fetch_history(&addr(), TxKind::Normal).await;
        assert_eq!(history.len(), 10_000);
        assert!(!history.complete);
        assert_eq!(api.requests.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_mid_history_failure_degrades_to_partial() {
        let mut api = PagedApi::new(9, 500);
        api.fail_from_page = Some(3);
        let api = Arc::new(api);
        let fetcher = fetcher(api.clone());

        let history = fetcher.fetch_history(&addr(), TxKind::Normal).await;
        assert_eq!(history.len(), 2_000);
        assert!(!history.complete);
    }

    #[tokio::test]
    async fn test_combined_merges_normal_and_internal() {
        let api = Arc::new(PagedApi::new(0, 7));
        let fetcher = fetcher(api);

        let history = fetcher.fetch_combined(&addr()).await;
        assert_eq!(history.len(), 7);
        assert!(history.complete);
    }
}
