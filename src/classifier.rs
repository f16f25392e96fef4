//! Contract classification with a session-scoped memo cache

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::etherscan::ExplorerApi;
use crate::types::Address;

/// Memoized "is this address a smart contract?" predicate.
///
/// The cache is owned by the classifier (one per analysis session), safe for
/// concurrent lookups. A cache-miss race may compute the same verdict twice;
/// repeated lookups of a cached address never hit the network again.
pub struct ContractClassifier {
    api: Arc<dyn ExplorerApi>,
    cache: DashMap<Address, bool>,
}

impl ContractClassifier {
    pub fn new(api: Arc<dyn ExplorerApi>) -> Self {
        Self {
            api,
            cache: DashMap::new(),
        }
    }

    /// True when the explorer reports a verified contract name for the
    /// address. Any lookup failure classifies as contract (fail-closed):
    /// an unverifiable address must not pass as a clustering candidate.
    pub async fn is_contract(&self, address: &Address) -> bool {
        if let Some(cached) = self.cache.get(address) {
            return *cached;
        }

        let verdict = match self.api.contract_name(address).await {
            Ok(Some(name)) => {
                debug!("{} is contract '{}'", address.short(), name);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(
                    "Contract lookup failed for {}, treating as contract: {}",
                    address.short(),
                    e
                );
                true
            }
        };

        self.cache.insert(address.clone(), verdict);
        verdict
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}
