use crate::domain::asset::Asset;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Process-scoped shared state for the hosting layer: an asset cache,
/// per-entity locks and a monotonic id counter.
///
/// Mutating operations on a portfolio or strategy must hold its entity
/// lock for their whole duration, so concurrent requests against the
/// same id serialize instead of clobbering each other's snapshots.
#[derive(Default)]
pub struct Registry {
    assets: Mutex<HashMap<String, Arc<Asset>>>,
    portfolio_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    strategy_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    counter: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next value of the shared monotonic counter (used for generated
    /// entity names).
    pub fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn cached_asset(&self, ticker: &str) -> Option<Arc<Asset>> {
        self.assets.lock().expect("asset cache poisoned").get(ticker).cloned()
    }

    pub fn cache_asset(&self, asset: Asset) -> Arc<Asset> {
        let shared = Arc::new(asset);
        self.assets
            .lock()
            .expect("asset cache poisoned")
            .insert(shared.ticker().to_string(), shared.clone());
        shared
    }

    pub fn evict_asset(&self, ticker: &str) {
        self.assets.lock().expect("asset cache poisoned").remove(ticker);
    }

    /// The lock guarding a portfolio id; created on first use.
    pub fn portfolio_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        Self::entity_lock(&self.portfolio_locks, name)
    }

    /// The lock guarding a strategy id; created on first use.
    pub fn strategy_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        Self::entity_lock(&self.strategy_locks, name)
    }

    fn entity_lock(
        locks: &Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
        name: &str,
    ) -> Arc<tokio::sync::Mutex<()>> {
        locks
            .lock()
            .expect("lock map poisoned")
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}
