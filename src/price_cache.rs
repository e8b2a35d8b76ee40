// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::GasStationConfig;
use crate::error::Result;
use crate::metrics::GasStationMetrics;
use crate::rpc_client::RpcClient;

#[derive(Debug, Clone)]
struct PriceCacheEntry {
    price: u64,
    epoch: String,
    expiration_ms: i64,
    fetched_at_ms: i64,
}

struct State {
    entry: Option<PriceCacheEntry>,
    needs_revalidation: bool,
}

/// Caches the network's reference fee price with an epoch-boundary-aware
/// expiry. Wrapped in a `tokio::sync::Mutex` (not `parking_lot`) because
/// `get` may `.await` a refresh while holding the decision to refresh,
/// which avoids a thundering herd of concurrent refreshes right at an
/// epoch boundary -- a sync mutex guard cannot be held across an `.await`.
pub struct PriceCache {
    state: AsyncMutex<State>,
    config: Arc<GasStationConfig>,
    metrics: Arc<GasStationMetrics>,
    on_epoch_change: Box<dyn Fn(&str) + Send + Sync>,
}

impl PriceCache {
    pub fn new(config: Arc<GasStationConfig>, metrics: Arc<GasStationMetrics>) -> Self {
        Self::with_epoch_change_hook(config, metrics, Box::new(|_epoch| {}))
    }

    /// `on_epoch_change` fires (synchronously, best-effort) whenever a
    /// refresh observes a new epoch -- `Sponsor` wires this to trigger a
    /// `CoinPool::revalidate`.
    pub fn with_epoch_change_hook(
        config: Arc<GasStationConfig>,
        metrics: Arc<GasStationMetrics>,
        on_epoch_change: Box<dyn Fn(&str) + Send + Sync>,
    ) -> Self {
        Self {
            state: AsyncMutex::new(State {
                entry: None,
                needs_revalidation: false,
            }),
            config,
            metrics,
            on_epoch_change,
        }
    }

    /// Returns the current reference price, suspending for up to
    /// `max_boundary_wait_ms` if called within `epoch_boundary_window_ms`
    /// of the cached entry's expiration.
    pub async fn get(&self, rpc: &dyn RpcClient) -> Result<u64> {
        let mut guard = self.state.lock().await;

        if guard.needs_revalidation {
            if let Err(err) = self.refresh_locked(&mut guard, rpc).await {
                warn!(?err, "opportunistic price cache revalidation failed again; will retry later");
            } else {
                guard.needs_revalidation = false;
            }
        }

        let now = now_ms();
        if let Some(entry) = &guard.entry {
            let boundary = self.config.epoch_boundary_window_ms;
            if now < entry.expiration_ms - boundary {
                return Ok(entry.price);
            }
            let wait_ms = (entry.expiration_ms + boundary - now).max(1_000);
            let wait_ms = wait_ms.min(self.config.max_boundary_wait_ms);
            debug!(wait_ms, "suspending across epoch boundary before refresh");
            drop(guard);
            tokio::time::sleep(std::time::Duration::from_millis(wait_ms as u64)).await;
            let mut guard = self.state.lock().await;
            return self.refresh_locked(&mut guard, rpc).await;
        }

        self.refresh_locked(&mut guard, rpc).await
    }

    /// Unconditionally fetches current system state and replaces the
    /// cached entry. If the epoch differs from the previous cached
    /// epoch, fires the epoch-change hook; a hook failure only sets
    /// `needs_revalidation` rather than propagating.
    pub async fn refresh(&self, rpc: &dyn RpcClient) -> Result<u64> {
        let mut guard = self.state.lock().await;
        self.refresh_locked(&mut guard, rpc).await
    }

    async fn refresh_locked(&self, guard: &mut State, rpc: &dyn RpcClient) -> Result<u64> {
        let system_state = rpc
            .current_system_state()
            .await
            .map_err(crate::error::GasStationError::Other)?;

        let previous_epoch = guard.entry.as_ref().map(|e| e.epoch.clone());
        let entry = PriceCacheEntry {
            price: system_state.reference_gas_price,
            epoch: system_state.epoch.clone(),
            expiration_ms: system_state.epoch_start_ms + system_state.epoch_duration_ms,
            fetched_at_ms: now_ms(),
        };
        let price = entry.price;
        let epoch_changed = previous_epoch.as_deref() != Some(entry.epoch.as_str());
        guard.entry = Some(entry);
        self.metrics.price_cache_refresh_total.inc();

        if epoch_changed && previous_epoch.is_some() {
            self.metrics.epoch_transitions_total.inc();
            info!(epoch = %system_state.epoch, "epoch transition detected");
            let epoch = system_state.epoch.clone();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                (self.on_epoch_change)(&epoch);
            }));
            if result.is_err() {
                warn!("epoch-change hook panicked; deferring revalidation to next get()");
                guard.needs_revalidation = true;
            }
        }

        Ok(price)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
