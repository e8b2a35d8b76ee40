// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tap::TapFallible;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::address::normalize_address;
use crate::coin_pool::CoinPool;
use crate::config::GasStationConfig;
use crate::error::{GasStationError, Result};
use crate::metrics::GasStationMetrics;
use crate::policy::PolicyEngine;
use crate::price_cache::PriceCache;
use crate::rpc_client::RpcClient;
use crate::signer::Signer;
use crate::tx_codec::TxCodec;
use crate::types::{Effects, Policy, PoolStats, Reservation};

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Input to `Sponsor::sponsor_transaction`.
pub struct SponsorRequest {
    pub sender: String,
    pub body_bytes: Vec<u8>,
    pub gas_budget: Option<u64>,
    pub policy: Option<Policy>,
}

/// Output of a successful sponsorship.
#[derive(Debug, Clone)]
pub struct SponsoredTransaction {
    pub transaction_bytes_base64: String,
    pub sponsor_signature_base64: String,
    pub gas_budget: u64,
    pub gas_price: u64,
    pub reservation: Reservation,
}

/// Public facade composing `CoinPool`, `PriceCache`, and `PolicyEngine`
/// into `initialize / sponsor_transaction / report_execution / replenish /
/// close / stats`.
pub struct Sponsor {
    rpc: Arc<dyn RpcClient>,
    signer: Arc<dyn Signer>,
    codec: Arc<dyn TxCodec>,
    config: Arc<GasStationConfig>,
    metrics: Arc<GasStationMetrics>,
    coin_pool: Arc<CoinPool>,
    price_cache: Arc<PriceCache>,
    initialized: AtomicBool,
    on_pool_depleted: Option<Arc<dyn Fn(PoolStats) + Send + Sync>>,
}

/// Owns the sponsor plus its background sweep task. Dropping it cancels
/// the task.
pub struct SponsorHandle {
    inner: Arc<Sponsor>,
    _sweep_task: JoinHandle<()>,
    cancel: Option<oneshot::Sender<()>>,
}

impl SponsorHandle {
    pub fn sponsor(&self) -> Arc<Sponsor> {
        self.inner.clone()
    }
}

impl Drop for SponsorHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}

impl Sponsor {
    /// Builds a `Sponsor` against the given collaborators, config, and a
    /// metrics instance already registered (or
    /// `GasStationMetrics::new_for_testing()` for tests/embedders that
    /// don't export metrics).
    pub fn new(
        rpc: Arc<dyn RpcClient>,
        signer: Arc<dyn Signer>,
        codec: Arc<dyn TxCodec>,
        config: Arc<GasStationConfig>,
        metrics: Arc<GasStationMetrics>,
        on_pool_depleted: Option<Arc<dyn Fn(PoolStats) + Send + Sync>>,
    ) -> Arc<Self> {
        let coin_pool = Arc::new(CoinPool::new(config.clone(), metrics.clone()));
        let price_cache = Arc::new(PriceCache::with_epoch_change_hook(
            config.clone(),
            metrics.clone(),
            {
                let coin_pool = coin_pool.clone();
                let rpc = rpc.clone();
                Box::new(move |epoch| {
                    let coin_pool = coin_pool.clone();
                    let rpc = rpc.clone();
                    let epoch = epoch.to_string();
                    tokio::spawn(async move {
                        if let Err(err) = coin_pool.revalidate(rpc.as_ref()).await {
                            warn!(?err, epoch, "pool revalidation after epoch transition failed");
                        }
                    });
                })
            },
        ));
        Arc::new(Self {
            rpc,
            signer,
            codec,
            config,
            metrics,
            coin_pool,
            price_cache,
            initialized: AtomicBool::new(false),
            on_pool_depleted,
        })
    }

    fn require_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GasStationError::NotInitialized)
        }
    }

    /// Runs `CoinPool::initialize` then `PriceCache::refresh` sequentially,
    /// then starts the background sweep task and returns a handle whose
    /// `Drop` cancels it.
    pub async fn initialize(self: Arc<Self>) -> Result<SponsorHandle> {
        self.coin_pool.initialize(self.rpc.as_ref(), self.codec.as_ref(), self.signer.as_ref()).await?;
        self.price_cache.refresh(self.rpc.as_ref()).await?;
        self.initialized.store(true, Ordering::SeqCst);
        info!("sponsor initialized");

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let inner = self.clone();
        let sweep_task = tokio::spawn(async move {
            loop {
                let swept = inner.coin_pool.sweep_expired();
                if !swept.is_empty() {
                    info!(count = swept.len(), "background sweep removed expired reservations");
                }
                tokio::select! {
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
                    _ = &mut cancel_rx => {
                        info!("sponsor sweep task cancelled");
                        break;
                    }
                }
            }
        });

        Ok(SponsorHandle {
            inner: self,
            _sweep_task: sweep_task,
            cancel: Some(cancel_tx),
        })
    }

    /// The central orchestration: validate, price, reserve, build, sign.
    /// Every error after a successful reservation releases it before
    /// propagating -- no failed call leaves a coin reserved.
    #[instrument(skip(self, request))]
    pub async fn sponsor_transaction(&self, request: SponsorRequest) -> Result<SponsoredTransaction> {
        let start = std::time::Instant::now();
        let result = self.sponsor_transaction_inner(request).await;
        self.metrics
            .sponsor_transaction_latency_ms
            .observe(start.elapsed().as_millis() as f64);
        if let Err(err) = &result {
            self.metrics
                .policy_rejections_total
                .with_label_values(&[err.code()])
                .inc();
        }
        result
    }

    async fn sponsor_transaction_inner(&self, request: SponsorRequest) -> Result<SponsoredTransaction> {
        self.require_initialized()?;

        if normalize_address(&request.sender).is_none() {
            return Err(GasStationError::policy_violation(format!(
                "sender {} is not a validly formatted address",
                request.sender
            )));
        }

        let price = self.price_cache.get(self.rpc.as_ref()).await?;

        let parsed_for_policy = self.codec.parse_kind(&request.body_bytes)?;
        if let Some(policy) = &request.policy {
            PolicyEngine::validate(
                policy,
                &request.sender,
                parsed_for_policy.as_ref(),
                &request.body_bytes,
                request.gas_budget.unwrap_or(0),
            )?;
        }

        let Some(reservation) = self.coin_pool.reserve(request.gas_budget) else {
            self.fire_pool_depleted();
            return Err(GasStationError::PoolExhausted);
        };

        let stats_after_reserve = self.coin_pool.stats();
        if stats_after_reserve.available == 0 {
            self.fire_pool_depleted();
        }

        match self.build_and_sign(&request, &reservation, price).await {
            Ok(sponsored) => Ok(sponsored),
            Err(err) => {
                self.coin_pool.release(&reservation.object_id);
                Err(err)
            }
        }
    }

    /// Everything from "reconstruct the transaction" through "sign it",
    /// scoped so the caller always releases the reservation on any error
    /// exit -- including cancellation, since this is a plain `async fn`
    /// whose future, if dropped, simply never runs the release, leaving
    /// that to the caller's `match` arm (which only runs to completion;
    /// true mid-flight cancellation would need a scope guard at the
    /// embedder layer).
    async fn build_and_sign(
        &self,
        request: &SponsorRequest,
        reservation: &Reservation,
        price: u64,
    ) -> Result<SponsoredTransaction> {
        let mut tx = self
            .codec
            .parse_kind(&request.body_bytes)
            .map_err(|_| GasStationError::BuildFailed("could not parse transaction body".to_string()))?;

        let allow_gas_coin_usage = request.policy.as_ref().map(|p| p.allow_gas_coin_usage).unwrap_or(false);
        if !allow_gas_coin_usage {
            let policy = request.policy.clone().unwrap_or_default();
            PolicyEngine::check_gas_coin_drain(&policy, tx.as_ref())?;
        }

        tx.set_sender(&request.sender);
        tx.set_gas_owner(&self.signer.address());
        tx.set_gas_payment(vec![reservation.object_ref.clone()]);
        tx.set_gas_price(price);

        let budget_ceiling = request
            .gas_budget
            .or(request.policy.as_ref().and_then(|p| p.max_budget_per_tx))
            .unwrap_or_else(|| self.config.resolved_default_max_budget());
        tx.set_gas_budget(budget_ceiling);

        let full_bytes = self
            .codec
            .build(tx, self.rpc.as_ref())
            .await
            .tap_err(|err| warn!(?err, "codec build failed"))?;

        let signature = self
            .signer
            .sign(&full_bytes)
            .await
            .map_err(|err| GasStationError::SignFailed(err.to_string()))?;

        let rebuilt = self
            .codec
            .parse_full(&full_bytes)
            .map_err(|_| GasStationError::BuildFailed("could not re-parse built transaction".to_string()))?;
        let final_budget = rebuilt.gas_budget();

        if let Some(policy) = &request.policy {
            if let Some(max) = policy.max_budget_per_tx {
                if final_budget > max {
                    return Err(GasStationError::policy_violation(format!(
                        "final budget {final_budget} exceeds policy max {max}"
                    )));
                }
            }
        }

        Ok(SponsoredTransaction {
            transaction_bytes_base64: base64::engine::general_purpose::STANDARD.encode(&full_bytes),
            sponsor_signature_base64: base64::engine::general_purpose::STANDARD.encode(&signature),
            gas_budget: final_budget,
            gas_price: price,
            reservation: reservation.clone(),
        })
    }

    fn fire_pool_depleted(&self) {
        if let Some(callback) = &self.on_pool_depleted {
            let stats = self.coin_pool.stats();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(stats)));
            if result.is_err() {
                error!("onPoolDepleted callback panicked; ignoring");
            }
        }
    }

    /// Validates effects shape, then delegates to
    /// `CoinPool::update_from_effects`. Idempotent: a coin already
    /// updated/absent is a no-op.
    pub fn report_execution(&self, reservation: &Reservation, effects: &Effects) -> Result<()> {
        if effects.gas_object.object_id.is_empty() {
            return Err(GasStationError::InvalidEffects(
                "effects missing gasObject.reference".to_string(),
            ));
        }
        self.coin_pool.update_from_effects(effects, &reservation.object_id);
        Ok(())
    }

    pub async fn replenish(&self) -> Result<()> {
        self.require_initialized()?;
        self.coin_pool.replenish(self.rpc.as_ref(), self.codec.as_ref(), self.signer.as_ref()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.require_initialized()?;
        self.coin_pool.close(self.rpc.as_ref(), self.codec.as_ref(), self.signer.as_ref()).await
    }

    pub fn stats(&self) -> PoolStats {
        self.coin_pool.stats()
    }
}
