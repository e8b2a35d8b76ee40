// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tap::TapFallible;
use tracing::{debug, info, instrument, warn};

use crate::config::GasStationConfig;
use crate::error::{GasStationError, Result};
use crate::metrics::GasStationMetrics;
use crate::rpc_client::RpcClient;
use crate::signer::Signer;
use crate::tx_codec::{Argument, Command, TxCodec};
use crate::types::{CoinEntry, CoinStatus, Effects, ObjectId, ObjectRef, PoolStats, Reservation};

/// Owns the set of fee coins and issues short-lived reservations against
/// them. Mutating operations (`reserve`, `release`, `update_from_effects`,
/// `sweep_expired`, `revalidate`) each take `inner`'s lock for one
/// synchronous scan; network-backed operations (`initialize`, `replenish`,
/// `close`, `revalidate`'s fetch) do their I/O before taking the lock only
/// for the map mutation, so a slow RPC call never blocks a concurrent
/// `reserve`.
pub struct CoinPool {
    inner: Arc<Mutex<IndexMap<ObjectId, CoinEntry>>>,
    config: Arc<GasStationConfig>,
    metrics: Arc<GasStationMetrics>,
}

impl CoinPool {
    pub fn new(config: Arc<GasStationConfig>, metrics: Arc<GasStationMetrics>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(IndexMap::new())),
            config,
            metrics,
        }
    }

    /// Inserts entries directly, bypassing chain I/O. Exists for
    /// integration tests that need a pool seeded with known balances
    /// without a fake RPC round-trip.
    #[cfg(feature = "test-util")]
    pub fn seed_for_test(&self, entries: impl IntoIterator<Item = CoinEntry>) {
        let mut guard = self.inner.lock();
        for entry in entries {
            guard.insert(entry.object_id().clone(), entry);
        }
        self.publish_gauges(&guard);
    }

    fn publish_gauges(&self, entries: &IndexMap<ObjectId, CoinEntry>) {
        let (available, reserved, total_balance) = scan(entries);
        self.metrics.pool_total_coins.set(entries.len() as i64);
        self.metrics.pool_available_coins.set(available as i64);
        self.metrics.pool_reserved_coins.set(reserved as i64);
        self.metrics.pool_total_balance.set(total_balance as i64);
    }

    /// Destructive: clears all entries, then repopulates from the
    /// sponsor's on-chain coin set. Must not run concurrently with
    /// sponsorship -- it discards reserved state.
    #[instrument(skip(self, rpc, codec, signer))]
    pub async fn initialize(&self, rpc: &dyn RpcClient, codec: &dyn TxCodec, signer: &dyn Signer) -> Result<()> {
        let owner = signer.address();
        let fresh = self.collect_on_chain_coins(rpc, codec, signer, &owner, &[]).await?;
        if fresh.is_empty() {
            return Err(GasStationError::InsufficientFunds(
                "no usable or source coins found for owner".to_string(),
            ));
        }
        let mut entries = self.inner.lock();
        entries.clear();
        for entry in fresh {
            entries.insert(entry.object_id().clone(), entry);
        }
        self.publish_gauges(&entries);
        info!(count = entries.len(), "coin pool initialized");
        Ok(())
    }

    /// Non-destructive: adds up to `target_pool_size - total` new entries,
    /// skipping objectIds already tracked. Splits only if still short
    /// after admitting usable new coins.
    #[instrument(skip(self, rpc, codec, signer))]
    pub async fn replenish(&self, rpc: &dyn RpcClient, codec: &dyn TxCodec, signer: &dyn Signer) -> Result<()> {
        let owner = signer.address();
        let known: Vec<ObjectId> = { self.inner.lock().keys().cloned().collect() };
        let fresh = self.collect_on_chain_coins(rpc, codec, signer, &owner, &known).await?;

        let mut entries = self.inner.lock();
        let added = fresh.len();
        for entry in fresh {
            entries.entry(entry.object_id().clone()).or_insert(entry);
        }
        self.publish_gauges(&entries);
        self.metrics.coins_replenished_total.inc_by(added as u64);
        info!(added, total = entries.len(), "coin pool replenished");
        Ok(())
    }

    /// Shared by `initialize` (known = empty) and `replenish` (known =
    /// existing objectIds to skip). Paginates list-coins, partitions by
    /// balance, admits usable coins up to the remaining headroom, and
    /// splits from source coins if still short.
    async fn collect_on_chain_coins(
        &self,
        rpc: &dyn RpcClient,
        codec: &dyn TxCodec,
        signer: &dyn Signer,
        owner: &str,
        known: &[ObjectId],
    ) -> Result<Vec<CoinEntry>> {
        let min = self.config.min_coin_balance;
        let target = self.config.target_coin_balance;
        let remaining_headroom = {
            let total_existing = if known.is_empty() { 0 } else { known.len() };
            self.config.target_pool_size.saturating_sub(total_existing)
        };

        let mut usable: Vec<CoinEntry> = Vec::new();
        let mut source: Vec<ObjectRef> = Vec::new();
        let mut cursor = None;
        loop {
            let page = rpc
                .list_coins(owner, cursor.clone())
                .await
                .tap_err(|err| warn!(?err, "list_coins failed"))?;
            for coin in page.data {
                if known.contains(&coin.object_ref.object_id) {
                    continue;
                }
                let balance = coin.balance;
                if balance < min {
                    continue;
                } else if balance <= 2 * target {
                    usable.push(CoinEntry::new_available(coin.object_ref, balance));
                } else {
                    source.push(coin.object_ref);
                }
            }
            cursor = page.next_cursor;
            if !page.has_more {
                break;
            }
        }

        if usable.is_empty() && source.is_empty() {
            return Err(GasStationError::InsufficientFunds(format!(
                "owner {owner} has no coins above the dust threshold"
            )));
        }

        let admitted = usable.len().min(remaining_headroom);
        usable.truncate(admitted);

        let shortfall = remaining_headroom.saturating_sub(admitted);
        if shortfall > 0 && !source.is_empty() {
            let split = self
                .split_from_source(rpc, codec, signer, owner, &source, shortfall, target)
                .await?;
            usable.extend(split);
        }

        Ok(usable)
    }

    /// Issues a single split transaction: source coins pay gas, the
    /// implicit gas coin is split into `n` pieces of `target` balance,
    /// the pieces are transferred back to `owner`. Parses the effects'
    /// `created` list into fresh pool entries.
    async fn split_from_source(
        &self,
        rpc: &dyn RpcClient,
        codec: &dyn TxCodec,
        signer: &dyn Signer,
        owner: &str,
        source: &[ObjectRef],
        n: usize,
        target: u64,
    ) -> Result<Vec<CoinEntry>> {
        let amounts: Vec<Argument> = (0..n).map(|i| Argument::Input(i as u16)).collect();
        let inputs: Vec<ObjectRef> = (0..n).map(|_| ObjectRef::default()).collect();
        let split_results: Vec<Argument> = (0..n as u16).map(|i| Argument::NestedResult(0, i)).collect();

        let commands = vec![
            Command::SplitCoins {
                coin: Argument::GasCoin,
                amounts,
            },
            Command::TransferObjects {
                objects: split_results,
                address: Argument::Input(n as u16),
            },
        ];
        let mut all_inputs = inputs;
        all_inputs.push(ObjectRef {
            object_id: owner.to_string(),
            version: 0,
            digest: String::new(),
        });

        let mut tx = codec.build_transaction(owner, all_inputs, commands);
        tx.set_sender(owner);
        tx.set_gas_owner(owner);
        tx.set_gas_payment(source.to_vec());
        let system_state = rpc
            .current_system_state()
            .await
            .map_err(GasStationError::Other)?;
        tx.set_gas_price(system_state.reference_gas_price);
        tx.set_gas_budget(target);

        let bytes = codec.build(tx, rpc).await?;
        let signature = signer
            .sign(&bytes)
            .await
            .map_err(|err| GasStationError::SignFailed(err.to_string()))?;
        let result = rpc
            .submit_transaction(&bytes, &[signature])
            .await
            .map_err(GasStationError::Other)?;

        if result.effects.created.is_empty() {
            return Err(GasStationError::InsufficientFunds(
                "split transaction produced no new coins".to_string(),
            ));
        }
        Ok(result
            .effects
            .created
            .into_iter()
            .map(|object_ref| CoinEntry::new_available(object_ref, target))
            .collect())
    }

    /// Sweeps expired reservations, then returns the first Available
    /// entry whose balance >= `min_balance` (defaulting to
    /// `min_coin_balance`), marking it Reserved and returning a snapshot.
    #[instrument(skip(self))]
    pub fn reserve(&self, min_balance: Option<u64>) -> Option<Reservation> {
        let started = tokio::time::Instant::now();
        self.sweep_expired();
        let floor = min_balance.unwrap_or(self.config.min_coin_balance);

        let mut entries = self.inner.lock();
        let found = entries
            .iter()
            .find(|(_, e)| e.status == CoinStatus::Available && e.balance >= floor)
            .map(|(id, _)| id.clone());

        let result = found.map(|id| {
            let entry = entries.get_mut(&id).expect("found entry must exist");
            entry.status = CoinStatus::Reserved;
            entry.reserved_at_instant = Some(tokio::time::Instant::now());
            let reserved_at_ms = chrono::Utc::now().timestamp_millis();
            entry.reserved_at_ms = Some(reserved_at_ms);
            Reservation {
                object_id: id,
                reserved_at: reserved_at_ms,
                object_ref: entry.object_ref.clone(),
                balance: entry.balance,
            }
        });
        self.publish_gauges(&entries);
        if result.is_none() {
            debug!("reserve found no eligible coin");
        }
        self.metrics
            .reserve_latency_ms
            .observe(started.elapsed().as_secs_f64() * 1_000.0);
        result
    }

    /// Idempotent: flips a Reserved entry back to Available. No-op if the
    /// entry is missing or already Available.
    pub fn release(&self, object_id: &str) {
        let mut entries = self.inner.lock();
        if let Some(entry) = entries.get_mut(object_id) {
            if entry.status == CoinStatus::Reserved {
                entry.status = CoinStatus::Available;
                entry.reserved_at_instant = None;
                entry.reserved_at_ms = None;
            }
        }
        self.publish_gauges(&entries);
    }

    /// Applies post-execution effects to the entry matching `object_id`.
    /// Identity mismatch against `effects.gas_object` deletes the entry
    /// (its on-chain state is now unknown); otherwise applies the
    /// consumed-fee arithmetic and either updates or removes the entry.
    #[instrument(skip(self, effects))]
    pub fn update_from_effects(&self, effects: &Effects, object_id: &str) {
        let mut entries = self.inner.lock();
        let Some(entry) = entries.get(object_id) else {
            return;
        };
        if effects.gas_object.object_id != *object_id {
            warn!(
                object_id,
                reported = %effects.gas_object.object_id,
                "reportExecution effects reference a different coin; dropping entry"
            );
            entries.shift_remove(object_id);
            self.publish_gauges(&entries);
            return;
        }

        let consumed = effects.gas_used.net_gas_usage();
        let new_balance = (entry.balance as i64 - consumed).max(0) as u64;

        if new_balance >= self.config.min_coin_balance {
            let entry = entries.get_mut(object_id).expect("checked above");
            entry.object_ref = effects.gas_object.clone();
            entry.balance = new_balance;
            entry.status = CoinStatus::Available;
            entry.reserved_at_instant = None;
            entry.reserved_at_ms = None;
        } else {
            entries.shift_remove(object_id);
        }
        self.publish_gauges(&entries);
    }

    /// Deletes (does not recycle) every Reserved entry whose reservation
    /// has exceeded `reservation_timeout_ms`, measured against `now`.
    fn sweep_expired_at(&self, now: tokio::time::Instant) -> Vec<ObjectId> {
        let timeout = std::time::Duration::from_millis(self.config.reservation_timeout_ms.max(0) as u64);
        let mut entries = self.inner.lock();
        let expired: Vec<ObjectId> = entries
            .iter()
            .filter_map(|(id, e)| {
                if e.status == CoinStatus::Reserved {
                    let started = e.reserved_at_instant?;
                    if now.saturating_duration_since(started) > timeout {
                        return Some(id.clone());
                    }
                }
                None
            })
            .collect();
        for id in &expired {
            entries.shift_remove(id);
        }
        if !expired.is_empty() {
            self.metrics.coins_swept_total.inc_by(expired.len() as u64);
            info!(count = expired.len(), "swept expired reservations");
        }
        self.publish_gauges(&entries);
        expired
    }

    pub fn sweep_expired(&self) -> Vec<ObjectId> {
        self.sweep_expired_at(tokio::time::Instant::now())
    }

    /// Fetches the current on-chain state of every tracked coin in one
    /// batched call. Reserved entries are skipped (their report is still
    /// pending); missing coins are removed; others have their reference
    /// and balance refreshed.
    #[instrument(skip(self, rpc))]
    pub async fn revalidate(&self, rpc: &dyn RpcClient) -> Result<()> {
        let ids: Vec<ObjectId> = {
            let entries = self.inner.lock();
            entries
                .iter()
                .filter(|(_, e)| e.status != CoinStatus::Reserved)
                .map(|(id, _)| id.clone())
                .collect()
        };
        if ids.is_empty() {
            return Ok(());
        }
        let states = rpc.batch_get_objects(&ids).await.map_err(GasStationError::Other)?;

        let mut entries = self.inner.lock();
        for state in states {
            let Some(entry) = entries.get_mut(&state.object_id) else {
                continue;
            };
            if entry.status == CoinStatus::Reserved {
                continue;
            }
            match (state.data, state.balance) {
                (Some(object_ref), Some(balance)) => {
                    entry.object_ref = object_ref;
                    entry.balance = balance;
                }
                _ => {
                    entries.shift_remove(&state.object_id);
                }
            }
        }
        self.publish_gauges(&entries);
        Ok(())
    }

    /// Optional graceful shutdown: sweeps expired reservations, merges
    /// remaining Available coins into one if >= 2 remain, then clears the
    /// map unconditionally. Reserved entries are abandoned.
    #[instrument(skip(self, rpc, codec, signer))]
    pub async fn close(&self, rpc: &dyn RpcClient, codec: &dyn TxCodec, signer: &dyn Signer) -> Result<()> {
        self.sweep_expired();
        let available: Vec<(ObjectId, ObjectRef)> = {
            let entries = self.inner.lock();
            entries
                .iter()
                .filter(|(_, e)| e.status == CoinStatus::Available)
                .map(|(id, e)| (id.clone(), e.object_ref.clone()))
                .collect()
        };

        if available.len() >= 2 {
            if let Err(err) = self.merge_available(rpc, codec, signer, &available).await {
                warn!(?err, "close-time merge failed; clearing pool anyway");
            }
        }

        self.inner.lock().clear();
        self.publish_gauges(&self.inner.lock());
        info!("coin pool closed");
        Ok(())
    }

    async fn merge_available(
        &self,
        rpc: &dyn RpcClient,
        codec: &dyn TxCodec,
        signer: &dyn Signer,
        available: &[(ObjectId, ObjectRef)],
    ) -> Result<()> {
        let owner = signer.address();
        let gas_coin = available[0].1.clone();
        let sources: Vec<ObjectRef> = available[1..].iter().map(|(_, r)| r.clone()).collect();
        let source_args: Vec<Argument> = (0..sources.len() as u16).map(Argument::Input).collect();

        let commands = vec![Command::MergeCoins {
            destination: Argument::GasCoin,
            sources: source_args,
        }];
        let mut tx = codec.build_transaction(&owner, sources.clone(), commands);
        tx.set_sender(&owner);
        tx.set_gas_owner(&owner);
        tx.set_gas_payment(vec![gas_coin]);
        let system_state = rpc
            .current_system_state()
            .await
            .map_err(GasStationError::Other)?;
        tx.set_gas_price(system_state.reference_gas_price);
        tx.set_gas_budget(self.config.target_coin_balance);

        let bytes = codec.build(tx, rpc).await?;
        let signature = signer
            .sign(&bytes)
            .await
            .map_err(|err| GasStationError::SignFailed(err.to_string()))?;
        rpc.submit_transaction(&bytes, &[signature])
            .await
            .map_err(GasStationError::Other)?;
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let entries = self.inner.lock();
        let (available, reserved, total_balance) = scan(&entries);
        PoolStats {
            total: entries.len(),
            available,
            reserved,
            total_balance,
        }
    }
}

fn scan(entries: &IndexMap<ObjectId, CoinEntry>) -> (usize, usize, u64) {
    let mut available = 0;
    let mut reserved = 0;
    let mut total_balance = 0u64;
    for entry in entries.values() {
        match entry.status {
            CoinStatus::Available => available += 1,
            CoinStatus::Reserved => reserved += 1,
        }
        total_balance += entry.balance;
    }
    (available, reserved, total_balance)
}
