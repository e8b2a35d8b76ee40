// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Stable on-chain identity for an object (coin), as an opaque hex string.
pub type ObjectId = String;

/// The triple uniquely identifying an object's on-chain state at a point in
/// time: identity, monotonic version, content digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_id: ObjectId,
    pub version: u64,
    pub digest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinStatus {
    Available,
    Reserved,
}

/// One fee coin tracked by the pool.
///
/// `reserved_at` is only meaningful while `status == Reserved`; callers must
/// not read it otherwise.
#[derive(Debug, Clone)]
pub struct CoinEntry {
    pub object_ref: ObjectRef,
    pub balance: u64,
    pub status: CoinStatus,
    /// Monotonic instant used internally for reservation-expiry arithmetic.
    /// Immune to wall-clock adjustments, unlike `reserved_at_ms`.
    pub(crate) reserved_at_instant: Option<tokio::time::Instant>,
    /// Wall-clock milliseconds at the moment of reservation, surfaced to
    /// callers via `Reservation::reserved_at`.
    pub(crate) reserved_at_ms: Option<i64>,
}

impl CoinEntry {
    pub fn new_available(object_ref: ObjectRef, balance: u64) -> Self {
        Self {
            object_ref,
            balance,
            status: CoinStatus::Available,
            reserved_at_instant: None,
            reserved_at_ms: None,
        }
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_ref.object_id
    }
}

/// Opaque handle returned from `CoinPool::reserve`, used only to correlate a
/// later `report_execution`/`release` back to the reserved entry. Carries a
/// snapshot of the coin's reference, not a live pointer into the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub object_id: ObjectId,
    pub reserved_at: i64,
    pub object_ref: ObjectRef,
    pub balance: u64,
}

/// Aggregate pool statistics, `stats()`'s return value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub reserved: usize,
    pub total_balance: u64,
}

/// Post-execution gas usage breakdown, the numeric half of `Effects`.
///
/// All fields are plain integers here; the embedder's `TxCodec`
/// implementation is responsible for parsing the chain's decimal-string
/// JSON convention into these before calling `report_execution`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GasCostSummary {
    pub computation_cost: u64,
    pub storage_cost: u64,
    pub storage_rebate: u64,
    pub non_refundable_storage_fee: u64,
}

impl GasCostSummary {
    /// `computation + storage - rebate + non_refundable`. May be negative
    /// when a transaction nets a refund (e.g. deletes objects).
    pub fn net_gas_usage(&self) -> i64 {
        self.computation_cost as i64 + self.storage_cost as i64 - self.storage_rebate as i64
            + self.non_refundable_storage_fee as i64
    }
}

/// Structural shape of the chain's post-execution effects report, limited
/// to the fields this crate needs.
#[derive(Debug, Clone, Default)]
pub struct Effects {
    pub gas_object: ObjectRef,
    pub gas_used: GasCostSummary,
    /// Objects created by this transaction, in command-execution order.
    /// Populated for the pool's own split transactions; empty for an
    /// ordinary sponsored transaction's effects.
    pub created: Vec<ObjectRef>,
}

/// Immutable sponsor-side policy. All fields optional; an unset field
/// imposes no restriction.
#[derive(Clone, Default)]
pub struct Policy {
    pub max_budget_per_tx: Option<u64>,
    /// Normalized `package::module::function` strings.
    pub allowed_targets: BTreeSet<String>,
    /// Normalized (padded, lower-case hex) sender addresses.
    pub blocked_senders: BTreeSet<String>,
    pub allow_gas_coin_usage: bool,
    #[allow(clippy::type_complexity)]
    pub custom_validator: Option<std::sync::Arc<dyn Fn(&str, &[u8], u64) -> bool + Send + Sync>>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("max_budget_per_tx", &self.max_budget_per_tx)
            .field("allowed_targets", &self.allowed_targets)
            .field("blocked_senders", &self.blocked_senders)
            .field("allow_gas_coin_usage", &self.allow_gas_coin_usage)
            .field(
                "custom_validator",
                &self.custom_validator.as_ref().map(|_| "<fn>").unwrap_or("None"),
            )
            .finish()
    }
}
