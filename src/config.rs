// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

fn default_target_pool_size() -> usize {
    20
}

fn default_target_coin_balance() -> u64 {
    500_000_000
}

fn default_min_coin_balance() -> u64 {
    50_000_000
}

fn default_reservation_timeout_ms() -> i64 {
    30_000
}

fn default_epoch_boundary_window_ms() -> i64 {
    1_000
}

fn default_max_boundary_wait_ms() -> i64 {
    30_000
}

/// Tunables for the gas station, loadable from TOML (`toml::from_str`) or
/// constructed directly as a plain struct literal with `..Default::default()`
/// for the fields left at their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasStationConfig {
    #[serde(default = "default_target_pool_size")]
    pub target_pool_size: usize,
    #[serde(default = "default_target_coin_balance")]
    pub target_coin_balance: u64,
    #[serde(default = "default_min_coin_balance")]
    pub min_coin_balance: u64,
    #[serde(default = "default_reservation_timeout_ms")]
    pub reservation_timeout_ms: i64,
    #[serde(default = "default_epoch_boundary_window_ms")]
    pub epoch_boundary_window_ms: i64,
    #[serde(default = "default_max_boundary_wait_ms")]
    pub max_boundary_wait_ms: i64,
    /// Budget ceiling used when neither an explicit `gas_budget` nor a
    /// policy `max_budget_per_tx` is supplied. Falls back to
    /// `target_coin_balance` when unset.
    pub default_max_budget: Option<u64>,
}

impl Default for GasStationConfig {
    fn default() -> Self {
        Self {
            target_pool_size: default_target_pool_size(),
            target_coin_balance: default_target_coin_balance(),
            min_coin_balance: default_min_coin_balance(),
            reservation_timeout_ms: default_reservation_timeout_ms(),
            epoch_boundary_window_ms: default_epoch_boundary_window_ms(),
            max_boundary_wait_ms: default_max_boundary_wait_ms(),
            default_max_budget: None,
        }
    }
}

impl GasStationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target_coin_balance == 0 {
            anyhow::bail!("target_coin_balance must be > 0");
        }
        if self.min_coin_balance >= self.target_coin_balance {
            anyhow::bail!("min_coin_balance must be less than target_coin_balance");
        }
        if self.target_pool_size == 0 {
            anyhow::bail!("target_pool_size must be > 0");
        }
        Ok(())
    }

    /// The budget ceiling to pass to the codec's build step when the
    /// caller and policy both leave it unset.
    pub fn resolved_default_max_budget(&self) -> u64 {
        self.default_max_budget.unwrap_or(self.target_coin_balance)
    }
}
