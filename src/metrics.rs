// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Histogram, IntCounter,
    IntCounterVec, IntGauge, Registry,
};

/// Metrics for the gas station, modeled on `GasPoolCoreMetrics`: one
/// struct of prometheus collectors, constructed once against a
/// `Registry` and threaded through every component as
/// `Arc<GasStationMetrics>`.
pub struct GasStationMetrics {
    pub pool_total_coins: IntGauge,
    pub pool_available_coins: IntGauge,
    pub pool_reserved_coins: IntGauge,
    pub pool_total_balance: IntGauge,

    pub reserve_latency_ms: Histogram,
    pub sponsor_transaction_latency_ms: Histogram,

    pub policy_rejections_total: IntCounterVec,
    pub price_cache_refresh_total: IntCounter,
    pub epoch_transitions_total: IntCounter,
    pub coins_swept_total: IntCounter,
    pub coins_replenished_total: IntCounter,
}

impl GasStationMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            pool_total_coins: register_int_gauge_with_registry!(
                "gas_station_pool_total_coins",
                "Total coins tracked by the pool",
                registry
            )
            .unwrap(),
            pool_available_coins: register_int_gauge_with_registry!(
                "gas_station_pool_available_coins",
                "Coins currently available for reservation",
                registry
            )
            .unwrap(),
            pool_reserved_coins: register_int_gauge_with_registry!(
                "gas_station_pool_reserved_coins",
                "Coins currently reserved",
                registry
            )
            .unwrap(),
            pool_total_balance: register_int_gauge_with_registry!(
                "gas_station_pool_total_balance",
                "Sum of tracked coin balances",
                registry
            )
            .unwrap(),
            reserve_latency_ms: register_histogram_with_registry!(
                "gas_station_reserve_latency_ms",
                "Latency of CoinPool::reserve in milliseconds",
                registry
            )
            .unwrap(),
            sponsor_transaction_latency_ms: register_histogram_with_registry!(
                "gas_station_sponsor_transaction_latency_ms",
                "End-to-end latency of sponsor_transaction in milliseconds",
                registry
            )
            .unwrap(),
            policy_rejections_total: register_int_counter_vec_with_registry!(
                "gas_station_policy_rejections_total",
                "Policy rejections by error code",
                &["code"],
                registry
            )
            .unwrap(),
            price_cache_refresh_total: register_int_counter_with_registry!(
                "gas_station_price_cache_refresh_total",
                "Number of PriceCache refreshes performed",
                registry
            )
            .unwrap(),
            epoch_transitions_total: register_int_counter_with_registry!(
                "gas_station_epoch_transitions_total",
                "Number of epoch transitions observed by PriceCache",
                registry
            )
            .unwrap(),
            coins_swept_total: register_int_counter_with_registry!(
                "gas_station_coins_swept_total",
                "Coins removed by sweep_expired",
                registry
            )
            .unwrap(),
            coins_replenished_total: register_int_counter_with_registry!(
                "gas_station_coins_replenished_total",
                "Coins added by replenish",
                registry
            )
            .unwrap(),
        }
    }

    /// A metrics instance registered against a fresh, throwaway registry --
    /// for tests and for embedders that do not care to export metrics.
    pub fn new_for_testing() -> Self {
        Self::new(&Registry::new())
    }
}
