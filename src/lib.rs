// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core of a gas-sponsorship service for a two-party-payer blockchain.
//!
//! A sender authorizes an operation and a sponsor authorizes paying its
//! execution fee; both signatures are submitted together. This crate
//! owns a pool of pre-sized fee coins, issues short-lived reservations
//! against them, validates sponsor-side policy, and composes both into
//! `Sponsor::sponsor_transaction`. The chain RPC client, the sponsor's
//! signing key, and the transaction-body codec are injected as traits
//! (`rpc_client::RpcClient`, `signer::Signer`, `tx_codec::TxCodec`); HTTP
//! framing, authentication, and persistence are out of scope.

pub mod address;
pub mod coin_pool;
pub mod config;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod price_cache;
pub mod rpc_client;
pub mod signer;
pub mod sponsor;
pub mod tx_codec;
pub mod types;

pub use config::GasStationConfig;
pub use error::{GasStationError, Result};
pub use sponsor::{Sponsor, SponsorHandle, SponsorRequest, SponsoredTransaction};
pub use types::{
    CoinEntry, CoinStatus, Effects, GasCostSummary, ObjectId, ObjectRef, Policy, PoolStats, Reservation,
};
