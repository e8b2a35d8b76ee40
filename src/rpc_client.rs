// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

//! The chain RPC client boundary -- an injected external collaborator.
//! This crate defines only the surface it needs; production
//! implementations (and their retries, connection pooling, TLS) live
//! outside this crate.

use async_trait::async_trait;

use crate::types::ObjectRef;

/// One page of the list-coins-by-owner pagination API.
#[derive(Debug, Clone)]
pub struct CoinPage {
    pub data: Vec<OnChainCoin>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct OnChainCoin {
    pub object_ref: ObjectRef,
    pub balance: u64,
}

/// One object's current on-chain state, or absence (deleted/never existed).
#[derive(Debug, Clone)]
pub struct ObjectState {
    pub object_id: String,
    pub data: Option<ObjectRef>,
    pub balance: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SystemState {
    pub epoch: String,
    pub reference_gas_price: u64,
    pub epoch_start_ms: i64,
    pub epoch_duration_ms: i64,
}

#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub digest: String,
    pub effects: crate::types::Effects,
}

/// The blockchain RPC client this crate is built against, as an interface.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn list_coins(&self, owner: &str, cursor: Option<String>) -> anyhow::Result<CoinPage>;

    async fn batch_get_objects(&self, ids: &[String]) -> anyhow::Result<Vec<ObjectState>>;

    async fn current_system_state(&self) -> anyhow::Result<SystemState>;

    async fn submit_transaction(
        &self,
        bytes: &[u8],
        signatures: &[Vec<u8>],
    ) -> anyhow::Result<SubmitResult>;
}
