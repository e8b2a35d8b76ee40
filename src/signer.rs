// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

//! The sponsor's signing key boundary -- an injected external collaborator.
//! No key material is ever held as mutable state in this crate; each
//! `sponsor_transaction` call makes a single `sign` call against whatever
//! the embedder wires up (local key, KMS, hardware module).

use async_trait::async_trait;

#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> String;

    async fn sign(&self, bytes: &[u8]) -> anyhow::Result<Vec<u8>>;
}
