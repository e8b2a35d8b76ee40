// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

//! The transaction-body codec boundary.
//!
//! The real encoding (BCS over the chain's transaction format) is an
//! external collaborator: this module defines only the shape this crate
//! needs from it -- a closed command enum to drive the drain check and
//! the allowlist, and a `TxCodec` trait an embedder implements against
//! its own wire format.

use async_trait::async_trait;

use crate::error::Result;
use crate::rpc_client::RpcClient;
use crate::types::ObjectRef;

/// One argument reference inside a command's argument list. Only the
/// `GasCoin` variant matters to the drain check; the rest are opaque to
/// this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    GasCoin,
    Input(u16),
    Result(u16),
    NestedResult(u16, u16),
}

/// The closed sum type of programmable-transaction commands this crate
/// needs to reason about: enough to locate `GasCoin` references and
/// `MoveCall` targets without depending on a full transaction-building
/// library.
#[derive(Debug, Clone)]
pub enum Command {
    MoveCall {
        package: String,
        module: String,
        function: String,
        arguments: Vec<Argument>,
    },
    SplitCoins {
        coin: Argument,
        amounts: Vec<Argument>,
    },
    TransferObjects {
        objects: Vec<Argument>,
        address: Argument,
    },
    MergeCoins {
        destination: Argument,
        sources: Vec<Argument>,
    },
    MakeMoveVec {
        elements: Vec<Argument>,
    },
    Publish,
    Upgrade {
        ticket: Argument,
    },
}

impl Command {
    /// Every argument this command references, in the order the command's
    /// own fields are declared.
    pub fn arguments(&self) -> Vec<Argument> {
        match self {
            Command::MoveCall { arguments, .. } => arguments.clone(),
            Command::SplitCoins { coin, amounts } => {
                let mut args = vec![*coin];
                args.extend(amounts.iter().copied());
                args
            }
            Command::TransferObjects { objects, address } => {
                let mut args = objects.clone();
                args.push(*address);
                args
            }
            Command::MergeCoins { destination, sources } => {
                let mut args = vec![*destination];
                args.extend(sources.iter().copied());
                args
            }
            Command::MakeMoveVec { elements } => elements.clone(),
            Command::Publish => vec![],
            Command::Upgrade { ticket } => vec![*ticket],
        }
    }

    pub fn target(&self) -> Option<String> {
        match self {
            Command::MoveCall {
                package,
                module,
                function,
                ..
            } => Some(format!("{package}::{module}::{function}")),
            _ => None,
        }
    }

    pub fn is_publish_or_upgrade(&self) -> bool {
        matches!(self, Command::Publish | Command::Upgrade { .. })
    }
}

/// A parsed transaction, mutable via setters so the sponsor can attach gas
/// data before serializing. Object-safe so embedders can box their own
/// representation behind it.
pub trait Tx: Send + Sync {
    fn commands(&self) -> &[Command];
    fn set_sender(&mut self, sender: &str);
    fn set_gas_owner(&mut self, owner: &str);
    fn set_gas_payment(&mut self, payment: Vec<ObjectRef>);
    fn set_gas_price(&mut self, price: u64);
    fn set_gas_budget(&mut self, budget: u64);

    fn sender(&self) -> &str;
    fn gas_owner(&self) -> &str;
    fn gas_payment(&self) -> &[ObjectRef];
    fn gas_price(&self) -> u64;
    fn gas_budget(&self) -> u64;
}

/// The transaction-body codec, an injected external collaborator.
///
/// `parse_kind` parses the sender-supplied body bytes (gas data not yet
/// attached) far enough to inspect commands for policy purposes.
/// `build` performs the (possibly network-backed) dry-run that fills in
/// an auto-estimated budget when one was not set explicitly. `parse_full`
/// re-parses the built bytes to read back the final, possibly-adjusted
/// budget.
#[async_trait]
pub trait TxCodec: Send + Sync {
    fn parse_kind(&self, body_bytes: &[u8]) -> Result<Box<dyn Tx>>;
    async fn build(&self, tx: Box<dyn Tx>, rpc: &dyn RpcClient) -> Result<Vec<u8>>;
    fn parse_full(&self, full_bytes: &[u8]) -> Result<Box<dyn Tx>>;

    /// Builds a fresh transaction from an explicit command list, used by
    /// `CoinPool` to construct its own split/merge housekeeping
    /// transactions rather than a sender-supplied body. `inputs[i]`
    /// resolves `Argument::Input(i)` references within `commands`.
    fn build_transaction(&self, sender: &str, inputs: Vec<ObjectRef>, commands: Vec<Command>) -> Box<dyn Tx>;
}
