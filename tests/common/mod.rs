// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hand-written fakes for the three injected collaborators, rather than
//! a mocking-framework macro -- their surface is small enough that a
//! fake is clearer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use gas_sponsor::rpc_client::{CoinPage, ObjectState, OnChainCoin, RpcClient, SubmitResult, SystemState};
use gas_sponsor::signer::Signer;
use gas_sponsor::tx_codec::{Command, Tx, TxCodec};
use gas_sponsor::{Effects, GasCostSummary, ObjectRef, Result};

pub struct FakeRpc {
    pub coins: Mutex<Vec<OnChainCoin>>,
    pub epoch: AtomicU64,
    pub reference_gas_price: u64,
    pub epoch_duration_ms: i64,
    pub objects: Mutex<std::collections::HashMap<String, ObjectState>>,
    pub next_submit_effects: Mutex<Option<Effects>>,
}

impl FakeRpc {
    pub fn new() -> Self {
        Self {
            coins: Mutex::new(vec![]),
            epoch: AtomicU64::new(1),
            reference_gas_price: 1_000,
            epoch_duration_ms: 600_000,
            objects: Mutex::new(std::collections::HashMap::new()),
            next_submit_effects: Mutex::new(None),
        }
    }

    pub fn with_coins(balances: &[u64]) -> Self {
        let rpc = Self::new();
        {
            let mut coins = rpc.coins.lock().unwrap();
            for (i, balance) in balances.iter().enumerate() {
                coins.push(OnChainCoin {
                    object_ref: ObjectRef {
                        object_id: format!("0x{:064x}", i + 1),
                        version: 1,
                        digest: "d0".to_string(),
                    },
                    balance: *balance,
                });
            }
        }
        rpc
    }
}

#[async_trait]
impl RpcClient for FakeRpc {
    async fn list_coins(&self, _owner: &str, _cursor: Option<String>) -> anyhow::Result<CoinPage> {
        Ok(CoinPage {
            data: self.coins.lock().unwrap().clone(),
            next_cursor: None,
            has_more: false,
        })
    }

    async fn batch_get_objects(&self, ids: &[String]) -> anyhow::Result<Vec<ObjectState>> {
        let objects = self.objects.lock().unwrap();
        Ok(ids
            .iter()
            .map(|id| {
                objects.get(id).cloned().unwrap_or(ObjectState {
                    object_id: id.clone(),
                    data: None,
                    balance: None,
                })
            })
            .collect())
    }

    async fn current_system_state(&self) -> anyhow::Result<SystemState> {
        Ok(SystemState {
            epoch: self.epoch.load(Ordering::SeqCst).to_string(),
            reference_gas_price: self.reference_gas_price,
            epoch_start_ms: 0,
            epoch_duration_ms: self.epoch_duration_ms,
        })
    }

    async fn submit_transaction(&self, _bytes: &[u8], _sigs: &[Vec<u8>]) -> anyhow::Result<SubmitResult> {
        let effects = self.next_submit_effects.lock().unwrap().clone().unwrap_or(Effects {
            gas_object: ObjectRef::default(),
            gas_used: GasCostSummary::default(),
            created: vec![],
        });
        Ok(SubmitResult {
            digest: "fakedigest".to_string(),
            effects,
        })
    }
}

pub struct FakeSigner {
    pub address: String,
}

#[async_trait]
impl Signer for FakeSigner {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn sign(&self, bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(bytes.iter().rev().cloned().collect())
    }
}

pub struct FakeTx {
    pub commands: Vec<Command>,
    pub sender: String,
    pub gas_owner: String,
    pub gas_payment: Vec<ObjectRef>,
    pub gas_price: u64,
    pub gas_budget: u64,
}

impl Tx for FakeTx {
    fn commands(&self) -> &[Command] {
        &self.commands
    }
    fn set_sender(&mut self, sender: &str) {
        self.sender = sender.to_string();
    }
    fn set_gas_owner(&mut self, owner: &str) {
        self.gas_owner = owner.to_string();
    }
    fn set_gas_payment(&mut self, payment: Vec<ObjectRef>) {
        self.gas_payment = payment;
    }
    fn set_gas_price(&mut self, price: u64) {
        self.gas_price = price;
    }
    fn set_gas_budget(&mut self, budget: u64) {
        self.gas_budget = budget;
    }

    fn sender(&self) -> &str {
        &self.sender
    }
    fn gas_owner(&self) -> &str {
        &self.gas_owner
    }
    fn gas_payment(&self) -> &[ObjectRef] {
        &self.gas_payment
    }
    fn gas_price(&self) -> u64 {
        self.gas_price
    }
    fn gas_budget(&self) -> u64 {
        self.gas_budget
    }
}

/// Encodes a `FakeTx` into a trivial self-describing byte format: this
/// crate owns both ends (build/parse) for test purposes only, standing
/// in for a real BCS-based wire codec.
pub struct FakeCodec {
    pub fail_build: bool,
}

impl FakeCodec {
    pub fn new() -> Self {
        Self { fail_build: false }
    }

    fn encode(tx: &dyn Tx) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}|{}",
            tx.sender(),
            tx.gas_owner(),
            tx.gas_price(),
            tx.gas_budget(),
            tx.commands().len()
        )
        .into_bytes()
    }
}

#[async_trait]
impl TxCodec for FakeCodec {
    fn parse_kind(&self, body_bytes: &[u8]) -> Result<Box<dyn Tx>> {
        let commands = decode_commands(body_bytes)?;
        Ok(Box::new(FakeTx {
            commands,
            sender: String::new(),
            gas_owner: String::new(),
            gas_payment: vec![],
            gas_price: 0,
            gas_budget: 0,
        }))
    }

    async fn build(&self, tx: Box<dyn Tx>, _rpc: &dyn gas_sponsor::rpc_client::RpcClient) -> Result<Vec<u8>> {
        if self.fail_build {
            return Err(gas_sponsor::GasStationError::BuildFailed("forced test failure".to_string()));
        }
        let mut bytes = Self::encode(tx.as_ref());
        bytes.extend_from_slice(b"|built");
        Ok(bytes)
    }

    fn parse_full(&self, full_bytes: &[u8]) -> Result<Box<dyn Tx>> {
        let text = String::from_utf8_lossy(full_bytes);
        let text = text.trim_end_matches("|built");
        let parts: Vec<&str> = text.split('|').collect();
        let gas_budget = parts.get(3).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
        let num_commands = parts.get(4).and_then(|s| s.parse::<usize>().ok()).unwrap_or(0);
        Ok(Box::new(FakeTx {
            commands: vec![Command::Publish; num_commands],
            sender: parts.first().unwrap_or(&"").to_string(),
            gas_owner: parts.get(1).unwrap_or(&"").to_string(),
            gas_payment: vec![],
            gas_price: parts.get(2).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0),
            gas_budget,
        }))
    }

    fn build_transaction(&self, sender: &str, _inputs: Vec<ObjectRef>, commands: Vec<Command>) -> Box<dyn Tx> {
        Box::new(FakeTx {
            commands,
            sender: sender.to_string(),
            gas_owner: String::new(),
            gas_payment: vec![],
            gas_price: 0,
            gas_budget: 0,
        })
    }
}

fn decode_commands(body_bytes: &[u8]) -> Result<Vec<Command>> {
    // Test bodies are encoded as repeated single-byte command tags so
    // policy/drain tests can construct exact command sequences without a
    // real wire format.
    let mut commands = Vec::new();
    let mut i = 0;
    while i < body_bytes.len() {
        match body_bytes[i] {
            b'P' => commands.push(Command::Publish),
            b'D' => commands.push(Command::SplitCoins {
                coin: gas_sponsor::tx_codec::Argument::GasCoin,
                amounts: vec![gas_sponsor::tx_codec::Argument::Input(0)],
            }),
            b'T' => commands.push(Command::TransferObjects {
                objects: vec![gas_sponsor::tx_codec::Argument::NestedResult(0, 0)],
                address: gas_sponsor::tx_codec::Argument::Input(1),
            }),
            b'M' => commands.push(Command::MoveCall {
                package: "0x2".to_string(),
                module: "coin".to_string(),
                function: "join".to_string(),
                arguments: vec![],
            }),
            _ => {}
        }
        i += 1;
    }
    Ok(commands)
}

pub fn allow_all_body() -> Vec<u8> {
    b"".to_vec()
}

pub fn drain_attempt_body() -> Vec<u8> {
    b"DT".to_vec()
}
