// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

use tracing::debug;

use crate::address::{normalize_address, normalize_target};
use crate::error::{GasStationError, Result};
use crate::tx_codec::{Argument, Command, Tx};
use crate::types::Policy;

/// Pure validator over a (sender, transaction-body, requested-budget)
/// tuple against a configured `Policy`. Evaluated cheapest-first:
/// budget cap, sender blocklist, target allowlist, custom validator.
pub struct PolicyEngine;

impl PolicyEngine {
    /// `tx` is the already-parsed command list (via `TxCodec::parse_kind`);
    /// callers decode it once and pass it in rather than re-parsing here.
    pub fn validate(policy: &Policy, sender: &str, tx: &dyn Tx, body_bytes: &[u8], requested_budget: u64) -> Result<()> {
        if let Some(max) = policy.max_budget_per_tx {
            if requested_budget > max {
                return Err(GasStationError::policy_violation(format!(
                    "requested budget {requested_budget} exceeds policy max {max}"
                )));
            }
        }

        let normalized_sender = normalize_address(sender)
            .ok_or_else(|| GasStationError::policy_violation(format!("malformed sender address {sender}")))?;
        if policy
            .blocked_senders
            .iter()
            .any(|blocked| normalize_address(blocked).as_deref() == Some(normalized_sender.as_str()))
        {
            return Err(GasStationError::policy_violation(format!("sender {sender} is blocked")));
        }

        if !policy.allowed_targets.is_empty() {
            for command in tx.commands() {
                if command.is_publish_or_upgrade() {
                    return Err(GasStationError::policy_violation(
                        "Publish/Upgrade commands are not permitted under an allowlist policy",
                    ));
                }
                if let Command::MoveCall { .. } = command {
                    let target = command.target().expect("MoveCall always has a target");
                    let normalized = normalize_target(&target).ok_or_else(|| {
                        GasStationError::policy_violation(format!("malformed call target {target}"))
                    })?;
                    let allowed = policy
                        .allowed_targets
                        .iter()
                        .any(|t| normalize_target(t).as_deref() == Some(normalized.as_str()));
                    if !allowed {
                        return Err(GasStationError::policy_violation_with_target(
                            format!("target {target} is not in the allowlist"),
                            target,
                        ));
                    }
                }
            }
        }

        if let Some(validator) = &policy.custom_validator {
            if !validator(sender, body_bytes, requested_budget) {
                return Err(GasStationError::policy_violation("rejected by custom validator"));
            }
        }

        Ok(())
    }

    /// Always-on unless `policy.allow_gas_coin_usage`: rejects any command
    /// whose argument list references the gas coin itself. Prevents a
    /// sender from draining sponsor value beyond the fee, e.g.
    /// `SplitCoins(GasCoin, [huge])` + `TransferObjects([split], attacker)`.
    pub fn check_gas_coin_drain(policy: &Policy, tx: &dyn Tx) -> Result<()> {
        if policy.allow_gas_coin_usage {
            return Ok(());
        }
        for command in tx.commands() {
            if command.arguments().contains(&Argument::GasCoin) {
                debug!(?command, "rejecting command referencing GasCoin");
                return Err(GasStationError::policy_violation(
                    "command references GasCoin; sponsor coins may only be used to pay gas",
                ));
            }
        }
        Ok(())
    }
}
