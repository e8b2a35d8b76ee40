// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// The error taxonomy for the gas sponsorship service.
///
/// Every variant corresponds to one row of the error table in the
/// specification: `code()` returns the stable string an HTTP layer built on
/// top of this crate can use to pick a status code without matching on enum
/// shape.
#[derive(Error, Debug)]
pub enum GasStationError {
    #[error("gas station has not been initialized")]
    NotInitialized,

    #[error("no coin in the pool satisfies the request")]
    PoolExhausted,

    #[error("policy violation: {reason}")]
    PolicyViolation {
        reason: String,
        offending_target: Option<String>,
    },

    #[error("failed to build transaction: {0}")]
    BuildFailed(String),

    #[error("signer failed to sign transaction: {0}")]
    SignFailed(String),

    #[error("reportExecution received malformed effects: {0}")]
    InvalidEffects(String),

    #[error("could not source coins: {0}")]
    InsufficientFunds(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GasStationError {
    /// Stable string identifying the error kind, suitable for metrics labels and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            GasStationError::NotInitialized => "NotInitialized",
            GasStationError::PoolExhausted => "PoolExhausted",
            GasStationError::PolicyViolation { .. } => "PolicyViolation",
            GasStationError::BuildFailed(_) => "BuildFailed",
            GasStationError::SignFailed(_) => "SignFailed",
            GasStationError::InvalidEffects(_) => "InvalidEffects",
            GasStationError::InsufficientFunds(_) => "InsufficientFunds",
            GasStationError::Other(_) => "Internal",
        }
    }

    /// Structured detail map for logging/API surfacing. Callers that need
    /// richer context (sender, object ids) attach it via `with_details`.
    pub fn details(&self) -> Value {
        let mut map = BTreeMap::new();
        if let GasStationError::PolicyViolation {
            offending_target: Some(target),
            ..
        } = self
        {
            map.insert("offending_target".to_string(), Value::String(target.clone()));
        }
        Value::Object(map.into_iter().collect())
    }

    pub fn policy_violation(reason: impl Into<String>) -> Self {
        GasStationError::PolicyViolation {
            reason: reason.into(),
            offending_target: None,
        }
    }

    pub fn policy_violation_with_target(reason: impl Into<String>, target: impl Into<String>) -> Self {
        GasStationError::PolicyViolation {
            reason: reason.into(),
            offending_target: Some(target.into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GasStationError>;
