// Copyright (c) Gas Sponsor Contributors
// SPDX-License-Identifier: Apache-2.0

//! Address normalization helpers.
//!
//! The chain's addresses are fixed-width hex strings (32 bytes / 64 hex
//! characters, following the `SuiAddress` convention). Normalizing to a
//! single canonical form before set membership
//! tests is what makes the blocklist/allowlist checks in `policy.rs`
//! correct regardless of how a caller supplied an address (with/without
//! `0x`, mixed case, unpadded).

pub const ADDRESS_WIDTH_BYTES: usize = 32;

/// Lower-case, `0x`-prefixed, zero-padded-to-`ADDRESS_WIDTH_BYTES` hex form.
///
/// Returns `None` if `raw` (after stripping an optional `0x` prefix) is not
/// valid hex or exceeds the fixed width.
pub fn normalize_address(raw: &str) -> Option<String> {
    let stripped = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")).unwrap_or(raw);
    if stripped.is_empty() || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    if stripped.len() > ADDRESS_WIDTH_BYTES * 2 {
        return None;
    }
    let padded = format!("{:0>width$}", stripped.to_ascii_lowercase(), width = ADDRESS_WIDTH_BYTES * 2);
    Some(format!("0x{padded}"))
}

/// Normalizes a `package::module::function` target string by normalizing
/// the package address component and lower-casing module/function (which
/// are case-sensitive Move identifiers on-chain, so only the address part
/// is case-folded here, unlike a sender address).
pub fn normalize_target(raw: &str) -> Option<String> {
    let mut parts = raw.splitn(3, "::");
    let package = parts.next()?;
    let module = parts.next()?;
    let function = parts.next()?;
    let package = normalize_address(package)?;
    Some(format!("{package}::{module}::{function}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_unpadded_mixed_case() {
        let got = normalize_address("0xABC").unwrap();
        assert_eq!(got.len(), 2 + ADDRESS_WIDTH_BYTES * 2);
        assert!(got.starts_with("0x"));
        assert!(got.ends_with("abc"));
    }

    #[test]
    fn normalizes_without_prefix() {
        let got = normalize_address("abc").unwrap();
        assert_eq!(got, normalize_address("0xABC").unwrap());
    }

    #[test]
    fn rejects_non_hex() {
        assert!(normalize_address("0xzz").is_none());
    }

    #[test]
    fn rejects_oversized() {
        let too_long = "0".repeat(ADDRESS_WIDTH_BYTES * 2 + 2);
        assert!(normalize_address(&too_long).is_none());
    }

    #[test]
    fn normalizes_target_address_component_only() {
        let got = normalize_target("0x2::coin::join").unwrap();
        assert!(got.starts_with("0x0000"));
        assert!(got.ends_with("::coin::join"));
    }

    #[test]
    fn rejects_malformed_target() {
        assert!(normalize_target("0x2::coin").is_none());
    }
}
