//! Utility functions for address handling, unit conversion, and deadlines.
//!
//! Amounts cross two representations in this crate: `U256` base units on the
//! wire and `f64` display units in configuration and logs. Conversions live
//! here so the rounding behavior is in one place. Display-unit amounts are
//! small by construction (trade bounds are fractions of a token), so the
//! `f64` round-trip is safe for every value the engine produces.

use crate::errors::{Result, UtilityError};
use alloy::primitives::{Address, U256};
use std::str::FromStr;

/// Parse a string representation of an EVM address.
///
/// Accepts addresses with or without the "0x" prefix. The address must be
/// exactly 20 bytes (40 hex characters).
pub fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s.trim_start_matches("0x")).map_err(|_| {
        UtilityError::AddressParsingFailed {
            input: s.to_string(),
        }
        .into()
    })
}

/// Convert a display-unit amount (e.g. `0.05` tokens) to base units.
///
/// # Errors
///
/// Returns an error if the amount is negative, non-finite, or too large to
/// fit in a `u128` after scaling.
pub fn to_base_units(amount: f64, decimals: u8) -> Result<U256> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(UtilityError::AmountNotRepresentable { amount, decimals }.into());
    }
    let scaled = amount * 10f64.powi(decimals as i32);
    if scaled > u128::MAX as f64 {
        return Err(UtilityError::AmountNotRepresentable { amount, decimals }.into());
    }
    Ok(U256::from(scaled as u128))
}

/// Convert a base-unit amount to display units.
///
/// # Errors
///
/// Returns an error if the value exceeds `u128::MAX` base units; balances in
/// this system never approach that bound.
pub fn to_display_units(value: U256, decimals: u8) -> Result<f64> {
    let raw: u128 = value.try_into().map_err(|_| UtilityError::UnitConversionFailed {
        value: value.to_string(),
        decimals,
    })?;
    Ok(raw as f64 / 10f64.powi(decimals as i32))
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A unix-timestamp deadline `secs` seconds in the future.
///
/// This is a blockchain-level expiry baked into the swap call, not a process
/// timeout: the on-chain call reverts after it, but a hung transport is the
/// RPC layer's problem.
pub fn deadline_in(secs: u64) -> U256 {
    U256::from(unix_now() as u64 + secs)
}
