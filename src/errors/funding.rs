//! Wallet funding and defunding errors.

use alloy::primitives::Address;

/// Which leg of the two-transaction funding flow failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundLeg {
    /// The native base-asset transfer (operator nonce N).
    Base,
    /// The ERC-20 token transfer (operator nonce N + 1).
    Token,
}

impl std::fmt::Display for FundLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FundLeg::Base => write!(f, "base"),
            FundLeg::Token => write!(f, "token"),
        }
    }
}

/// Errors that can occur during fund/defund transfers
#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    #[error("Fund {leg} leg to {account} failed: {reason}")]
    LegFailed {
        leg: FundLeg,
        account: Address,
        reason: String,
    },

    #[error("Defund of {account} failed: {reason}")]
    DefundFailed { account: Address, reason: String },

    #[error("Operator balance {available} is below the requested funding amount {requested}")]
    InsufficientOperatorBalance {
        available: String,
        requested: String,
    },

    #[error("Transfer to {account} was included but reverted: {tx_hash}")]
    TransferReverted { account: Address, tx_hash: String },
}
