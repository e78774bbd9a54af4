//! Route planning and trade execution errors.

/// Errors that can occur while planning or executing a trade
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("No viable route from {from} to {to}: every candidate path failed to quote")]
    NoViableRoute { from: String, to: String },

    #[error("Quote failed for path {path}: {reason}")]
    QuoteFailed { path: String, reason: String },

    #[error("Unknown token symbol: {symbol}")]
    UnknownToken { symbol: String },

    #[error("Route has no hops")]
    EmptyPath,

    #[error("Trade simulation reverted: {reason}")]
    SimulationReverted { reason: String },

    #[error("Trade submission failed: {reason}")]
    SubmissionFailed { reason: String },

    #[error("Trade {tx_hash} was included but reverted on-chain")]
    TradeReverted { tx_hash: String },

    #[error("Approval of {token} for router {router} failed: {reason}")]
    ApprovalFailed {
        token: String,
        router: String,
        reason: String,
    },
}
