//! Engine configuration and run-level errors.

/// Errors raised by configuration validation and the trading loop
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid bounds for asset {symbol}: min {min} must be >= {floor} and max {max} must exceed min")]
    InvalidAssetBounds {
        symbol: String,
        min: f64,
        max: f64,
        floor: f64,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("No managed accounts available; run provisioning first")]
    NoManagedAccounts,

    #[error("Held asset index {index} is out of range for a two-asset rotation")]
    InvalidHeldAssetIndex { index: usize },
}
