//! Error handling and reporting for the trade-carousel library.
//!
//! This module provides a hierarchical error system with fine-grained error
//! types for each major component of the library. Domain-specific enums keep
//! failures matchable where the engine needs to decide between aborting a run
//! and skipping a single account or trade.
//!
//! # Error Hierarchy
//!
//! - **`RouterError`**: Router candidate validation and selection failures
//! - **`FundingError`**: Wallet funding and defunding transfer failures
//! - **`RouteError`**: Route planning, quoting, and trade execution failures
//! - **`EngineError`**: Configuration validation and run-level failures
//! - **`KeyStoreError`**: Encrypted key material loading failures
//! - **`StoreError`**: Trade persistence failures
//! - **`UtilityError`**: Address parsing and unit conversion failures
//!
//! The `CarouselError` enum serves as the top-level error type, providing
//! automatic conversion from all domain-specific errors and from external
//! library errors, so `?` propagation works throughout the crate.

pub mod engine;
pub mod funding;
pub mod keys;
pub mod route;
pub mod router;
pub mod store;
pub mod utility;

// Re-export all error types for convenience
pub use engine::EngineError;
pub use funding::FundingError;
pub use keys::KeyStoreError;
pub use route::RouteError;
pub use router::RouterError;
pub use store::StoreError;
pub use utility::UtilityError;

/// Main result type for the library
pub type Result<T> = std::result::Result<T, CarouselError>;

/// Top-level error enum that encompasses all possible errors in the library.
///
/// The engine matches on these categories to decide whether a failure is
/// fatal for the whole run (configuration, router selection, key material)
/// or recoverable for a single account or trade (funding, routing,
/// persistence).
#[derive(Debug, thiserror::Error)]
pub enum CarouselError {
    /// Router candidate validation or selection failed.
    #[error("Router selection failed: {0}")]
    Router(#[from] RouterError),

    /// Wallet funding or defunding transfer failed.
    #[error("Funding operation failed: {0}")]
    Funding(#[from] FundingError),

    /// Route planning, quoting, or trade execution failed.
    #[error("Route operation failed: {0}")]
    Route(#[from] RouteError),

    /// Run-level or configuration failure.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Encrypted key material could not be loaded.
    #[error("Key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    /// Trade persistence failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Address parsing or unit conversion failed.
    #[error("Utility error: {0}")]
    Utility(#[from] UtilityError),

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local signer error for private key operations.
    #[error("Local signer error: {0}")]
    LocalSigner(#[from] alloy::signers::local::LocalSignerError),

    /// Hexadecimal string parsing error.
    #[error("Hex parsing error: {0}")]
    HexParsing(#[from] alloy::hex::FromHexError),

    /// RPC communication error with blockchain nodes.
    #[error("RPC error: {0}")]
    Rpc(#[from] alloy::transports::RpcError<alloy::transports::TransportErrorKind>),

    /// ABI decoding error from contract call returns.
    #[error("ABI decoding error: {0}")]
    AbiDecoding(#[from] alloy::sol_types::Error),

    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Generic error for cases not covered by specific error types.
    #[error("Generic error: {0}")]
    Other(#[from] anyhow::Error),
}
