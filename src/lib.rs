//! Trade Carousel Library
//!
//! A batch-mode engine for generating round-robin swap volume on a
//! decentralized exchange from a pool of managed wallets. The library funds
//! wallets from an operator account, selects a liquidity router among ranked
//! candidate protocols at startup, plans swap routes over a small basis-token
//! set, and executes a round-robin trading cycle while persisting every trade.
//!
//! # Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - **`config`**: Environment-driven configuration and fail-fast validation
//! - **`ledger`**: Chain capability trait (balances, quotes, submission) and
//!   its alloy-backed RPC implementation
//! - **`accounts`**: Key storage, cipher seam, and the managed-account registry
//! - **`router`**: Startup selection of the active router among candidates
//! - **`funding`**: Wallet provisioning and teardown transfers
//! - **`route`**: Route planning, quoting, and protocol-specific execution
//! - **`store`**: Append-only trade persistence over SQLite
//! - **`engine`**: The round-robin orchestrator tying everything together
//! - **`errors`**: Comprehensive error handling and reporting
//!
//! # Core Concepts
//!
//! - **Basis assets**: A fixed, tiny set of tokens (at most three) between
//!   which every managed wallet alternates. Route enumeration is exhaustive
//!   over this set, not heuristic.
//! - **Round-robin cycle**: Wallets trade strictly sequentially, one await at
//!   a time, so no two mutating operations from the same signer are ever in
//!   flight concurrently.
//! - **Fund/defund lifecycle**: Wallets are topped up from the operator when
//!   both basis assets run dry and swept back on teardown, leaving only a gas
//!   reserve behind.
//!
//! # Security Considerations
//!
//! Private keys live in an encrypted key file and are decrypted through a
//! swappable cipher capability; they are never persisted in plaintext by the
//! engine. Store the operator key and the key-file secret in environment
//! variables, use HTTPS RPC endpoints, and monitor the audit log for failed
//! transactions.

pub mod accounts;
pub mod config;
pub mod engine;
pub mod errors;
pub mod funding;
pub mod ledger;
pub mod route;
pub mod router;
pub mod store;
pub mod utils;

// Re-export the main Result type and error enum for convenience
pub use errors::{CarouselError, Result};

// Re-export the top-level entry points
pub use engine::{CarouselEngine, RunSummary};
pub use ledger::{Ledger, RpcLedger};
pub use router::{ProtocolKind, RouterConfig, RouterSelection};

// Module-specific result types for better ergonomics
pub type RouterResult<T> = std::result::Result<T, errors::RouterError>;
pub type FundingResult<T> = std::result::Result<T, errors::FundingError>;
pub type RouteResult<T> = std::result::Result<T, errors::RouteError>;
pub type EngineResult<T> = std::result::Result<T, errors::EngineError>;
pub type StoreResult<T> = std::result::Result<T, errors::StoreError>;
pub type KeyStoreResult<T> = std::result::Result<T, errors::KeyStoreError>;
