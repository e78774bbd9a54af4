//! Configuration management for the trade-carousel engine.
//!
//! Configuration is loaded from environment variables (with `dotenvy` picking
//! up a local `.env`) and validated before any wallet state is touched.
//! Bound violations on the trade-amount parameters are fatal by design: a
//! misconfigured minimum below the tradeable floor would make every wallet
//! look permanently exhausted.

use crate::errors::{EngineError, Result};
use crate::router::{ProtocolKind, RouterCandidate};
use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Smallest tradeable amount in display units. Balances below this are
/// treated as exhausted, and no asset may configure a minimum under it.
pub const TRADE_FLOOR: f64 = 0.01;

/// Per-asset bounds for a single trade's input amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetParams {
    pub min: f64,
    pub max: f64,
}

/// One entry of the basis-token table the engine rotates over.
///
/// The first two entries are the alternating pair every wallet swaps between;
/// any further entries only serve as intermediate hops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisAsset {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    /// Whether this token is the chain's wrapped native asset; native
    /// balances reserve gas headroom before they count as spendable.
    pub native: bool,
    pub params: AssetParams,
}

/// Main configuration for a carousel run.
#[derive(Debug, Clone)]
pub struct CarouselConfig {
    /// HTTP RPC endpoint.
    pub rpc_url: String,
    /// Operator (main) account signer; funds and receives sweeps.
    pub operator_key: PrivateKeySigner,
    /// Path of the encrypted key file holding managed-account keys.
    pub key_file: PathBuf,
    /// Shared secret for the key-file cipher.
    pub key_secret: String,
    /// SQLite database URL for the persistence sink.
    pub db_url: String,
    /// Number of full rounds over the wallet pool.
    pub rounds: u32,
    /// Slippage tolerance in parts per ten thousand.
    pub slippage_bps: u64,
    /// Native amount left behind on defund, in display units.
    pub gas_reserve: f64,
    /// Native amount sent per funding cycle, in display units.
    pub fund_base_amount: f64,
    /// Token amount sent per funding cycle, in display units.
    pub fund_token_amount: f64,
    /// Basis-token table; two alternating assets plus optional hop assets.
    pub basis: Vec<BasisAsset>,
    /// Router candidates in priority order.
    pub routers: Vec<RouterCandidate>,
}

impl CarouselConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Required
    /// - `CAROUSEL_RPC_URL`: HTTP RPC endpoint
    /// - `CAROUSEL_OPERATOR_KEY`: operator private key (64 hex chars)
    /// - `CAROUSEL_KEY_SECRET`: shared secret for the key file
    ///
    /// ## Optional
    /// - `CAROUSEL_KEY_FILE`: key file path (default: `wallets.enc`)
    /// - `CAROUSEL_DB`: SQLite URL (default: `sqlite://carousel.db?mode=rwc`)
    /// - `CAROUSEL_ROUNDS`: rounds per run (default: 10)
    /// - `CAROUSEL_SLIPPAGE_BPS`: slippage tolerance (default: 50)
    /// - `CAROUSEL_GAS_RESERVE`: native reserve on defund (default: 0.01)
    /// - `CAROUSEL_FUND_BASE` / `CAROUSEL_FUND_TOKEN`: funding amounts
    ///   (defaults: 0.25 / 5.0)
    /// - `CAROUSEL_ASSETS`: JSON basis-token table overriding the default
    /// - `CAROUSEL_ROUTERS`: JSON router-candidate table overriding the default
    pub fn from_env() -> Result<Self> {
        tracing::info!("Loading carousel configuration from environment");

        let rpc_url = require_var("CAROUSEL_RPC_URL")?;
        if url::Url::parse(&rpc_url).is_err() {
            return Err(EngineError::InvalidConfiguration {
                message: format!("Invalid CAROUSEL_RPC_URL format: {rpc_url}"),
            }
            .into());
        }

        let operator_key_str = require_var("CAROUSEL_OPERATOR_KEY")?;
        let operator_key =
            parse_and_validate_private_key(&operator_key_str, "CAROUSEL_OPERATOR_KEY")?;
        tracing::debug!("Operator private key loaded and validated");

        let key_secret = require_var("CAROUSEL_KEY_SECRET")?;
        let key_file = PathBuf::from(
            env::var("CAROUSEL_KEY_FILE").unwrap_or_else(|_| "wallets.enc".to_string()),
        );
        let db_url = env::var("CAROUSEL_DB")
            .unwrap_or_else(|_| "sqlite://carousel.db?mode=rwc".to_string());

        let rounds = parse_var("CAROUSEL_ROUNDS", 10u32)?;
        let slippage_bps = parse_var("CAROUSEL_SLIPPAGE_BPS", 50u64)?;
        let gas_reserve = parse_var("CAROUSEL_GAS_RESERVE", 0.01f64)?;
        let fund_base_amount = parse_var("CAROUSEL_FUND_BASE", 0.25f64)?;
        let fund_token_amount = parse_var("CAROUSEL_FUND_TOKEN", 5.0f64)?;

        let basis = match env::var("CAROUSEL_ASSETS") {
            Ok(json) => serde_json::from_str(&json)?,
            Err(_) => default_basis_assets(),
        };
        let routers = match env::var("CAROUSEL_ROUTERS") {
            Ok(json) => serde_json::from_str(&json)?,
            Err(_) => default_router_candidates(),
        };

        let config = Self {
            rpc_url,
            operator_key,
            key_file,
            key_secret,
            db_url,
            rounds,
            slippage_bps,
            gas_reserve,
            fund_base_amount,
            fund_token_amount,
            basis,
            routers,
        };
        config.validate()?;

        tracing::info!(
            rounds = config.rounds,
            slippage_bps = config.slippage_bps,
            assets = config.basis.len(),
            router_candidates = config.routers.len(),
            "Carousel configuration loaded successfully"
        );
        Ok(config)
    }

    /// Fail-fast validation of trading parameters.
    ///
    /// Runs before any account is touched; violations abort startup.
    pub fn validate(&self) -> Result<()> {
        if self.basis.len() < 2 || self.basis.len() > 3 {
            return Err(EngineError::InvalidConfiguration {
                message: format!(
                    "basis-token table must hold 2 or 3 assets, got {}",
                    self.basis.len()
                ),
            }
            .into());
        }

        for asset in &self.basis {
            let AssetParams { min, max } = asset.params;
            if min < TRADE_FLOOR || max <= min {
                return Err(EngineError::InvalidAssetBounds {
                    symbol: asset.symbol.clone(),
                    min,
                    max,
                    floor: TRADE_FLOOR,
                }
                .into());
            }
        }

        if self.slippage_bps > 10_000 {
            return Err(EngineError::InvalidConfiguration {
                message: format!("slippage_bps must be <= 10000, got {}", self.slippage_bps),
            }
            .into());
        }

        if self.routers.is_empty() {
            return Err(EngineError::InvalidConfiguration {
                message: "at least one router candidate must be configured".into(),
            }
            .into());
        }

        if self.gas_reserve < 0.0 || self.fund_base_amount <= 0.0 || self.fund_token_amount <= 0.0 {
            return Err(EngineError::InvalidConfiguration {
                message: "gas reserve and funding amounts must be positive".into(),
            }
            .into());
        }

        Ok(())
    }

    /// Create a configuration for testing with a random operator key.
    ///
    /// # Security Note
    ///
    /// Generates a throwaway key; never use outside tests.
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            rpc_url: "http://localhost:8545".into(),
            operator_key: PrivateKeySigner::random(),
            key_file: PathBuf::from("wallets.enc"),
            key_secret: "test-secret".into(),
            db_url: "sqlite::memory:".into(),
            rounds: 2,
            slippage_bps: 50,
            gas_reserve: 0.01,
            fund_base_amount: 0.25,
            fund_token_amount: 5.0,
            basis: default_basis_assets(),
            routers: default_router_candidates(),
        }
    }
}

/// Default basis table: wrapped native + stablecoin pair, stablecoin hop.
fn default_basis_assets() -> Vec<BasisAsset> {
    vec![
        BasisAsset {
            symbol: "WAVAX".into(),
            address: "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7".into(),
            decimals: 18,
            native: true,
            params: AssetParams { min: 0.01, max: 0.05 },
        },
        BasisAsset {
            symbol: "USDC".into(),
            address: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E".into(),
            decimals: 6,
            native: false,
            params: AssetParams { min: 0.01, max: 1.0 },
        },
        BasisAsset {
            symbol: "USDT".into(),
            address: "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7".into(),
            decimals: 6,
            native: false,
            params: AssetParams { min: 0.01, max: 1.0 },
        },
    ]
}

/// Default router candidates in priority order: LB v2.2, LB v2.1, AMM v1.
fn default_router_candidates() -> Vec<RouterCandidate> {
    vec![
        RouterCandidate {
            name: "lb-router-v22".into(),
            address: "0x18556DA13313f3532c54711497A8FedAC273220E".into(),
            quoter: Some("0x9A550a522BBaDFB69019b0432800Ed17855A51C3".into()),
            protocol: ProtocolKind::LbV22,
        },
        RouterCandidate {
            name: "lb-router-v21".into(),
            address: "0xb4315e873dBcf96Ffd0acd8EA43f689D8c20fB30".into(),
            quoter: Some("0x64b57F4249aA99a812212cee7DAEFEDC40B203cD".into()),
            protocol: ProtocolKind::LbV21,
        },
        RouterCandidate {
            name: "amm-router-v1".into(),
            address: "0x60aE616a2155Ee3d9A68541Ba4544862310933d4".into(),
            quoter: None,
            protocol: ProtocolKind::AmmV1,
        },
    ]
}

fn require_var(name: &str) -> Result<String> {
    env::var(name).map_err(|_| {
        tracing::error!("{name} environment variable is required but not found");
        EngineError::InvalidConfiguration {
            message: format!("{name} environment variable is required"),
        }
        .into()
    })
}

fn parse_var<T: FromStr + Copy>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            EngineError::InvalidConfiguration {
                message: format!("Invalid {name} value: {raw}"),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}

/// Parse and validate a private key from a string.
///
/// Accepts an optional `0x` prefix; the key must be 64 hex characters.
pub fn parse_and_validate_private_key(key_str: &str, var_name: &str) -> Result<PrivateKeySigner> {
    let clean_key = key_str.trim_start_matches("0x");

    if clean_key.len() != 64 {
        return Err(EngineError::InvalidConfiguration {
            message: format!("{var_name} must be 64 hex characters (32 bytes)"),
        }
        .into());
    }

    if !clean_key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EngineError::InvalidConfiguration {
            message: format!("{var_name} contains invalid hex characters"),
        }
        .into());
    }

    PrivateKeySigner::from_str(clean_key).map_err(|e| {
        EngineError::InvalidConfiguration {
            message: format!("Failed to parse {var_name}: {e}"),
        }
        .into()
    })
}
