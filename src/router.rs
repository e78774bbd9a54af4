//! Startup selection of the active liquidity router.
//!
//! Candidates are probed in priority order and the first live contract wins.
//! The selection is made once per process and never revisited: if the active
//! router later stops working the run keeps failing trades until restart
//! (documented limitation, no dynamic re-routing). The next valid candidate
//! is remembered as a soft fallback the executor may use for a single trade.

use crate::errors::{Result, RouterError};
use crate::ledger::Ledger;
use crate::utils::parse_address;
use alloy::primitives::Address;

/// The closed set of supported router protocols, in the order the default
/// candidate list prefers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ProtocolKind {
    /// Liquidity-Book router, v2.2 deployment.
    LbV22,
    /// Liquidity-Book router, v2.1 deployment.
    LbV21,
    /// Classic two-leg AMM router.
    AmmV1,
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolKind::LbV22 => write!(f, "LB v2.2"),
            ProtocolKind::LbV21 => write!(f, "LB v2.1"),
            ProtocolKind::AmmV1 => write!(f, "AMM v1"),
        }
    }
}

/// An unvalidated router candidate as it appears in configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RouterCandidate {
    pub name: String,
    pub address: String,
    pub quoter: Option<String>,
    pub protocol: ProtocolKind,
}

/// A validated router the process trades through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub name: String,
    pub address: Address,
    pub quoter: Option<Address>,
    pub protocol: ProtocolKind,
}

/// The outcome of startup router selection.
///
/// `active` is immutable for the rest of the run. `fallback` is the next
/// valid candidate by priority, used only for per-trade soft fallback.
#[derive(Debug, Clone)]
pub struct RouterSelection {
    pub active: RouterConfig,
    pub fallback: Option<RouterConfig>,
}

/// Validate one candidate: well-formed non-zero address with deployed code.
async fn validate_candidate(
    ledger: &dyn Ledger,
    candidate: &RouterCandidate,
) -> std::result::Result<RouterConfig, RouterError> {
    let address = parse_address(&candidate.address).map_err(|_| RouterError::MalformedAddress {
        name: candidate.name.clone(),
        input: candidate.address.clone(),
    })?;
    if address == Address::ZERO {
        return Err(RouterError::ZeroAddress {
            name: candidate.name.clone(),
        });
    }

    let quoter = match &candidate.quoter {
        Some(raw) => Some(parse_address(raw).map_err(|_| RouterError::MalformedAddress {
            name: candidate.name.clone(),
            input: raw.clone(),
        })?),
        None => None,
    };

    let code = ledger
        .bytecode(address)
        .await
        .map_err(|e| RouterError::ProbeFailed {
            name: candidate.name.clone(),
            reason: e.to_string(),
        })?;
    if code.is_empty() {
        return Err(RouterError::ProbeFailed {
            name: candidate.name.clone(),
            reason: "no bytecode at address".into(),
        });
    }

    Ok(RouterConfig {
        name: candidate.name.clone(),
        address,
        quoter,
        protocol: candidate.protocol,
    })
}

/// Select the highest-priority valid router among `candidates`.
///
/// Candidate order encodes priority. Invalid candidates are logged and
/// skipped; if none validate, the startup must abort with
/// [`RouterError::NoRouterAvailable`]. Deterministic for a fixed set of
/// validity results.
pub async fn select_router(
    ledger: &dyn Ledger,
    candidates: &[RouterCandidate],
) -> Result<RouterSelection> {
    let mut active: Option<RouterConfig> = None;
    let mut fallback: Option<RouterConfig> = None;

    for candidate in candidates {
        match validate_candidate(ledger, candidate).await {
            Ok(config) => {
                if active.is_none() {
                    tracing::info!(
                        router = %config.name,
                        address = %config.address,
                        protocol = %config.protocol,
                        "Selected active router"
                    );
                    active = Some(config);
                } else if fallback.is_none() {
                    tracing::info!(
                        router = %config.name,
                        protocol = %config.protocol,
                        "Recorded fallback router"
                    );
                    fallback = Some(config);
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(router = %candidate.name, error = %e, "Router candidate rejected");
            }
        }
    }

    match active {
        Some(active) => Ok(RouterSelection { active, fallback }),
        None => Err(RouterError::NoRouterAvailable {
            candidates: candidates.len(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use alloy::primitives::address;

    const ROUTER_A: &str = "0x1111111111111111111111111111111111111111";
    const ROUTER_B: &str = "0x2222222222222222222222222222222222222222";

    fn candidate(name: &str, addr: &str, protocol: ProtocolKind) -> RouterCandidate {
        RouterCandidate {
            name: name.into(),
            address: addr.into(),
            quoter: None,
            protocol,
        }
    }

    #[tokio::test]
    async fn test_first_valid_candidate_wins() {
        let ledger = MockLedger::new();
        ledger.set_code(
            address!("1111111111111111111111111111111111111111"),
            &[0x60, 0x60],
        );
        ledger.set_code(
            address!("2222222222222222222222222222222222222222"),
            &[0x60, 0x60],
        );

        let candidates = vec![
            candidate("lb22", ROUTER_A, ProtocolKind::LbV22),
            candidate("v1", ROUTER_B, ProtocolKind::AmmV1),
        ];
        let selection = select_router(&ledger, &candidates).await.unwrap();
        assert_eq!(selection.active.name, "lb22");
        assert_eq!(selection.fallback.unwrap().name, "v1");
    }

    #[tokio::test]
    async fn test_invalid_then_valid_returns_valid() {
        let ledger = MockLedger::new();
        // No code at ROUTER_A, code only at ROUTER_B.
        ledger.set_code(
            address!("2222222222222222222222222222222222222222"),
            &[0x60],
        );

        let candidates = vec![
            candidate("dead", ROUTER_A, ProtocolKind::LbV22),
            candidate("live", ROUTER_B, ProtocolKind::AmmV1),
        ];
        let selection = select_router(&ledger, &candidates).await.unwrap();
        assert_eq!(selection.active.name, "live");
        assert!(selection.fallback.is_none());
    }

    #[tokio::test]
    async fn test_no_valid_candidate_is_fatal() {
        let ledger = MockLedger::new();
        let candidates = vec![
            candidate("dead1", ROUTER_A, ProtocolKind::LbV22),
            candidate("dead2", ROUTER_B, ProtocolKind::AmmV1),
        ];
        let err = select_router(&ledger, &candidates).await.unwrap_err();
        assert!(matches!(
            err,
            crate::CarouselError::Router(RouterError::NoRouterAvailable { candidates: 2 })
        ));
    }

    #[tokio::test]
    async fn test_zero_and_malformed_addresses_rejected() {
        let ledger = MockLedger::new();
        ledger.set_code(
            address!("2222222222222222222222222222222222222222"),
            &[0x60],
        );

        let candidates = vec![
            candidate(
                "zero",
                "0x0000000000000000000000000000000000000000",
                ProtocolKind::LbV22,
            ),
            candidate("garbage", "0xnot-hex", ProtocolKind::LbV21),
            candidate("live", ROUTER_B, ProtocolKind::AmmV1),
        ];
        let selection = select_router(&ledger, &candidates).await.unwrap();
        assert_eq!(selection.active.name, "live");
    }

    #[tokio::test]
    async fn test_selection_is_deterministic_across_calls() {
        let ledger = MockLedger::new();
        ledger.set_code(
            address!("1111111111111111111111111111111111111111"),
            &[0x60],
        );
        let candidates = vec![
            candidate("lb22", ROUTER_A, ProtocolKind::LbV22),
            candidate("v1", ROUTER_B, ProtocolKind::AmmV1),
        ];

        let first = select_router(&ledger, &candidates).await.unwrap();
        let second = select_router(&ledger, &candidates).await.unwrap();
        assert_eq!(first.active, second.active);
    }
}
