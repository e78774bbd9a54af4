//! Route planning over the basis-token set.
//!
//! The path space is intentionally tiny: every unordered pair over
//! `{token_in, token_out} ∪ basis` is a potential hop, and with at most three
//! basis assets the full set of acyclic paths can be enumerated exhaustively.
//! Paths are generated in a fixed order (direct, then one-hop, then two-hop,
//! intermediates in table order), quoted through the active router, and the
//! best exact-input quote wins. Ties keep the first enumerated path, so
//! planning has no hidden randomness: the only randomized choice in the
//! system is the engine's trade amount.

pub mod execution;

pub use execution::TradeExecutor;

use crate::config::BasisAsset;
use crate::errors::{Result, RouteError};
use crate::ledger::{Ledger, PathQuote};
use crate::router::RouterConfig;
use crate::utils::parse_address;
use alloy::primitives::{Address, U256};
use itertools::Itertools;

/// A tradeable token with its chain identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    /// Wrapped native asset: swaps in and out use the router's native-leg
    /// call variants and the value field instead of an ERC-20 pull.
    pub native: bool,
}

impl Token {
    pub fn from_basis(asset: &BasisAsset) -> Result<Self> {
        Ok(Self {
            symbol: asset.symbol.clone(),
            address: parse_address(&asset.address)?,
            decimals: asset.decimals,
            native: asset.native,
        })
    }
}

/// A selected route with its winning quote. Derived, never persisted;
/// recomputed for every trade.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    /// Token path from input to output, length >= 2.
    pub path: Vec<Token>,
    /// Exact input amount in the input token's base units.
    pub amount_in: U256,
    /// Winning quote; carries bin steps and versions for structured routers.
    pub quote: PathQuote,
}

impl RoutePlan {
    pub fn token_in(&self) -> &Token {
        &self.path[0]
    }

    pub fn token_out(&self) -> &Token {
        self.path.last().expect("route plan has at least two tokens")
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.path.iter().map(|t| t.address).collect()
    }
}

/// Enumerate all acyclic token paths from `token_in` to `token_out` over the
/// pairwise combinations of `{token_in, token_out} ∪ basis`.
///
/// Order is deterministic: the direct path first, then one-hop paths with
/// intermediates in basis-table order, then two-hop paths over ordered
/// intermediate permutations.
pub fn enumerate_paths(token_in: &Token, token_out: &Token, basis: &[Token]) -> Vec<Vec<Token>> {
    let intermediates: Vec<&Token> = basis
        .iter()
        .filter(|t| t.address != token_in.address && t.address != token_out.address)
        .collect();

    let mut paths = vec![vec![token_in.clone(), token_out.clone()]];

    for hop in &intermediates {
        paths.push(vec![token_in.clone(), (*hop).clone(), token_out.clone()]);
    }

    for pair in intermediates.iter().permutations(2) {
        paths.push(vec![
            token_in.clone(),
            pair[0].clone(),
            pair[1].clone(),
            token_out.clone(),
        ]);
    }

    paths
}

/// Plans routes by quoting every candidate path and keeping the best.
pub struct RoutePlanner {
    ledger: std::sync::Arc<dyn Ledger>,
    basis: Vec<Token>,
}

impl RoutePlanner {
    pub fn new(ledger: std::sync::Arc<dyn Ledger>, basis: Vec<Token>) -> Self {
        Self { ledger, basis }
    }

    /// Resolve a basis token by its symbol.
    pub fn token_by_symbol(&self, symbol: &str) -> Result<Token> {
        self.basis
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .ok_or_else(|| {
                RouteError::UnknownToken {
                    symbol: symbol.to_string(),
                }
                .into()
            })
    }

    /// Quote every candidate path through `router` and select the one with
    /// the maximum output for this exact input.
    ///
    /// Paths that fail to quote (no liquidity, reverted simulation) are
    /// dropped, not fatal. If every path drops, the result is
    /// [`RouteError::NoViableRoute`] and no transaction is ever built.
    pub async fn plan(
        &self,
        router: &RouterConfig,
        amount_in: U256,
        token_in: &Token,
        token_out: &Token,
    ) -> Result<RoutePlan> {
        let candidates = enumerate_paths(token_in, token_out, &self.basis);
        tracing::debug!(
            from = %token_in.symbol,
            to = %token_out.symbol,
            candidates = candidates.len(),
            %amount_in,
            "Planning route"
        );

        let mut best: Option<RoutePlan> = None;
        for path in candidates {
            let addresses: Vec<Address> = path.iter().map(|t| t.address).collect();
            match self
                .ledger
                .quote_exact_in(router, &addresses, amount_in)
                .await
            {
                Ok(quote) => {
                    tracing::trace!(
                        hops = path.len() - 1,
                        amount_out = %quote.amount_out,
                        "Path quoted"
                    );
                    // Strict comparison keeps the first enumerated path on
                    // an exact tie.
                    let better = match &best {
                        Some(current) => quote.amount_out > current.quote.amount_out,
                        None => true,
                    };
                    if better {
                        best = Some(RoutePlan {
                            path,
                            amount_in,
                            quote,
                        });
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Path dropped from consideration");
                }
            }
        }

        best.ok_or_else(|| {
            RouteError::NoViableRoute {
                from: token_in.symbol.clone(),
                to: token_out.symbol.clone(),
            }
            .into()
        })
    }
}
