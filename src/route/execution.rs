//! Trade execution against the selected router.
//!
//! The executor turns a [`RoutePlan`] into a protocol-specific swap call:
//! Liquidity-Book routers get the structured multi-hop path (bin steps and
//! pair versions straight from the quote), the V1 AMM router gets the flat
//! address array. Every call is simulated before submission to catch reverts
//! without spending gas, and carries an on-chain deadline.
//!
//! If the active router's attempt fails and a fallback router was recorded at
//! selection time, the executor retries this one trade there (soft fallback);
//! the process-wide active router never changes mid-run.

use crate::errors::{Result, RouteError};
use crate::ledger::{abi, Ledger, PathQuote};
use crate::route::RoutePlan;
use crate::router::{ProtocolKind, RouterConfig, RouterSelection};
use crate::store::{TradeRecord, TradeStore};
use crate::utils::{deadline_in, to_display_units, unix_now};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use std::sync::Arc;

/// On-chain expiry of a swap call, seconds from now.
const DEADLINE_SECS: u64 = 300;

pub struct TradeExecutor {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn TradeStore>,
    selection: RouterSelection,
    slippage_bps: u64,
}

impl TradeExecutor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn TradeStore>,
        selection: RouterSelection,
        slippage_bps: u64,
    ) -> Self {
        Self {
            ledger,
            store,
            selection,
            slippage_bps,
        }
    }

    /// Execute a planned trade with this wallet's signer.
    ///
    /// On success the trade is appended to the store (best-effort; the chain
    /// result is authoritative) and an audit line is written. On failure the
    /// error is logged and re-raised so the engine decides whether to skip.
    pub async fn execute(
        &self,
        plan: &RoutePlan,
        signer: &PrivateKeySigner,
    ) -> Result<TradeRecord> {
        match self
            .attempt(&self.selection.active, plan, &plan.quote, signer)
            .await
        {
            Ok(record) => Ok(record),
            Err(primary_err) => {
                let Some(fallback) = &self.selection.fallback else {
                    tracing::error!(
                        router = %self.selection.active.name,
                        error = %primary_err,
                        "Trade failed with no fallback router"
                    );
                    return Err(primary_err);
                };
                tracing::warn!(
                    active = %self.selection.active.name,
                    fallback = %fallback.name,
                    error = %primary_err,
                    "Active router trade failed, retrying this trade on fallback"
                );
                let quote = match self
                    .ledger
                    .quote_exact_in(fallback, &plan.addresses(), plan.amount_in)
                    .await
                {
                    Ok(quote) => quote,
                    Err(e) => {
                        tracing::error!(error = %e, "Fallback quote failed");
                        return Err(primary_err);
                    }
                };
                self.attempt(fallback, plan, &quote, signer).await
            }
        }
    }

    async fn attempt(
        &self,
        router: &RouterConfig,
        plan: &RoutePlan,
        quote: &PathQuote,
        signer: &PrivateKeySigner,
    ) -> Result<TradeRecord> {
        let wallet = signer.address();
        let token_in = plan.token_in();
        let token_out = plan.token_out();

        let min_out = quote.amount_out * U256::from(10_000 - self.slippage_bps)
            / U256::from(10_000);
        let deadline = deadline_in(DEADLINE_SECS);

        if !token_in.native {
            self.ensure_allowance(router, token_in.address, wallet, plan.amount_in, signer)
                .await?;
        }

        let tx = build_swap_call(router, plan, quote, min_out, wallet, deadline);

        self.ledger.simulate(&tx).await.map_err(|e| {
            tracing::warn!(
                router = %router.name,
                from = %token_in.symbol,
                to = %token_out.symbol,
                error = %e,
                "Swap simulation reverted"
            );
            e
        })?;

        let tx_hash = self
            .ledger
            .submit(tx, signer)
            .await
            .map_err(|e| RouteError::SubmissionFailed {
                reason: e.to_string(),
            })?;
        let receipt = self.ledger.wait_for_inclusion(tx_hash).await?;
        if !receipt.status {
            return Err(RouteError::TradeReverted {
                tx_hash: tx_hash.to_string(),
            }
            .into());
        }

        let record = TradeRecord {
            tx_hash: tx_hash.to_string(),
            wallet: wallet.to_string(),
            from_symbol: token_in.symbol.clone(),
            to_symbol: token_out.symbol.clone(),
            amount_from: to_display_units(plan.amount_in, token_in.decimals)?,
            amount_to: to_display_units(quote.amount_out, token_out.decimals)?,
            unix_time: unix_now(),
        };

        // The trade already happened on-chain; a persistence failure is
        // reported but does not fail the trade.
        if let Err(e) = self.store.insert_trade(&record).await {
            tracing::warn!(error = %e, tx_hash = %record.tx_hash, "Trade record insert failed");
        }

        tracing::info!(
            tx_hash = %record.tx_hash,
            wallet = %record.wallet,
            from = %record.from_symbol,
            to = %record.to_symbol,
            amount_from = record.amount_from,
            amount_to = record.amount_to,
            router = %router.name,
            "Trade executed"
        );
        Ok(record)
    }

    /// Grant the router an unlimited allowance once per wallet/token when the
    /// current allowance does not cover the trade.
    async fn ensure_allowance(
        &self,
        router: &RouterConfig,
        token: Address,
        owner: Address,
        amount_in: U256,
        signer: &PrivateKeySigner,
    ) -> Result<()> {
        let current = self.ledger.allowance(token, owner, router.address).await?;
        if current >= amount_in {
            return Ok(());
        }

        let tx = TransactionRequest::default()
            .with_from(owner)
            .with_to(token)
            .with_input(
                abi::erc20::IERC20::approveCall {
                    spender: router.address,
                    amount: U256::MAX,
                }
                .abi_encode(),
            );
        let tx_hash =
            self.ledger
                .submit(tx, signer)
                .await
                .map_err(|e| RouteError::ApprovalFailed {
                    token: token.to_string(),
                    router: router.address.to_string(),
                    reason: e.to_string(),
                })?;
        let receipt = self.ledger.wait_for_inclusion(tx_hash).await?;
        if !receipt.status {
            return Err(RouteError::ApprovalFailed {
                token: token.to_string(),
                router: router.address.to_string(),
                reason: format!("approval {tx_hash} reverted"),
            }
            .into());
        }
        tracing::debug!(%token, router = %router.name, "Allowance granted");
        Ok(())
    }
}

/// Build the protocol-specific swap transaction.
fn build_swap_call(
    router: &RouterConfig,
    plan: &RoutePlan,
    quote: &PathQuote,
    min_out: U256,
    recipient: Address,
    deadline: U256,
) -> TransactionRequest {
    let token_in = plan.token_in();
    let token_out = plan.token_out();
    let addresses = plan.addresses();

    let mut tx = TransactionRequest::default()
        .with_from(recipient)
        .with_to(router.address);

    match router.protocol {
        ProtocolKind::LbV21 | ProtocolKind::LbV22 => {
            let path = abi::lb::LbPath {
                pairBinSteps: quote.bin_steps.clone(),
                versions: quote.versions.clone(),
                tokenPath: addresses,
            };
            if token_in.native {
                tx = tx
                    .with_value(plan.amount_in)
                    .with_input(
                        abi::lb::ILbRouter::swapExactNATIVEForTokensCall {
                            amountOutMin: min_out,
                            path,
                            to: recipient,
                            deadline,
                        }
                        .abi_encode(),
                    );
            } else if token_out.native {
                tx = tx.with_input(
                    abi::lb::ILbRouter::swapExactTokensForNATIVECall {
                        amountIn: plan.amount_in,
                        amountOutMinNATIVE: min_out,
                        path,
                        to: recipient,
                        deadline,
                    }
                    .abi_encode(),
                );
            } else {
                tx = tx.with_input(
                    abi::lb::ILbRouter::swapExactTokensForTokensCall {
                        amountIn: plan.amount_in,
                        amountOutMin: min_out,
                        path,
                        to: recipient,
                        deadline,
                    }
                    .abi_encode(),
                );
            }
        }
        ProtocolKind::AmmV1 => {
            if token_in.native {
                tx = tx
                    .with_value(plan.amount_in)
                    .with_input(
                        abi::amm_v1::IAmmRouter::swapExactAVAXForTokensCall {
                            amountOutMin: min_out,
                            path: addresses,
                            to: recipient,
                            deadline,
                        }
                        .abi_encode(),
                    );
            } else if token_out.native {
                tx = tx.with_input(
                    abi::amm_v1::IAmmRouter::swapExactTokensForAVAXCall {
                        amountIn: plan.amount_in,
                        amountOutMin: min_out,
                        path: addresses,
                        to: recipient,
                        deadline,
                    }
                    .abi_encode(),
                );
            } else {
                tx = tx.with_input(
                    abi::amm_v1::IAmmRouter::swapExactTokensForTokensCall {
                        amountIn: plan.amount_in,
                        amountOutMin: min_out,
                        path: addresses,
                        to: recipient,
                        deadline,
                    }
                    .abi_encode(),
                );
            }
        }
    }

    tx
}
