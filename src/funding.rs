//! Wallet funding and teardown transfers.
//!
//! `fund` moves a native amount and a token amount from the operator to a
//! managed wallet as two independent transactions pinned to consecutive
//! operator nonces (N, N+1). Both are broadcast before either confirms; the
//! chain orders them by nonce. There is no rollback if the second leg fails:
//! the error reports which leg broke and the caller compensates (the
//! provisioning workflow sweeps with `defund_all` and re-raises).
//!
//! The nonce for the second leg is N+1 without re-reading after the first
//! submission. If another process submits from the operator account
//! concurrently this can collide; the engine's strictly sequential awaits are
//! the operating assumption, not a guarantee against outside submitters.

use crate::errors::funding::FundLeg;
use crate::errors::{FundingError, Result};
use crate::ledger::{abi, Ledger};
use crate::utils::{to_base_units, to_display_units};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use std::sync::Arc;

/// Gas units of a plain native transfer.
const TRANSFER_GAS: u128 = 21_000;

/// Transaction hashes of the two funding legs.
#[derive(Debug, Clone, Copy)]
pub struct FundReceipt {
    pub base_tx: TxHash,
    pub token_tx: TxHash,
}

/// Moves funds between the operator and managed wallets.
pub struct FundingManager {
    ledger: Arc<dyn Ledger>,
    operator: PrivateKeySigner,
    /// ERC-20 token of the second funding leg and of defund sweeps.
    token: Address,
    /// Native amount left behind on defund, display units.
    gas_reserve: f64,
}

impl FundingManager {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        operator: PrivateKeySigner,
        token: Address,
        gas_reserve: f64,
    ) -> Self {
        Self {
            ledger,
            operator,
            token,
            gas_reserve,
        }
    }

    /// Transfer `base_amount` native units and `token_amount` token base
    /// units from the operator to `account`.
    ///
    /// Fire-and-report: a failed leg surfaces as
    /// [`FundingError::LegFailed`]; the other leg is not rolled back.
    pub async fn fund(
        &self,
        account: Address,
        base_amount: U256,
        token_amount: U256,
    ) -> Result<FundReceipt> {
        let operator = self.operator.address();

        let available = self.ledger.native_balance(operator).await?;
        if available < base_amount {
            return Err(FundingError::InsufficientOperatorBalance {
                available: available.to_string(),
                requested: base_amount.to_string(),
            }
            .into());
        }

        let nonce = self.ledger.nonce(operator).await?;
        tracing::info!(
            %account,
            %base_amount,
            %token_amount,
            nonce,
            "Funding managed wallet"
        );

        let base_leg = TransactionRequest::default()
            .with_from(operator)
            .with_to(account)
            .with_value(base_amount)
            .with_nonce(nonce);
        let token_leg = TransactionRequest::default()
            .with_from(operator)
            .with_to(self.token)
            .with_input(
                abi::erc20::IERC20::transferCall {
                    to: account,
                    amount: token_amount,
                }
                .abi_encode(),
            )
            .with_nonce(nonce + 1);

        let base_tx = self
            .ledger
            .submit(base_leg, &self.operator)
            .await
            .map_err(|e| FundingError::LegFailed {
                leg: FundLeg::Base,
                account,
                reason: e.to_string(),
            })?;
        let token_tx = self
            .ledger
            .submit(token_leg, &self.operator)
            .await
            .map_err(|e| FundingError::LegFailed {
                leg: FundLeg::Token,
                account,
                reason: e.to_string(),
            })?;

        for (leg, tx_hash) in [(FundLeg::Base, base_tx), (FundLeg::Token, token_tx)] {
            let receipt = self.ledger.wait_for_inclusion(tx_hash).await?;
            if !receipt.status {
                return Err(FundingError::LegFailed {
                    leg,
                    account,
                    reason: format!("transaction {tx_hash} reverted"),
                }
                .into());
            }
        }

        tracing::info!(%account, %base_tx, %token_tx, "Wallet funded");
        Ok(FundReceipt { base_tx, token_tx })
    }

    /// Sweep a managed wallet back to the operator.
    ///
    /// Transfers the full token balance if positive, then the native balance
    /// minus `reserve + estimated fee` if it exceeds that threshold. The
    /// reserve check runs before any subtraction, so a negative transfer
    /// amount can never be constructed.
    pub async fn defund(&self, signer: &PrivateKeySigner) -> Result<()> {
        let account = signer.address();
        let operator = self.operator.address();

        let token_balance = self.ledger.token_balance(self.token, account).await?;
        if token_balance > U256::ZERO {
            let tx = TransactionRequest::default()
                .with_from(account)
                .with_to(self.token)
                .with_input(
                    abi::erc20::IERC20::transferCall {
                        to: operator,
                        amount: token_balance,
                    }
                    .abi_encode(),
                );
            let tx_hash = self.ledger.submit(tx, signer).await.map_err(|e| {
                FundingError::DefundFailed {
                    account,
                    reason: format!("token sweep: {e}"),
                }
            })?;
            let receipt = self.ledger.wait_for_inclusion(tx_hash).await?;
            if !receipt.status {
                return Err(FundingError::TransferReverted {
                    account,
                    tx_hash: tx_hash.to_string(),
                }
                .into());
            }
            tracing::info!(%account, %token_balance, %tx_hash, "Token balance swept");
        }

        let native_balance = self.ledger.native_balance(account).await?;
        let fee = U256::from(self.ledger.gas_price().await? * TRANSFER_GAS);
        let reserve = to_base_units(self.gas_reserve, 18)?;
        let threshold = reserve + fee;

        if native_balance <= threshold {
            tracing::debug!(
                %account,
                %native_balance,
                %threshold,
                "Native balance within reserve, nothing to sweep"
            );
            return Ok(());
        }

        let sweep = native_balance - threshold;
        let tx = TransactionRequest::default()
            .with_from(account)
            .with_to(operator)
            .with_value(sweep);
        let tx_hash = self.ledger.submit(tx, signer).await.map_err(|e| {
            FundingError::DefundFailed {
                account,
                reason: format!("native sweep: {e}"),
            }
        })?;
        let receipt = self.ledger.wait_for_inclusion(tx_hash).await?;
        if !receipt.status {
            return Err(FundingError::TransferReverted {
                account,
                tx_hash: tx_hash.to_string(),
            }
            .into());
        }

        tracing::info!(
            %account,
            swept = %to_display_units(sweep, 18).unwrap_or_default(),
            %tx_hash,
            "Native balance swept"
        );
        Ok(())
    }

    /// Best-effort sweep over a set of wallets; failures are logged and do
    /// not stop the remaining sweeps. Used when a provisioning run aborts.
    pub async fn defund_all(&self, signers: &[PrivateKeySigner]) {
        for signer in signers {
            if let Err(e) = self.defund(signer).await {
                tracing::error!(
                    account = %signer.address(),
                    error = %e,
                    "Defund sweep failed, continuing"
                );
            }
        }
    }
}
