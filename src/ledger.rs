//! Chain access capability and its alloy-backed implementation.
//!
//! The [`Ledger`] trait is the only doorway between the trading core and the
//! chain: balance and allowance reads, nonce and gas-price reads, bytecode
//! probes, call simulation, signed submission, inclusion waits, and
//! protocol-specific exact-input quoting. Every component takes the trait, so
//! the whole engine runs against [`mock::MockLedger`] in tests.
//!
//! [`RpcLedger`] implements the trait over an alloy HTTP provider. It is
//! stateless; submission builds a wallet-filled provider per signer, which
//! keeps nonce and gas filling with alloy while the funding manager can still
//! pin explicit nonces on the request.

use crate::errors::{Result, RouteError};
use crate::router::{ProtocolKind, RouterConfig};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::time::Duration;

/// Contract interfaces the engine talks to, one module per protocol.
pub mod abi {
    /// Minimal ERC-20 surface: balances, allowances, transfers.
    pub mod erc20 {
        alloy::sol! {
            interface IERC20 {
                function balanceOf(address owner) external view returns (uint256);
                function allowance(address owner, address spender) external view returns (uint256);
                function transfer(address to, uint256 amount) external returns (bool);
                function approve(address spender, uint256 amount) external returns (bool);
            }
        }
    }

    /// Two-leg AMM router (V1): flat address-array paths.
    pub mod amm_v1 {
        alloy::sol! {
            interface IAmmRouter {
                function getAmountsOut(uint256 amountIn, address[] memory path) external view returns (uint256[] memory amounts);
                function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] memory path, address to, uint256 deadline) external returns (uint256[] memory amounts);
                function swapExactAVAXForTokens(uint256 amountOutMin, address[] memory path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
                function swapExactTokensForAVAX(uint256 amountIn, uint256 amountOutMin, address[] memory path, address to, uint256 deadline) external returns (uint256[] memory amounts);
            }
        }
    }

    /// Liquidity-Book router and quoter: bin-step structured paths.
    /// Enum-typed fields are declared as uint8, which matches the canonical
    /// ABI encoding and selectors of the deployed contracts.
    pub mod lb {
        alloy::sol! {
            struct LbPath {
                uint256[] pairBinSteps;
                uint8[] versions;
                address[] tokenPath;
            }

            interface ILbRouter {
                function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, LbPath memory path, address to, uint256 deadline) external returns (uint256 amountOut);
                function swapExactNATIVEForTokens(uint256 amountOutMin, LbPath memory path, address to, uint256 deadline) external payable returns (uint256 amountOut);
                function swapExactTokensForNATIVE(uint256 amountIn, uint256 amountOutMinNATIVE, LbPath memory path, address to, uint256 deadline) external returns (uint256 amountOut);
            }

            struct LbQuote {
                address[] route;
                address[] pairs;
                uint256[] binSteps;
                uint8[] versions;
                uint128[] amounts;
                uint128[] virtualAmountsWithoutSlippage;
                uint128[] fees;
            }

            interface ILbQuoter {
                function findBestPathFromAmountIn(address[] memory route, uint128 amountIn) external view returns (LbQuote memory quote);
            }
        }
    }
}

/// Result of an exact-input quote for one candidate path.
///
/// Liquidity-Book quotes carry per-hop bin steps and pair versions; the
/// executor reuses them verbatim when it builds the structured swap call.
/// V1 quotes leave both vectors empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuote {
    pub amount_out: U256,
    pub bin_steps: Vec<U256>,
    pub versions: Vec<u8>,
}

/// Outcome of waiting for a submitted transaction to be mined.
#[derive(Debug, Clone, Copy)]
pub struct InclusionReceipt {
    pub tx_hash: TxHash,
    pub status: bool,
    pub block_number: Option<u64>,
}

/// Read/write primitives against the chain. Pure capability, no state.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Native base-asset balance of an address.
    async fn native_balance(&self, owner: Address) -> Result<U256>;

    /// ERC-20 balance of `owner` on `token`.
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;

    /// ERC-20 allowance granted by `owner` to `spender` on `token`.
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    /// Next nonce for an address.
    async fn nonce(&self, owner: Address) -> Result<u64>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<u128>;

    /// Deployed bytecode at an address; empty for EOAs and dead addresses.
    async fn bytecode(&self, address: Address) -> Result<Bytes>;

    /// Simulate a call without spending gas. Reverts surface as errors.
    async fn simulate(&self, tx: &TransactionRequest) -> Result<Bytes>;

    /// Sign with `signer` and broadcast. Returns the transaction hash without
    /// waiting for inclusion.
    async fn submit(&self, tx: TransactionRequest, signer: &PrivateKeySigner) -> Result<TxHash>;

    /// Block until the transaction is mined and report its status.
    async fn wait_for_inclusion(&self, tx_hash: TxHash) -> Result<InclusionReceipt>;

    /// Protocol-specific exact-input quote for a token path through `router`.
    async fn quote_exact_in(
        &self,
        router: &RouterConfig,
        path: &[Address],
        amount_in: U256,
    ) -> Result<PathQuote>;
}

/// [`Ledger`] implementation over an alloy HTTP provider.
pub struct RpcLedger {
    url: url::Url,
    provider: DynProvider,
}

impl RpcLedger {
    /// Connect a read provider to the given HTTP RPC endpoint.
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let url = url::Url::parse(rpc_url)
            .map_err(|e| anyhow::anyhow!("invalid RPC URL '{rpc_url}': {e}"))?;
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();
        tracing::debug!(rpc_url, "Connected RPC ledger");
        Ok(Self { url, provider })
    }

    /// Build a provider with signing and fill layers for one signer.
    fn wallet_provider(&self, signer: &PrivateKeySigner) -> DynProvider {
        ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_http(self.url.clone())
            .erased()
    }

    async fn call_contract(&self, to: Address, data: Vec<u8>) -> Result<Bytes> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(data);
        Ok(self.provider.call(tx).await?)
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn native_balance(&self, owner: Address) -> Result<U256> {
        Ok(self.provider.get_balance(owner).await?)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let data = abi::erc20::IERC20::balanceOfCall { owner }.abi_encode();
        let out = self.call_contract(token, data).await?;
        Ok(abi::erc20::IERC20::balanceOfCall::abi_decode_returns(&out)?)
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let data = abi::erc20::IERC20::allowanceCall { owner, spender }.abi_encode();
        let out = self.call_contract(token, data).await?;
        Ok(abi::erc20::IERC20::allowanceCall::abi_decode_returns(&out)?)
    }

    async fn nonce(&self, owner: Address) -> Result<u64> {
        Ok(self.provider.get_transaction_count(owner).await?)
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn bytecode(&self, address: Address) -> Result<Bytes> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn simulate(&self, tx: &TransactionRequest) -> Result<Bytes> {
        Ok(self.provider.call(tx.clone()).await?)
    }

    async fn submit(&self, tx: TransactionRequest, signer: &PrivateKeySigner) -> Result<TxHash> {
        let provider = self.wallet_provider(signer);
        let pending = provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();
        tracing::debug!(%tx_hash, signer = %signer.address(), "Transaction submitted");
        Ok(tx_hash)
    }

    async fn wait_for_inclusion(&self, tx_hash: TxHash) -> Result<InclusionReceipt> {
        const POLL_INTERVAL: Duration = Duration::from_secs(2);
        const MAX_POLLS: u32 = 90;

        for _ in 0..MAX_POLLS {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                return Ok(InclusionReceipt {
                    tx_hash,
                    status: receipt.status(),
                    block_number: receipt.block_number,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Err(anyhow::anyhow!("transaction {tx_hash} not mined after {MAX_POLLS} polls").into())
    }

    async fn quote_exact_in(
        &self,
        router: &RouterConfig,
        path: &[Address],
        amount_in: U256,
    ) -> Result<PathQuote> {
        match router.protocol {
            ProtocolKind::AmmV1 => {
                let data = abi::amm_v1::IAmmRouter::getAmountsOutCall {
                    amountIn: amount_in,
                    path: path.to_vec(),
                }
                .abi_encode();
                let out = self.call_contract(router.address, data).await?;
                let amounts =
                    abi::amm_v1::IAmmRouter::getAmountsOutCall::abi_decode_returns(&out)?;
                let amount_out = amounts.last().copied().ok_or_else(|| {
                    RouteError::QuoteFailed {
                        path: format_path(path),
                        reason: "router returned no amounts".into(),
                    }
                })?;
                Ok(PathQuote {
                    amount_out,
                    bin_steps: Vec::new(),
                    versions: Vec::new(),
                })
            }
            ProtocolKind::LbV21 | ProtocolKind::LbV22 => {
                let quoter = router.quoter.ok_or_else(|| RouteError::QuoteFailed {
                    path: format_path(path),
                    reason: format!("no quoter configured for router {}", router.name),
                })?;
                let amount_in_u128: u128 =
                    amount_in.try_into().map_err(|_| RouteError::QuoteFailed {
                        path: format_path(path),
                        reason: "amount exceeds uint128 quoter range".into(),
                    })?;
                let data = abi::lb::ILbQuoter::findBestPathFromAmountInCall {
                    route: path.to_vec(),
                    amountIn: amount_in_u128,
                }
                .abi_encode();
                let out = self.call_contract(quoter, data).await?;
                let quote =
                    abi::lb::ILbQuoter::findBestPathFromAmountInCall::abi_decode_returns(&out)?;
                let amount_out = quote.amounts.last().copied().unwrap_or(0);
                if amount_out == 0 {
                    return Err(RouteError::QuoteFailed {
                        path: format_path(path),
                        reason: "quoter returned zero output".into(),
                    }
                    .into());
                }
                Ok(PathQuote {
                    amount_out: U256::from(amount_out),
                    bin_steps: quote.binSteps,
                    versions: quote.versions,
                })
            }
        }
    }
}

/// Target address of a call-style request, if any.
pub fn tx_target(tx: &TransactionRequest) -> Option<Address> {
    match tx.to {
        Some(alloy::primitives::TxKind::Call(addr)) => Some(addr),
        _ => None,
    }
}

fn format_path(path: &[Address]) -> String {
    path.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory ledger for unit tests: tracks balances, applies decoded
    //! native and ERC-20 transfers on submission, serves canned quotes, and
    //! supports failure injection per target address.

    use super::*;
    use alloy::primitives::B256;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockState {
        native: HashMap<Address, U256>,
        tokens: HashMap<(Address, Address), U256>,
        allowances: HashMap<(Address, Address, Address), U256>,
        code: HashMap<Address, Bytes>,
        quotes: HashMap<Vec<Address>, U256>,
        nonces: HashMap<Address, u64>,
        fail_targets: HashSet<Address>,
        submitted: Vec<TransactionRequest>,
        next_hash: u64,
    }

    #[derive(Default)]
    pub struct MockLedger {
        state: Mutex<MockState>,
    }

    impl MockLedger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_native(&self, owner: Address, amount: U256) {
            self.state.lock().unwrap().native.insert(owner, amount);
        }

        pub fn set_token(&self, token: Address, owner: Address, amount: U256) {
            self.state
                .lock()
                .unwrap()
                .tokens
                .insert((token, owner), amount);
        }

        pub fn set_code(&self, address: Address, code: &[u8]) {
            self.state
                .lock()
                .unwrap()
                .code
                .insert(address, Bytes::copy_from_slice(code));
        }

        /// Register a quote for an exact token path.
        pub fn set_quote(&self, path: &[Address], amount_out: U256) {
            self.state
                .lock()
                .unwrap()
                .quotes
                .insert(path.to_vec(), amount_out);
        }

        /// Make every simulation and submission targeting `address` fail.
        pub fn fail_calls_to(&self, address: Address) {
            self.state.lock().unwrap().fail_targets.insert(address);
        }

        pub fn clear_failures(&self) {
            self.state.lock().unwrap().fail_targets.clear();
        }

        pub fn submitted_count(&self) -> usize {
            self.state.lock().unwrap().submitted.len()
        }

        pub fn submitted(&self) -> Vec<TransactionRequest> {
            self.state.lock().unwrap().submitted.clone()
        }

        fn apply_transfer(state: &mut MockState, tx: &TransactionRequest, from: Address) {
            let to = match tx_target(tx) {
                Some(to) => to,
                None => return,
            };
            let input = tx.input.input().cloned().unwrap_or_default();

            // Plain value transfer.
            if input.is_empty() {
                let value = tx.value.unwrap_or_default();
                let src = state.native.entry(from).or_default();
                *src = src.saturating_sub(value);
                *state.native.entry(to).or_default() += value;
                return;
            }

            // ERC-20 transfer: `to` is the token contract.
            if let Ok(call) = abi::erc20::IERC20::transferCall::abi_decode(&input) {
                let src = state.tokens.entry((to, from)).or_default();
                *src = src.saturating_sub(call.amount);
                *state.tokens.entry((to, call.to)).or_default() += call.amount;
                return;
            }

            if let Ok(call) = abi::erc20::IERC20::approveCall::abi_decode(&input) {
                state
                    .allowances
                    .insert((to, from, call.spender), call.amount);
            }
        }
    }

    #[async_trait]
    impl Ledger for MockLedger {
        async fn native_balance(&self, owner: Address) -> Result<U256> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .native
                .get(&owner)
                .copied()
                .unwrap_or_default())
        }

        async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .tokens
                .get(&(token, owner))
                .copied()
                .unwrap_or_default())
        }

        async fn allowance(
            &self,
            token: Address,
            owner: Address,
            spender: Address,
        ) -> Result<U256> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .allowances
                .get(&(token, owner, spender))
                .copied()
                .unwrap_or_default())
        }

        async fn nonce(&self, owner: Address) -> Result<u64> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .nonces
                .get(&owner)
                .copied()
                .unwrap_or_default())
        }

        async fn gas_price(&self) -> Result<u128> {
            Ok(25_000_000_000)
        }

        async fn bytecode(&self, address: Address) -> Result<Bytes> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .code
                .get(&address)
                .cloned()
                .unwrap_or_default())
        }

        async fn simulate(&self, tx: &TransactionRequest) -> Result<Bytes> {
            let state = self.state.lock().unwrap();
            if let Some(to) = tx_target(tx) {
                if state.fail_targets.contains(&to) {
                    return Err(RouteError::SimulationReverted {
                        reason: format!("mock revert at {to}"),
                    }
                    .into());
                }
            }
            Ok(Bytes::new())
        }

        async fn submit(
            &self,
            tx: TransactionRequest,
            signer: &PrivateKeySigner,
        ) -> Result<TxHash> {
            let mut state = self.state.lock().unwrap();
            if let Some(to) = tx_target(&tx) {
                if state.fail_targets.contains(&to) {
                    return Err(RouteError::SubmissionFailed {
                        reason: format!("mock rejection at {to}"),
                    }
                    .into());
                }
            }
            let from = signer.address();
            Self::apply_transfer(&mut state, &tx, from);
            *state.nonces.entry(from).or_default() += 1;
            state.submitted.push(tx);
            state.next_hash += 1;
            let hash = B256::from(U256::from(state.next_hash).to_be_bytes::<32>());
            Ok(hash)
        }

        async fn wait_for_inclusion(&self, tx_hash: TxHash) -> Result<InclusionReceipt> {
            Ok(InclusionReceipt {
                tx_hash,
                status: true,
                block_number: Some(1),
            })
        }

        async fn quote_exact_in(
            &self,
            _router: &RouterConfig,
            path: &[Address],
            _amount_in: U256,
        ) -> Result<PathQuote> {
            let state = self.state.lock().unwrap();
            match state.quotes.get(path) {
                Some(amount_out) => {
                    let hops = path.len().saturating_sub(1);
                    Ok(PathQuote {
                        amount_out: *amount_out,
                        bin_steps: vec![U256::from(25); hops],
                        versions: vec![2; hops],
                    })
                }
                None => Err(RouteError::QuoteFailed {
                    path: format_path(path),
                    reason: "no liquidity".into(),
                }
                .into()),
            }
        }
    }
}
