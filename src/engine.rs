//! The round-robin trading engine.
//!
//! A run is a batch job: validate configuration, select the router once,
//! then iterate the managed wallets strictly sequentially for a fixed number
//! of rounds. Each visit reads the wallet's held-asset balance, marks
//! exhaustion below the tradeable floor, refunds the wallet once both assets
//! are dry, or picks a bounded-random amount, plans a route, and trades.
//! A successful trade flips the held asset (0 <-> 1); any per-trade failure
//! leaves the wallet state untouched and the round moves on.
//!
//! The engine owns the persistence sink's lifecycle: the connection is
//! handed in open and closed exactly once when the run ends, error or not.

use crate::accounts::{AccountRegistry, EncryptedKeyFile, KeystreamCipher, ManagedAccount};
use crate::config::{CarouselConfig, TRADE_FLOOR};
use crate::errors::{EngineError, Result};
use crate::funding::FundingManager;
use crate::ledger::Ledger;
use crate::route::{RoutePlanner, Token, TradeExecutor};
use crate::router::{select_router, RouterSelection};
use crate::store::TradeStore;
use crate::utils::{to_base_units, to_display_units};
use alloy::primitives::U256;
use rand::Rng;
use std::sync::Arc;

/// Gas units of a plain native transfer, used for spendable headroom.
const TRANSFER_GAS: u128 = 21_000;

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: u32,
    pub trades_attempted: u32,
    pub trades_executed: u32,
    pub trades_failed: u32,
    pub funding_events: u32,
    pub skipped: u32,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rounds, {}/{} trades executed ({} failed), {} funding events, {} skips",
            self.rounds,
            self.trades_executed,
            self.trades_attempted,
            self.trades_failed,
            self.funding_events,
            self.skipped
        )
    }
}

/// Orchestrates router selection, routing, execution, and funding over the
/// wallet pool.
pub struct CarouselEngine {
    config: CarouselConfig,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn TradeStore>,
    registry: AccountRegistry,
    selection: RouterSelection,
    planner: RoutePlanner,
    executor: TradeExecutor,
    funding: FundingManager,
    basis: Vec<Token>,
}

impl CarouselEngine {
    /// Validate configuration, select the router, and wire the components.
    ///
    /// Fails fast on invalid asset bounds or when no router candidate is a
    /// live contract; no wallet state is touched in either case.
    pub async fn new(
        config: CarouselConfig,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn TradeStore>,
        registry: AccountRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let basis = config
            .basis
            .iter()
            .map(Token::from_basis)
            .collect::<Result<Vec<_>>>()?;

        let selection = select_router(ledger.as_ref(), &config.routers).await?;

        let planner = RoutePlanner::new(ledger.clone(), basis.clone());
        let executor = TradeExecutor::new(
            ledger.clone(),
            store.clone(),
            selection.clone(),
            config.slippage_bps,
        );
        let funding = FundingManager::new(
            ledger.clone(),
            registry.operator.clone(),
            basis[1].address,
            config.gas_reserve,
        );

        Ok(Self {
            config,
            ledger,
            store,
            registry,
            selection,
            planner,
            executor,
            funding,
            basis,
        })
    }

    pub fn selection(&self) -> &RouterSelection {
        &self.selection
    }

    pub fn accounts(&self) -> &[ManagedAccount] {
        &self.registry.accounts
    }

    /// Run the configured number of rounds over the wallet pool.
    ///
    /// The store is closed when the run ends regardless of the outcome.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let result = self.run_rounds().await;
        if let Err(e) = self.store.close().await {
            tracing::warn!(error = %e, "Trade store close failed");
        }
        match &result {
            Ok(summary) => tracing::info!(%summary, "Carousel run finished"),
            Err(e) => tracing::error!(error = %e, "Carousel run aborted"),
        }
        result
    }

    async fn run_rounds(&mut self) -> Result<RunSummary> {
        if self.registry.accounts.is_empty() {
            return Err(EngineError::NoManagedAccounts.into());
        }

        let mut summary = RunSummary::default();
        for round in 0..self.config.rounds {
            tracing::info!(round, accounts = self.registry.accounts.len(), "Starting round");
            for idx in 0..self.registry.accounts.len() {
                self.step_account(idx, &mut summary).await?;
            }
            summary.rounds += 1;
        }
        Ok(summary)
    }

    /// One wallet visit: exhaustion bookkeeping, optional refund, or a trade.
    ///
    /// Only funding-level and chain-connectivity failures propagate; trade
    /// and routing failures are recorded and skipped.
    async fn step_account(&mut self, idx: usize, summary: &mut RunSummary) -> Result<()> {
        let (address, signer, held) = {
            let account = &self.registry.accounts[idx];
            (account.address, account.signer.clone(), account.held_asset)
        };
        if held > 1 {
            return Err(EngineError::InvalidHeldAssetIndex { index: held }.into());
        }

        let held_token = self.basis[held].clone();
        let other_token = self.basis[1 - held].clone();
        let spendable = self.spendable_balance(address, &held_token).await?;

        if spendable < TRADE_FLOOR {
            tracing::info!(
                wallet = %address,
                asset = %held_token.symbol,
                spendable,
                "Held asset below floor, marking exhausted"
            );
            let account = &mut self.registry.accounts[idx];
            account.mark_exhausted(&held_token.symbol);
            // Try the other asset on the next visit.
            account.flip_held_asset();
            summary.skipped += 1;

            if account.fully_exhausted() {
                tracing::info!(wallet = %address, "Both assets exhausted, refunding wallet");
                let base_amount = to_base_units(self.config.fund_base_amount, 18)?;
                let token_amount =
                    to_base_units(self.config.fund_token_amount, self.basis[1].decimals)?;
                match self.funding.fund(address, base_amount, token_amount).await {
                    Ok(_) => {
                        summary.funding_events += 1;
                        self.registry.accounts[idx].clear_exhausted();
                    }
                    Err(e) => {
                        // Operator-side shortfalls defer the refund; the
                        // wallet stays pending and is retried next cycle.
                        tracing::error!(wallet = %address, error = %e, "Refund failed");
                    }
                }
            }
            return Ok(());
        }

        let params = self.config.basis[held].params;
        let upper = params.max.min(spendable);
        let amount = if params.min > upper {
            TRADE_FLOOR
        } else {
            rand::thread_rng().gen_range(params.min..=upper)
        };
        let amount_in = to_base_units(amount, held_token.decimals)?;

        summary.trades_attempted += 1;
        let plan = match self
            .planner
            .plan(&self.selection.active, amount_in, &held_token, &other_token)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(
                    wallet = %address,
                    from = %held_token.symbol,
                    to = %other_token.symbol,
                    error = %e,
                    "No route for this trade, skipping account"
                );
                summary.trades_failed += 1;
                return Ok(());
            }
        };

        match self.executor.execute(&plan, &signer).await {
            Ok(_) => {
                // Alternation on success only; a failed trade leaves the
                // held asset unchanged for the next cycle's retry.
                self.registry.accounts[idx].flip_held_asset();
                summary.trades_executed += 1;
            }
            Err(e) => {
                tracing::warn!(wallet = %address, error = %e, "Trade failed, skipping account");
                summary.trades_failed += 1;
            }
        }
        Ok(())
    }

    /// Balance of `token` that the wallet can actually put into a trade, in
    /// display units. Native balances reserve gas headroom first.
    async fn spendable_balance(&self, address: alloy::primitives::Address, token: &Token) -> Result<f64> {
        if token.native {
            let balance = self.ledger.native_balance(address).await?;
            let fee = U256::from(self.ledger.gas_price().await? * TRANSFER_GAS);
            let reserve = to_base_units(self.config.gas_reserve, 18)?;
            let spendable = balance.saturating_sub(reserve + fee);
            to_display_units(spendable, token.decimals)
        } else {
            let balance = self.ledger.token_balance(token.address, address).await?;
            to_display_units(balance, token.decimals)
        }
    }

    /// Create and fund `count` fresh wallets, then write the encrypted key
    /// file.
    ///
    /// Wallets are recorded in the store as they are created. If any funding
    /// transfer fails, the wallets already funded in this run are swept back
    /// to the operator (best-effort) and the error re-raised.
    pub async fn provision_wallets(&mut self, count: usize) -> Result<()> {
        let mut created = Vec::with_capacity(count);

        for i in 0..count {
            let account = ManagedAccount::generate();
            tracing::info!(wallet = %account.address, n = i + 1, count, "Provisioning wallet");

            if let Err(e) = self
                .store
                .insert_trader(&account.key_hex(), &account.address.to_string())
                .await
            {
                tracing::warn!(error = %e, "Trader record insert failed");
            }

            let base_amount = to_base_units(self.config.fund_base_amount, 18)?;
            let token_amount =
                to_base_units(self.config.fund_token_amount, self.basis[1].decimals)?;
            match self.funding.fund(account.address, base_amount, token_amount).await {
                Ok(_) => {
                    created.push(account.signer.clone());
                    self.registry.accounts.push(account);
                }
                Err(e) => {
                    tracing::error!(
                        wallet = %account.address,
                        error = %e,
                        "Funding failed mid-provisioning, sweeping created wallets"
                    );
                    self.funding.defund_all(&created).await;
                    return Err(e);
                }
            }
        }

        let key_file = EncryptedKeyFile::new(
            &self.config.key_file,
            Box::new(KeystreamCipher::new(&self.config.key_secret)),
        );
        key_file.store_keys(&self.registry.export_keys())?;
        tracing::info!(wallets = count, "Provisioning complete");
        Ok(())
    }

    /// Sweep every managed wallet back to the operator, best-effort.
    pub async fn teardown_wallets(&self) -> Result<()> {
        let signers: Vec<_> = self
            .registry
            .accounts
            .iter()
            .map(|a| a.signer.clone())
            .collect();
        tracing::info!(wallets = signers.len(), "Tearing down wallet pool");
        self.funding.defund_all(&signers).await;
        Ok(())
    }

    /// One-shot convenience: plan and execute a single swap from the
    /// operator wallet. Returns the transaction hash.
    pub async fn swap_exact(
        &self,
        symbol_in: &str,
        symbol_out: &str,
        amount: f64,
    ) -> Result<String> {
        let token_in = self.planner.token_by_symbol(symbol_in)?;
        let token_out = self.planner.token_by_symbol(symbol_out)?;
        let amount_in = to_base_units(amount, token_in.decimals)?;

        let plan = self
            .planner
            .plan(&self.selection.active, amount_in, &token_in, &token_out)
            .await?;
        let record = self.executor.execute(&plan, &self.registry.operator).await?;
        Ok(record.tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountRegistry;
    use crate::ledger::mock::MockLedger;
    use crate::ledger::tx_target;
    use crate::store::memory::MemoryTradeStore;
    use crate::utils::parse_address;
    use alloy::signers::local::PrivateKeySigner;

    const WAVAX: &str = "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7";
    const USDC: &str = "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E";
    const LB22_ROUTER: &str = "0x18556DA13313f3532c54711497A8FedAC273220E";

    const ONE_AVAX: u128 = 1_000_000_000_000_000_000;

    struct Fixture {
        ledger: Arc<MockLedger>,
        store: Arc<MemoryTradeStore>,
        config: CarouselConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let ledger = Arc::new(MockLedger::new());
            // Only the highest-priority router is live.
            ledger.set_code(parse_address(LB22_ROUTER).unwrap(), &[0x60, 0x60]);

            let mut config = CarouselConfig::for_testing();
            config.rounds = 1;
            Self {
                ledger,
                store: Arc::new(MemoryTradeStore::new()),
                config,
            }
        }

        fn set_quotes(&self) {
            let wavax = parse_address(WAVAX).unwrap();
            let usdc = parse_address(USDC).unwrap();
            // 0.5 USDC out per trade, 0.02 WAVAX out per reverse trade.
            self.ledger.set_quote(&[wavax, usdc], U256::from(500_000u64));
            self.ledger
                .set_quote(&[usdc, wavax], U256::from(ONE_AVAX / 50));
        }

        fn rich_account(&self) -> ManagedAccount {
            let account = ManagedAccount::generate();
            self.ledger
                .set_native(account.address, U256::from(ONE_AVAX));
            self.ledger.set_token(
                parse_address(USDC).unwrap(),
                account.address,
                U256::from(1_000_000u64),
            );
            account
        }

        async fn engine(&self, accounts: Vec<ManagedAccount>) -> CarouselEngine {
            let mut registry = AccountRegistry::empty(PrivateKeySigner::random());
            registry.accounts = accounts;
            CarouselEngine::new(
                self.config.clone(),
                self.ledger.clone(),
                self.store.clone(),
                registry,
            )
            .await
            .unwrap()
        }
    }

    #[tokio::test]
    async fn test_startup_fails_on_invalid_bounds_before_touching_wallets() {
        let fixture = Fixture::new();
        let mut config = fixture.config.clone();
        config.basis[0].params.min = 0.001;

        let registry = AccountRegistry::empty(PrivateKeySigner::random());
        let result = CarouselEngine::new(
            config,
            fixture.ledger.clone(),
            fixture.store.clone(),
            registry,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(fixture.ledger.submitted_count(), 0);
    }

    #[tokio::test]
    async fn test_startup_fails_without_live_router() {
        let ledger = Arc::new(MockLedger::new());
        let store = Arc::new(MemoryTradeStore::new());
        let registry = AccountRegistry::empty(PrivateKeySigner::random());

        let result =
            CarouselEngine::new(CarouselConfig::for_testing(), ledger, store, registry).await;
        assert!(matches!(
            result.unwrap_err(),
            crate::CarouselError::Router(crate::errors::RouterError::NoRouterAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_successful_round_flips_held_asset_and_bounds_amount() {
        let fixture = Fixture::new();
        fixture.set_quotes();
        let mut account = fixture.rich_account();
        account.held_asset = 0;

        let mut engine = fixture.engine(vec![account]).await;
        let summary = engine.run().await.unwrap();

        assert_eq!(summary.trades_executed, 1);
        assert_eq!(engine.accounts()[0].held_asset, 1);

        // The submitted swap's native value stays inside [min, max].
        let swap = fixture
            .ledger
            .submitted()
            .into_iter()
            .find(|tx| tx_target(tx) == Some(parse_address(LB22_ROUTER).unwrap()))
            .expect("a swap was submitted");
        let value = swap.value.unwrap();
        assert!(value >= U256::from(ONE_AVAX / 100), "amount >= 0.01");
        assert!(value <= U256::from(ONE_AVAX / 20), "amount <= 0.05");
    }

    #[tokio::test]
    async fn test_alternation_over_many_rounds() {
        let mut fixture = Fixture::new();
        fixture.config.rounds = 4;
        fixture.set_quotes();
        let mut account = fixture.rich_account();
        account.held_asset = 1;
        let initial = account.held_asset;

        let mut engine = fixture.engine(vec![account]).await;
        let summary = engine.run().await.unwrap();

        assert_eq!(summary.trades_executed, 4);
        assert_eq!(
            engine.accounts()[0].held_asset,
            (initial + summary.trades_executed as usize) % 2
        );
    }

    #[tokio::test]
    async fn test_failed_trade_leaves_state_unchanged() {
        let fixture = Fixture::new();
        fixture.set_quotes();
        // The router rejects everything: simulation reverts on each trade.
        fixture
            .ledger
            .fail_calls_to(parse_address(LB22_ROUTER).unwrap());
        let mut account = fixture.rich_account();
        account.held_asset = 0;

        let mut engine = fixture.engine(vec![account]).await;
        let summary = engine.run().await.unwrap();

        assert_eq!(summary.trades_failed, 1);
        assert_eq!(summary.trades_executed, 0);
        assert_eq!(engine.accounts()[0].held_asset, 0);
    }

    #[tokio::test]
    async fn test_exhausted_wallet_is_refunded_exactly_once() {
        let mut fixture = Fixture::new();
        fixture.config.rounds = 3;
        fixture.set_quotes();

        // Wallet dry on both assets; operator can cover the refund.
        let mut account = ManagedAccount::generate();
        account.held_asset = 0;
        let wallet = account.address;

        let mut registry = AccountRegistry::empty(PrivateKeySigner::random());
        let operator = registry.operator.address();
        fixture
            .ledger
            .set_native(operator, U256::from(10 * ONE_AVAX));
        fixture.ledger.set_token(
            parse_address(USDC).unwrap(),
            operator,
            U256::from(100_000_000u64),
        );
        registry.accounts = vec![account];

        let mut engine = CarouselEngine::new(
            fixture.config.clone(),
            fixture.ledger.clone(),
            fixture.store.clone(),
            registry,
        )
        .await
        .unwrap();
        let summary = engine.run().await.unwrap();

        // Round 1 marks asset 0, round 2 marks asset 1 and funds, round 3
        // trades off the fresh balance.
        assert_eq!(summary.funding_events, 1);
        assert!(engine.accounts()[0].exhausted.is_empty());
        assert!(summary.trades_executed >= 1);
        assert!(
            fixture.ledger.native_balance(wallet).await.unwrap() > U256::ZERO,
            "refund reached the wallet"
        );
    }

    #[tokio::test]
    async fn test_run_closes_store_even_on_failure() {
        let fixture = Fixture::new();
        // No accounts: the run errors out immediately.
        let mut engine = fixture.engine(vec![]).await;
        assert!(engine.run().await.is_err());
        assert!(*fixture.store.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_provisioning_failure_sweeps_created_wallets() {
        let fixture = Fixture::new();
        let mut config = fixture.config.clone();
        let dir = tempfile::tempdir().unwrap();
        config.key_file = dir.path().join("wallets.enc");

        let registry = AccountRegistry::empty(PrivateKeySigner::random());
        let operator = registry.operator.address();
        // Enough native for one funding leg only.
        fixture
            .ledger
            .set_native(operator, U256::from(3 * ONE_AVAX / 10));
        fixture.ledger.set_token(
            parse_address(USDC).unwrap(),
            operator,
            U256::from(100_000_000u64),
        );

        let mut engine = CarouselEngine::new(
            config,
            fixture.ledger.clone(),
            fixture.store.clone(),
            registry,
        )
        .await
        .unwrap();

        let err = engine.provision_wallets(2).await.unwrap_err();
        assert!(matches!(err, crate::CarouselError::Funding(_)));

        // The first wallet was created, then swept back below the reserve.
        assert_eq!(engine.accounts().len(), 1);
        let wallet = engine.accounts()[0].address;
        let fee = U256::from(25_000_000_000u128 * 21_000);
        let reserve = to_base_units(0.01, 18).unwrap();
        assert!(fixture.ledger.native_balance(wallet).await.unwrap() <= reserve + fee);
    }

    #[tokio::test]
    async fn test_provisioning_writes_key_file_and_trader_records() {
        let fixture = Fixture::new();
        let mut config = fixture.config.clone();
        let dir = tempfile::tempdir().unwrap();
        config.key_file = dir.path().join("wallets.enc");

        let registry = AccountRegistry::empty(PrivateKeySigner::random());
        let operator = registry.operator.address();
        fixture
            .ledger
            .set_native(operator, U256::from(10 * ONE_AVAX));
        fixture.ledger.set_token(
            parse_address(USDC).unwrap(),
            operator,
            U256::from(100_000_000u64),
        );

        let mut engine = CarouselEngine::new(
            config.clone(),
            fixture.ledger.clone(),
            fixture.store.clone(),
            registry,
        )
        .await
        .unwrap();
        engine.provision_wallets(2).await.unwrap();

        assert_eq!(engine.accounts().len(), 2);
        assert_eq!(fixture.store.traders.lock().unwrap().len(), 2);
        assert!(config.key_file.exists());

        // The stored keys decrypt back to the registry's accounts.
        let file = EncryptedKeyFile::new(
            &config.key_file,
            Box::new(KeystreamCipher::new(&config.key_secret)),
        );
        let keys = crate::accounts::KeyProvider::list_keys(&file).unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_swap_exact_returns_hash() {
        let fixture = Fixture::new();
        fixture.set_quotes();
        let engine = fixture.engine(vec![fixture.rich_account()]).await;
        let hash = engine.swap_exact("WAVAX", "USDC", 0.02).await.unwrap();
        assert!(!hash.is_empty());
        assert!(engine.swap_exact("WAVAX", "DOGE", 0.02).await.is_err());
    }

    #[tokio::test]
    async fn test_no_route_skips_account_without_submission() {
        let fixture = Fixture::new();
        // No quotes registered at all.
        let mut account = fixture.rich_account();
        account.held_asset = 0;

        let mut engine = fixture.engine(vec![account]).await;
        let summary = engine.run().await.unwrap();

        assert_eq!(summary.trades_failed, 1);
        assert_eq!(fixture.ledger.submitted_count(), 0);
        assert_eq!(engine.accounts()[0].held_asset, 0);
    }

    #[tokio::test]
    async fn test_teardown_sweeps_all_wallets() {
        let fixture = Fixture::new();
        let a = fixture.rich_account();
        let b = fixture.rich_account();
        let addresses = [a.address, b.address];

        let engine = fixture.engine(vec![a, b]).await;
        engine.teardown_wallets().await.unwrap();

        let fee = U256::from(25_000_000_000u128 * 21_000);
        let reserve = to_base_units(0.01, 18).unwrap();
        for address in addresses {
            assert!(fixture.ledger.native_balance(address).await.unwrap() <= reserve + fee);
            assert_eq!(
                fixture
                    .ledger
                    .token_balance(parse_address(USDC).unwrap(), address)
                    .await
                    .unwrap(),
                U256::ZERO
            );
        }
    }
}
