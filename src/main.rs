//! Command-line entry point for the trade carousel.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use trade_carousel::accounts::{AccountRegistry, EncryptedKeyFile, KeystreamCipher};
use trade_carousel::config::CarouselConfig;
use trade_carousel::errors::Result;
use trade_carousel::ledger::RpcLedger;
use trade_carousel::store::SqliteTradeStore;
use trade_carousel::CarouselEngine;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Round-robin volume trading over a managed wallet pool", long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the configured number of trading rounds over the wallet pool.
    Run,

    /// Create, fund, and persist a fresh pool of managed wallets.
    Provision {
        #[clap(long, default_value_t = 5, help = "Number of wallets to create")]
        count: usize,
    },

    /// Sweep all managed wallets back to the operator.
    Teardown,

    /// Execute a single swap from the operator wallet.
    Swap {
        #[clap(long, help = "Input token symbol (e.g., WAVAX)")]
        from: String,
        #[clap(long, help = "Output token symbol (e.g., USDC)")]
        to: String,
        #[clap(long, help = "Exact input amount in display units")]
        amount: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trade_carousel=info".parse().unwrap())
                .add_directive("carousel=info".parse().unwrap()),
        )
        .compact()
        .with_file(false)
        .with_line_number(false)
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = CarouselConfig::from_env()?;

    let ledger = Arc::new(RpcLedger::connect(&config.rpc_url)?);
    let store = Arc::new(SqliteTradeStore::connect(&config.db_url).await?);

    let key_file = EncryptedKeyFile::new(
        &config.key_file,
        Box::new(KeystreamCipher::new(&config.key_secret)),
    );

    // Provisioning starts from an empty pool; every other command needs the
    // stored wallet keys up front.
    let registry = match args.command {
        Command::Provision { .. } => AccountRegistry::empty(config.operator_key.clone()),
        _ => AccountRegistry::load(config.operator_key.clone(), &key_file)?,
    };

    let mut engine = CarouselEngine::new(config, ledger, store.clone(), registry).await?;

    match args.command {
        Command::Run => {
            tracing::info!("Starting carousel run");
            let summary = engine.run().await?;
            tracing::info!(%summary, "Run complete");
        }
        Command::Provision { count } => {
            let result = engine.provision_wallets(count).await;
            if let Err(e) = store.close().await {
                tracing::warn!(error = %e, "Trade store close failed");
            }
            result?;
        }
        Command::Teardown => {
            let result = engine.teardown_wallets().await;
            if let Err(e) = store.close().await {
                tracing::warn!(error = %e, "Trade store close failed");
            }
            result?;
        }
        Command::Swap { from, to, amount } => {
            let result = engine.swap_exact(&from, &to, amount).await;
            if let Err(e) = store.close().await {
                tracing::warn!(error = %e, "Trade store close failed");
            }
            let tx_hash = result?;
            tracing::info!(%tx_hash, from, to, amount, "Swap executed");
        }
    }

    Ok(())
}
