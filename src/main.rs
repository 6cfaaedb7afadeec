mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use indicatif::ProgressBar;

use daily_tx_counter::{
    api::{self, AppState},
    config::Config,
    eth::EthClient,
    models::{BlockNumber, WalletAddress},
    scanner::{self, ScanProgress},
};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let client = EthClient::new(&config.eth_rpc_url, config.rpc_timeout, config.retry.clone())?;

    match cli.command {
        Commands::Serve { addr } => {
            let bind = addr.unwrap_or_else(|| config.http_bind_addr.clone());
            let state = AppState {
                chain: Arc::new(client),
                scan: config.scan,
            };
            api::run_http_server(&bind, state).await?;
        }
        Commands::Count {
            wallet,
            batch_size,
            concurrency,
        } => {
            let wallet: WalletAddress = wallet
                .parse()
                .with_context(|| format!("invalid wallet address {:?}", wallet))?;
            let mut options = config.scan;
            if let Some(n) = batch_size {
                options.batch_size = n.max(1);
            }
            if let Some(n) = concurrency {
                options.concurrency = n.max(1);
            }

            tracing::info!(%wallet, rpc = %client.rpc().url(), "checking today's transactions");
            let bar = BlockBar(ProgressBar::new(0));
            let outcome =
                scanner::count_todays_transactions_with_progress(&client, &wallet, options, &bar)
                    .await;
            bar.0.finish_and_clear();
            let result = outcome.context("scan failed")?;
            println!(
                "Wallet {} made {} transaction(s) today (blocks {}..={}, {:.1}s)",
                result.wallet,
                result.transactions,
                result.start_block,
                result.latest_block,
                result.elapsed.as_secs_f64()
            );
        }
    }

    Ok(())
}

/// Terminal progress bar over the blocks of a scan.
struct BlockBar(ProgressBar);

impl ScanProgress for BlockBar {
    fn range_resolved(&self, start: BlockNumber, latest: BlockNumber) {
        self.0.set_length((latest + 1).saturating_sub(start));
    }

    fn batch_scanned(&self, blocks: u64) {
        self.0.inc(blocks);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
