use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "daily-tx-counter",
    version,
    about = "Count the transactions a wallet sent today (UTC)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan today's blocks and print how many transactions WALLET sent
    Count {
        /// Wallet address, 0x followed by 40 hex characters
        wallet: String,
        /// Blocks per RPC batch (overrides SCAN_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Batches in flight at once (overrides SCAN_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Run the HTTP API server
    Serve {
        /// Override bind address, e.g. 0.0.0.0:8080
        #[arg(long)]
        addr: Option<String>,
    },
}
