use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use futures_util::{stream, StreamExt, TryStreamExt};

use crate::{
    eth::ChainSource,
    models::{BlockNumber, ScanResult, WalletAddress},
    resolver::{find_day_start_block, start_of_utc_day},
    rpc::RpcError,
    scan_stats::SCAN_STATS,
};

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Blocks requested per RPC batch.
    pub batch_size: usize,
    /// Batches in flight at once.
    pub concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            concurrency: 1,
        }
    }
}

/// Hook for reporting scan progress. The scanner calls it, frontends decide
/// how to show it.
pub trait ScanProgress: Send + Sync {
    /// The block range about to be scanned is known.
    fn range_resolved(&self, _start: BlockNumber, _latest: BlockNumber) {}

    /// A batch of `blocks` blocks finished. Batches may complete out of order.
    fn batch_scanned(&self, _blocks: u64) {}
}

/// Progress hook that reports nothing.
pub struct NoProgress;

impl ScanProgress for NoProgress {}

/// Splits `[start, latest]` into consecutive inclusive sub-ranges of at most
/// `batch_size` blocks.
fn batch_ranges(
    start: BlockNumber,
    latest: BlockNumber,
    batch_size: usize,
) -> impl Iterator<Item = (BlockNumber, BlockNumber)> {
    let step = batch_size.max(1) as u64;
    let mut next = Some(start).filter(|s| *s <= latest);
    std::iter::from_fn(move || {
        let lo = next?;
        let hi = lo.saturating_add(step - 1).min(latest);
        next = hi.checked_add(1).filter(|n| *n <= latest);
        Some((lo, hi))
    })
}

/// Number of transactions sent by `wallet` in blocks `start..=latest`.
///
/// An empty range (`start > latest`) is zero without touching the source.
/// Any batch that cannot be fetched fails the whole count.
pub async fn count_in_range<S>(
    source: &S,
    wallet: &WalletAddress,
    start: BlockNumber,
    latest: BlockNumber,
    options: ScanOptions,
) -> Result<u64, RpcError>
where
    S: ChainSource + ?Sized,
{
    count_in_range_with_progress(source, wallet, start, latest, options, &NoProgress).await
}

/// [`count_in_range`], reporting each finished batch to `progress`.
pub async fn count_in_range_with_progress<S>(
    source: &S,
    wallet: &WalletAddress,
    start: BlockNumber,
    latest: BlockNumber,
    options: ScanOptions,
    progress: &dyn ScanProgress,
) -> Result<u64, RpcError>
where
    S: ChainSource + ?Sized,
{
    if start > latest {
        return Ok(0);
    }

    let total_blocks = latest - start + 1;
    let done = AtomicU64::new(0);
    let done = &done;

    stream::iter(batch_ranges(start, latest, options.batch_size))
        .map(|(lo, hi)| async move {
            let numbers: Vec<BlockNumber> = (lo..=hi).collect();
            let blocks = source.blocks_with_transactions(&numbers).await?;

            let matched: u64 = blocks
                .iter()
                .flatten()
                .map(|block| block.count_sent_by(wallet))
                .sum();
            let missing = blocks.iter().filter(|b| b.is_none()).count();

            SCAN_STATS.inc_batches(1);
            SCAN_STATS.inc_blocks(numbers.len() as u64);
            let size = numbers.len() as u64;
            progress.batch_scanned(size);
            let scanned = done.fetch_add(size, Ordering::Relaxed) + size;
            tracing::info!(
                from = lo,
                to = hi,
                matched,
                missing,
                "scanned {}/{} blocks",
                scanned,
                total_blocks
            );
            Ok::<u64, RpcError>(matched)
        })
        .buffer_unordered(options.concurrency.max(1))
        .try_fold(0u64, |acc, matched| async move { Ok::<u64, RpcError>(acc + matched) })
        .await
}

/// Resolves the first block at or after `day_start`, then counts `wallet`'s
/// transactions from there to the current head.
pub async fn count_transactions_since<S>(
    source: &S,
    wallet: &WalletAddress,
    day_start: u64,
    options: ScanOptions,
) -> Result<ScanResult, RpcError>
where
    S: ChainSource + ?Sized,
{
    count_transactions_since_with_progress(source, wallet, day_start, options, &NoProgress).await
}

pub async fn count_transactions_since_with_progress<S>(
    source: &S,
    wallet: &WalletAddress,
    day_start: u64,
    options: ScanOptions,
    progress: &dyn ScanProgress,
) -> Result<ScanResult, RpcError>
where
    S: ChainSource + ?Sized,
{
    let started = Instant::now();
    SCAN_STATS.inc_scans(1);

    let outcome = async {
        let latest_block = source.latest_block_number().await?;
        let start_block = find_day_start_block(source, latest_block, day_start).await;
        tracing::info!(%wallet, start_block, latest_block, "scanning blocks");
        progress.range_resolved(start_block, latest_block);
        let transactions = count_in_range_with_progress(
            source,
            wallet,
            start_block,
            latest_block,
            options,
            progress,
        )
        .await?;
        Ok::<_, RpcError>((start_block, latest_block, transactions))
    }
    .await;

    let (start_block, latest_block, transactions) = match outcome {
        Ok(v) => v,
        Err(err) => {
            SCAN_STATS.inc_failed_scans(1);
            return Err(err);
        }
    };
    SCAN_STATS.inc_matched_transactions(transactions);

    let result = ScanResult {
        wallet: *wallet,
        start_block,
        latest_block,
        blocks_scanned: (latest_block + 1).saturating_sub(start_block),
        transactions,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        %wallet,
        transactions,
        elapsed_secs = result.elapsed.as_secs_f64(),
        "scan finished"
    );
    Ok(result)
}

/// Transactions `wallet` sent since 00:00 UTC today.
pub async fn count_todays_transactions<S>(
    source: &S,
    wallet: &WalletAddress,
    options: ScanOptions,
) -> Result<ScanResult, RpcError>
where
    S: ChainSource + ?Sized,
{
    count_todays_transactions_with_progress(source, wallet, options, &NoProgress).await
}

pub async fn count_todays_transactions_with_progress<S>(
    source: &S,
    wallet: &WalletAddress,
    options: ScanOptions,
    progress: &dyn ScanProgress,
) -> Result<ScanResult, RpcError>
where
    S: ChainSource + ?Sized,
{
    let day_start = start_of_utc_day(Utc::now());
    count_transactions_since_with_progress(source, wallet, day_start, options, progress).await
}
