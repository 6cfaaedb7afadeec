use chrono::{DateTime, Utc};

use crate::{eth::ChainSource, models::BlockNumber};

/// Unix time of 00:00:00 UTC on the day containing `now`.
pub fn start_of_utc_day(now: DateTime<Utc>) -> u64 {
    let midnight = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
    u64::try_from(midnight.timestamp()).unwrap_or(0)
}

/// Lowest block in `[0, latest]` whose timestamp is at or after `day_start`.
///
/// Binary search over block timestamps, so it relies on timestamps never
/// decreasing with block number; on a chain where that does not hold the
/// answer is unspecified. If no block reaches `day_start` the result is
/// `latest`.
///
/// A probe that fails or hits a block the node does not have yet ends the
/// search early with the best boundary seen so far.
pub async fn find_day_start_block<S>(source: &S, latest: BlockNumber, day_start: u64) -> BlockNumber
where
    S: ChainSource + ?Sized,
{
    let mut low: BlockNumber = 0;
    let mut high: BlockNumber = latest;
    let mut best = latest;
    let mut probes = 0u32;

    while low <= high {
        let mid = low + (high - low) / 2;
        probes += 1;
        let timestamp = match source.block_timestamp(mid).await {
            Ok(Some(ts)) => ts,
            Ok(None) => {
                tracing::warn!(block = mid, "probe block missing, stopping search at {}", best);
                break;
            }
            Err(err) => {
                tracing::warn!(block = mid, "probe failed, stopping search at {}: {}", best, err);
                break;
            }
        };

        if timestamp < day_start {
            low = mid + 1;
        } else {
            best = mid;
            if mid == 0 {
                break;
            }
            high = mid - 1;
        }
    }

    tracing::debug!(latest, day_start, probes, start_block = best, "resolved day boundary");
    best
}
