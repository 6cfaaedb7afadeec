use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide scan counters, served by the API's stats endpoint.
#[derive(Debug)]
pub struct ScanStats {
    scans: AtomicU64,
    failed_scans: AtomicU64,
    blocks: AtomicU64,
    batches: AtomicU64,
    batch_retries: AtomicU64,
    matched_transactions: AtomicU64,
}

impl Default for ScanStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanStats {
    pub const fn new() -> Self {
        Self {
            scans: AtomicU64::new(0),
            failed_scans: AtomicU64::new(0),
            blocks: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            batch_retries: AtomicU64::new(0),
            matched_transactions: AtomicU64::new(0),
        }
    }

    pub fn inc_scans(&self, n: u64) {
        self.scans.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_failed_scans(&self, n: u64) {
        self.failed_scans.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_blocks(&self, n: u64) {
        self.blocks.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_batches(&self, n: u64) {
        self.batches.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_batch_retries(&self, n: u64) {
        self.batch_retries.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_matched_transactions(&self, n: u64) {
        self.matched_transactions.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            failed_scans: self.failed_scans.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            batch_retries: self.batch_retries.load(Ordering::Relaxed),
            matched_transactions: self.matched_transactions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanSnapshot {
    pub scans: u64,
    pub failed_scans: u64,
    pub blocks: u64,
    pub batches: u64,
    pub batch_retries: u64,
    pub matched_transactions: u64,
}

pub static SCAN_STATS: ScanStats = ScanStats::new();
