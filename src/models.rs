use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use ethers_core::types::{Address, U64};
use serde::{Deserialize, Serialize, Serializer};

pub type BlockNumber = u64;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("wallet address must start with 0x")]
    MissingPrefix,
    #[error("wallet address must be 42 characters long, got {0}")]
    BadLength(usize),
    #[error("wallet address is not valid hex")]
    NotHex,
}

/// A 20-byte account address. Case is dropped on parse, so two spellings of
/// the same address compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletAddress(Address);

impl WalletAddress {
    /// Whether a raw `from` field off the wire names this wallet. Senders
    /// that are not a well-formed address never match.
    pub fn matches(&self, sender: &str) -> bool {
        let Some(hex) = sender.strip_prefix("0x").or_else(|| sender.strip_prefix("0X")) else {
            return false;
        };
        hex.len() == 40 && Address::from_str(hex).is_ok_and(|address| address == self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = AddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let Some(hex) = raw.strip_prefix("0x") else {
            return Err(AddressError::MissingPrefix);
        };
        if raw.len() != 42 {
            return Err(AddressError::BadLength(raw.len()));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::NotHex);
        }
        let address = Address::from_str(hex).map_err(|_| AddressError::NotHex)?;
        Ok(Self(address))
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl Serialize for WalletAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    pub timestamp: U64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FullBlock {
    pub timestamp: U64,
    #[serde(default)]
    pub transactions: Vec<TransactionSender>,
}

impl FullBlock {
    pub fn count_sent_by(&self, wallet: &WalletAddress) -> u64 {
        self.transactions
            .iter()
            .filter(|tx| tx.from.as_deref().is_some_and(|from| wallet.matches(from)))
            .count() as u64
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionSender {
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub wallet: WalletAddress,
    pub start_block: BlockNumber,
    pub latest_block: BlockNumber,
    pub blocks_scanned: u64,
    pub transactions: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}
