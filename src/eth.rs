use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers_core::types::U64;
use serde_json::{json, Value};
use url::Url;

use crate::{
    models::{BlockHeader, BlockNumber, FullBlock},
    rpc::{RetryPolicy, RpcCall, RpcClient, RpcError},
};

/// Read access to a chain, as much of it as the counter needs.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn latest_block_number(&self) -> Result<BlockNumber, RpcError>;

    /// `Ok(None)` when the node does not know the block yet.
    async fn block_timestamp(&self, number: BlockNumber) -> Result<Option<u64>, RpcError>;

    /// Full blocks for `numbers`, in the same order. Blocks the node does not
    /// have come back as `None`.
    async fn blocks_with_transactions(
        &self,
        numbers: &[BlockNumber],
    ) -> Result<Vec<Option<FullBlock>>, RpcError>;
}

#[derive(Clone)]
pub struct EthClient {
    rpc: RpcClient,
}

impl EthClient {
    pub fn new(rpc_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let url = Url::parse(rpc_url).context("invalid ETH_RPC_URL")?;
        let rpc = RpcClient::new(url, timeout, retry).context("failed to build RPC client")?;
        Ok(Self { rpc })
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }
}

#[async_trait]
impl ChainSource for EthClient {
    async fn latest_block_number(&self) -> Result<BlockNumber, RpcError> {
        let raw = self.rpc.call("eth_blockNumber", json!([])).await?;
        let number: U64 = decode(raw)?;
        Ok(number.as_u64())
    }

    async fn block_timestamp(&self, number: BlockNumber) -> Result<Option<u64>, RpcError> {
        let raw = self
            .rpc
            .call("eth_getBlockByNumber", block_params(number, false))
            .await?;
        let header: Option<BlockHeader> = decode(raw)?;
        Ok(header.map(|h| h.timestamp.as_u64()))
    }

    async fn blocks_with_transactions(
        &self,
        numbers: &[BlockNumber],
    ) -> Result<Vec<Option<FullBlock>>, RpcError> {
        let calls: Vec<RpcCall> = numbers
            .iter()
            .map(|&n| RpcCall::new(n, "eth_getBlockByNumber", block_params(n, true)))
            .collect();

        self.rpc
            .call_batch(&calls)
            .await?
            .into_iter()
            .map(|result| decode(result?))
            .collect()
    }
}

fn block_params(number: BlockNumber, full_transactions: bool) -> Value {
    json!([format!("{:#x}", number), full_transactions])
}

fn decode<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T, RpcError> {
    serde_json::from_value(raw).map_err(|e| RpcError::Protocol(e.to_string()))
}
