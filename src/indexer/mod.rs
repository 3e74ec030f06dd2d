pub mod node;
pub mod rpc;
pub mod transformations;

use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_network::Ethereum;
use alloy_primitives::{Address, B256, Bytes, U64};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{Filter, Transaction as RpcTransaction, TransactionRequest};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::indexer::node::detect_node;
use crate::indexer::rpc::{
    blocks::BlockParser,
    receipts::{LogParser, ReceiptParser},
};
use crate::metrics::Metrics;
use crate::models::common::NodeInfo;
use crate::models::datasets::blocks::RawBlock;
use crate::models::datasets::headers::Header;
use crate::models::datasets::logs::Log;
use crate::models::datasets::transactions::{RawReceipt, RawTransaction};
use crate::models::errors::ChainError;
use crate::utils::retry::{RetryConfig, retry};

/// Read access to an Ethereum-compatible node.
///
/// Implementations do not retry internally: callers retry whole passes.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn node(&self) -> &NodeInfo;

    /// `(number, hash)` of the current chain head.
    async fn latest_header(&self) -> Result<(u64, B256), ChainError>;

    async fn header_by_number(&self, block_number: u64) -> Result<Header, ChainError>;

    /// Raw block including full transactions and uncle headers.
    async fn block_by_number(&self, block_number: u64) -> Result<RawBlock, ChainError>;

    /// `topics[i]` is the OR-set for topic position `i`.
    async fn filter_logs(
        &self,
        addresses: &[Address],
        topics: &[Vec<B256>],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainError>;

    async fn transaction_sender(
        &self,
        transaction: &RawTransaction,
        block_hash: B256,
        index: u64,
    ) -> Result<Address, ChainError>;

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<RawReceipt, ChainError>;

    async fn call_contract(
        &self,
        to: Address,
        data: Bytes,
        block_number: u64,
    ) -> Result<Bytes, ChainError>;
}

pub struct RpcChainClient<P> {
    provider: P,
    node: NodeInfo,
    metrics: Option<Arc<Metrics>>,
}

impl<P: Provider<Ethereum>> RpcChainClient<P> {
    pub fn new(provider: P, node: NodeInfo, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            provider,
            node,
            metrics,
        }
    }

    /// Detects the node kind and identity, retrying while the node comes up.
    pub async fn connect(provider: P, rpc_url: &str, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let retry_config = RetryConfig::default();
        let node = retry(
            || async {
                detect_node(&provider, rpc_url)
                    .await
                    .map_err(|e| anyhow!("RPC error: {}", e))
            },
            &retry_config,
            "detect_node",
        )
        .await?;

        Ok(Self::new(provider, node, metrics))
    }

    async fn observe<T, E, F>(&self, method: &'static str, call: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start = std::time::Instant::now();

        // Record metrics if enabled
        if let Some(metrics) = &self.metrics {
            metrics.rpc_requests.add(1, &metrics.labels(method));
        }

        let result = call.await;

        if let Some(metrics) = &self.metrics {
            metrics
                .rpc_latency
                .record(start.elapsed().as_secs_f64(), &metrics.labels(method));
            if result.is_err() {
                metrics.rpc_errors.add(1, &metrics.labels(method));
            }
        }

        result.map_err(|e| {
            warn!("RPC call {} failed: {}", method, e);
            ChainError::rpc(method, e)
        })
    }
}

#[async_trait]
impl<P> ChainClient for RpcChainClient<P>
where
    P: Provider<Ethereum> + Send + Sync + 'static,
{
    fn node(&self) -> &NodeInfo {
        &self.node
    }

    async fn latest_header(&self) -> Result<(u64, B256), ChainError> {
        let block = self
            .observe("eth_getBlockByNumber", async {
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Latest)
                    .await
            })
            .await?
            .ok_or(ChainError::MissingHeader { block_number: 0 })?;

        if let Some(metrics) = &self.metrics {
            metrics
                .chain_head
                .record(block.header.number, &metrics.labels("eth_getBlockByNumber"));
        }

        Ok((block.header.number, block.header.hash))
    }

    async fn header_by_number(&self, block_number: u64) -> Result<Header, ChainError> {
        self.observe("eth_getBlockByNumber", async {
            self.provider
                .get_block_by_number(BlockNumberOrTag::Number(block_number))
                .await
        })
        .await?
        .ok_or(ChainError::MissingHeader { block_number })?
        .parse_header(self.node.fingerprint())
    }

    async fn block_by_number(&self, block_number: u64) -> Result<RawBlock, ChainError> {
        let block = self
            .observe("eth_getBlockByNumber", async {
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(block_number))
                    .full()
                    .await
            })
            .await?
            .ok_or(ChainError::MissingBlock { block_number })?;

        let mut uncles = Vec::with_capacity(block.uncles.len());
        for index in 0..block.uncles.len() as u64 {
            let uncle = self
                .observe("eth_getUncleByBlockNumberAndIndex", async {
                    self.provider
                        .get_uncle(BlockId::number(block_number), index)
                        .await
                })
                .await?
                .ok_or(ChainError::MissingBlock { block_number })?;
            uncles.push(uncle.parse_uncle());
        }

        block.parse_block(uncles)
    }

    async fn filter_logs(
        &self,
        addresses: &[Address],
        topics: &[Vec<B256>],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainError> {
        let mut filter = Filter::new()
            .address(addresses.to_vec())
            .from_block(from_block)
            .to_block(to_block);
        for (position, topic) in topics.iter().take(filter.topics.len()).enumerate() {
            filter.topics[position] = topic.clone().into();
        }

        let logs = self
            .observe("eth_getLogs", async { self.provider.get_logs(&filter).await })
            .await?;

        Ok(logs.into_iter().map(LogParser::parse_log).collect())
    }

    async fn transaction_sender(
        &self,
        transaction: &RawTransaction,
        block_hash: B256,
        index: u64,
    ) -> Result<Address, ChainError> {
        let missing = || ChainError::MissingTransaction {
            block_hash: block_hash.to_string(),
            index,
        };

        let fetched: Option<RpcTransaction> = self
            .observe("eth_getTransactionByBlockHashAndIndex", async {
                self.provider
                    .raw_request(
                        "eth_getTransactionByBlockHashAndIndex".into(),
                        (block_hash, U64::from(index)),
                    )
                    .await
            })
            .await?;
        let fetched = fetched.ok_or_else(missing)?;

        if *fetched.inner.tx_hash() != transaction.hash() {
            return Err(missing());
        }

        Ok(fetched.inner.signer())
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<RawReceipt, ChainError> {
        let receipt = self
            .observe("eth_getTransactionReceipt", async {
                self.provider.get_transaction_receipt(tx_hash).await
            })
            .await?
            .ok_or(ChainError::MissingReceipt {
                tx_hash: tx_hash.to_string(),
            })?;

        Ok(receipt.parse_receipt())
    }

    async fn call_contract(
        &self,
        to: Address,
        data: Bytes,
        block_number: u64,
    ) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default().to(to).input(data.into());

        self.observe("eth_call", async {
            self.provider
                .call(request)
                .block(BlockId::number(block_number))
                .await
        })
        .await
    }
}
