use alloy_consensus::TxEnvelope;
use alloy_rpc_types_eth::Block as RpcBlock;

use crate::models::datasets::blocks::{RawBlock, RawUncle};
use crate::models::datasets::headers::Header;
use crate::models::datasets::transactions::RawTransaction;
use crate::models::errors::ChainError;

pub trait BlockParser {
    fn parse_header(&self, node_fingerprint: &str) -> Result<Header, ChainError>;
    fn parse_block(&self, uncles: Vec<RawUncle>) -> Result<RawBlock, ChainError>;
    fn parse_uncle(&self) -> RawUncle;
}

impl BlockParser for RpcBlock {
    fn parse_header(&self, node_fingerprint: &str) -> Result<Header, ChainError> {
        // The raw column keeps the node's JSON rendering of the header
        let raw = serde_json::to_vec(&self.header)
            .map_err(|e| ChainError::rpc("eth_getBlockByNumber", e))?;

        Ok(Header::new(
            self.header.number,
            self.header.hash,
            raw.into(),
            self.header.timestamp,
            node_fingerprint,
        ))
    }

    fn parse_block(&self, uncles: Vec<RawUncle>) -> Result<RawBlock, ChainError> {
        let inner = &self.header.inner;

        // Requested with full transactions; a hash-only body means the node ignored us
        let transactions = self
            .transactions
            .as_transactions()
            .ok_or(ChainError::MissingBlock {
                block_number: inner.number,
            })?
            .iter()
            .map(|tx| RawTransaction::new(TxEnvelope::clone(&tx.inner)))
            .collect();

        Ok(RawBlock {
            number: inner.number,
            hash: self.header.hash,
            parent_hash: inner.parent_hash,
            timestamp: inner.timestamp,
            difficulty: inner.difficulty,
            gas_limit: inner.gas_limit,
            gas_used: inner.gas_used,
            miner: inner.beneficiary,
            nonce: inner.nonce,
            extra_data: inner.extra_data.clone(),
            uncle_hash: inner.ommers_hash,
            size: self
                .header
                .size
                .map(|size| size.saturating_to::<u64>())
                .unwrap_or_default(),
            transactions,
            uncles,
        })
    }

    fn parse_uncle(&self) -> RawUncle {
        RawUncle {
            number: self.header.number,
            hash: self.header.hash,
            miner: self.header.beneficiary,
        }
    }
}
