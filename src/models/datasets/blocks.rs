use alloy_primitives::{Address, B64, B256, Bytes, U256};
use bigdecimal::BigDecimal;

use crate::models::datasets::transactions::{RawTransaction, Transaction};

////////////////////////////////////// Raw Data ////////////////////////////////////////
// Block as delivered by the node (eth_getBlockByNumber with full transactions) or read
// from the local chain database
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub difficulty: U256,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub miner: Address,
    pub nonce: B64,
    pub extra_data: Bytes,
    pub uncle_hash: B256,
    pub size: u64,
    pub transactions: Vec<RawTransaction>,
    pub uncles: Vec<RawUncle>,
}

// Only the fields needed for reward computation
#[derive(Debug, Clone, PartialEq)]
pub struct RawUncle {
    pub number: u64,
    pub hash: B256,
    pub miner: Address,
}

/////////////////////////////////// Canonical Data /////////////////////////////////////
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub time: u64,
    pub difficulty: U256,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub miner: Address,
    pub nonce: B64,
    pub extra_data: Bytes,
    pub uncle_hash: B256,
    pub size: u64,
    pub reward: BigDecimal,
    pub uncles_reward: BigDecimal,
    pub transactions: Vec<Transaction>,
    pub is_final: bool,
}
