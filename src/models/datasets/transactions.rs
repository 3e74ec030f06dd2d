use alloy_consensus::{Eip658Value, Transaction as _, TxEnvelope};
use alloy_primitives::{Address, B256, Bloom, Bytes, U256};

use crate::models::datasets::logs::Log;

/// Status written for receipts that carry a pre-Byzantium post-state root instead
/// of a status code.
pub const RECEIPT_STATUS_SENTINEL: i32 = -99;

////////////////////////////////////// Raw Data ////////////////////////////////////////
// Signed transaction as it appears in a raw block
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub envelope: TxEnvelope,
}

impl RawTransaction {
    pub fn new(envelope: TxEnvelope) -> Self {
        Self { envelope }
    }

    pub fn hash(&self) -> B256 {
        *self.envelope.tx_hash()
    }

    pub fn nonce(&self) -> u64 {
        self.envelope.nonce()
    }

    pub fn to(&self) -> Option<Address> {
        self.envelope.to()
    }

    pub fn gas_limit(&self) -> u64 {
        self.envelope.gas_limit()
    }

    // Legacy and EIP-2930 carry a gas price; dynamic fee transactions report their fee cap
    pub fn gas_price(&self) -> u128 {
        self.envelope
            .gas_price()
            .unwrap_or_else(|| self.envelope.max_fee_per_gas())
    }

    pub fn value(&self) -> U256 {
        self.envelope.value()
    }

    pub fn input(&self) -> Bytes {
        self.envelope.input().clone()
    }
}

// Receipt as returned by the node or read from the local chain database
#[derive(Debug, Clone, PartialEq)]
pub struct RawReceipt {
    pub tx_hash: B256,
    pub contract_address: Option<Address>,
    pub cumulative_gas_used: u64,
    pub gas_used: u64,
    pub logs_bloom: Bloom,
    pub status: Eip658Value,
    pub logs: Vec<Log>,
}

/////////////////////////////////// Canonical Data /////////////////////////////////////
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub hash: B256,
    pub nonce: u64,
    pub to: Option<Address>,
    pub from: Address,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub value: U256,
    pub data: Bytes,
    pub tx_index: u64,
    pub receipt: Receipt,
}

/// Exactly one of `state_root` and `status` is meaningful: `state_root` is the hex
/// encoded post-state for pre-Byzantium receipts (and `status` is
/// [`RECEIPT_STATUS_SENTINEL`]); otherwise `state_root` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub contract_address: String,
    pub cumulative_gas_used: u64,
    pub gas_used: u64,
    pub bloom: Bloom,
    pub state_root: String,
    pub status: i32,
    pub logs: Vec<Log>,
}
