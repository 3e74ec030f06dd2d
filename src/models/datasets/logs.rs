use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

/// An event log as emitted by a transaction. Immutable once fetched; the sole source
/// for derived event models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub block_number: u64,
    pub tx_hash: B256,
    pub tx_index: u64,
    pub index: u64,
    pub topics: Vec<B256>,
    pub data: Bytes,
}
