use alloy_primitives::{B256, Bytes};
use serde::{Deserialize, Serialize};

/// Block identity record, the unit of ingestion checkpointing.
///
/// Unique per `(block_number, node_fingerprint)`. `id` is assigned by the store and is
/// `0` for headers that have not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub id: i64,
    pub block_number: u64,
    pub hash: B256,
    pub raw: Bytes,
    pub timestamp: u64,
    pub node_fingerprint: String,
}

impl Header {
    pub fn new(
        block_number: u64,
        hash: B256,
        raw: Bytes,
        timestamp: u64,
        node_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            block_number,
            hash,
            raw,
            timestamp,
            node_fingerprint: node_fingerprint.into(),
        }
    }
}

/// Result of `create_or_update_header`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderUpsert {
    Inserted(i64),
    Unchanged(i64),
    // Hash diverged from the stored row: overwritten in place, checked flags cleared
    Replaced(i64),
}

impl HeaderUpsert {
    pub fn id(&self) -> i64 {
        match self {
            HeaderUpsert::Inserted(id) | HeaderUpsert::Unchanged(id) | HeaderUpsert::Replaced(id) => {
                *id
            }
        }
    }
}
