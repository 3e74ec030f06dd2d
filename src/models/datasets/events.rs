use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::datasets::logs::Log;

/// Configuration of one transformer instance. Immutable for the lifetime of the
/// transformer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    pub event_name: String,
    pub contract_addresses: Vec<Address>,
    #[serde(default)]
    pub contract_abi: String,
    pub topic_signature: B256,
    #[serde(default)]
    pub starting_block_number: u64,
    // -1 means open-ended to chain head
    #[serde(default = "open_ended")]
    pub ending_block_number: i64,
    pub checked_column_name: String,
    // Destination table for the Postgres event repository
    #[serde(default)]
    pub table_name: Option<String>,
}

fn open_ended() -> i64 {
    -1
}

impl TransformerConfig {
    pub fn ending_block(&self) -> Option<u64> {
        u64::try_from(self.ending_block_number).ok()
    }
}

/// Dedup key of a persisted event model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub header_id: i64,
    pub transaction_index: u64,
    pub log_index: u64,
}

/// A decoded projection of one log, ready for persistence.
pub trait EventModel: Clone + Send + Sync + Serialize + 'static {
    fn key(&self) -> EventKey;
    fn raw_log(&self) -> &Log;
}

// Generic projection produced by the ABI converter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub header_id: i64,
    pub log_index: u64,
    pub transaction_index: u64,
    pub event_name: String,
    pub params: Map<String, Value>,
    pub raw_log: Log,
}

impl EventModel for DecodedEvent {
    fn key(&self) -> EventKey {
        EventKey {
            header_id: self.header_id,
            transaction_index: self.transaction_index,
            log_index: self.log_index,
        }
    }

    fn raw_log(&self) -> &Log {
        &self.raw_log
    }
}
