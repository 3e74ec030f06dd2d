pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::datasets::blocks::Block;
use crate::models::datasets::headers::{Header, HeaderUpsert};
use crate::models::datasets::transactions::Receipt;
use crate::models::errors::StorageError;

/// Blocks further than this from the watermark are considered final.
pub const BLOCKS_FROM_HEAD_BEFORE_FINAL: u64 = 20;

/// Durable header ledger for the local node.
#[async_trait]
pub trait HeaderRepository: Send + Sync {
    /// Inserts the header, or overwrites the stored row in place when its hash differs.
    /// A replaced header keeps its id but loses all of its checked flags and event rows
    /// in the same transaction.
    async fn create_or_update_header(&self, header: &Header) -> Result<HeaderUpsert, StorageError>;

    async fn get_header(&self, block_number: u64) -> Result<Option<Header>, StorageError>;

    /// Numbers in `[start, end]` with no header row for `node_fingerprint`, ascending.
    async fn missing_block_numbers(
        &self,
        start: u64,
        end: u64,
        node_fingerprint: &str,
    ) -> Result<Vec<u64>, StorageError>;
}

/// Per (header, event kind) completion flags.
#[async_trait]
pub trait CheckedHeaderRepository: Send + Sync {
    /// Headers of the local node in `[start, end]` (open-ended when `end` is `None`)
    /// not yet checked for `event_kind`, ordered by block number.
    async fn missing_headers(
        &self,
        start: u64,
        end: Option<u64>,
        event_kind: &str,
    ) -> Result<Vec<Header>, StorageError>;

    async fn mark_header_checked(&self, header_id: i64, event_kind: &str) -> Result<(), StorageError>;
}

#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// Returns the new block id. [`StorageError::BlockExists`] when the same block is
    /// already stored; a stored block with a different hash is removed and replaced.
    async fn create_or_update_block(&self, block: &Block) -> Result<i64, StorageError>;

    async fn create_receipts_and_logs(
        &self,
        block_id: i64,
        receipts: &[Receipt],
    ) -> Result<(), StorageError>;

    /// Marks blocks below `chain_head - BLOCKS_FROM_HEAD_BEFORE_FINAL` final.
    async fn set_blocks_status(&self, chain_head: u64) -> Result<(), StorageError>;
}

/// Table names are interpolated into DDL and DML, so only plain lowercase
/// identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<&str, StorageError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid_start && valid_rest && name.len() <= 63 {
        Ok(name)
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}
