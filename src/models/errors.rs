use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC error calling {method}: {message}")]
    Rpc { method: String, message: String },
    #[error("Node returned no header for block {block_number}")]
    MissingHeader { block_number: u64 },
    #[error("Node returned no block for block {block_number}")]
    MissingBlock { block_number: u64 },
    #[error("Node returned no receipt for transaction {tx_hash}")]
    MissingReceipt { tx_hash: String },
    #[error("Node returned no transaction at index {index} of block {block_hash}")]
    MissingTransaction { block_hash: String, index: u64 },
    #[error("Failed to recover sender of transaction {tx_hash}: {message}")]
    SenderRecovery { tx_hash: String, message: String },
    /// Raised by [`ChainDatabase`](crate::cold_import::ChainDatabase) implementations.
    #[error("Local chain database error: {0}")]
    Database(String),
}

impl ChainError {
    pub fn rpc(method: &str, error: impl std::fmt::Display) -> Self {
        ChainError::Rpc {
            method: method.to_string(),
            message: crate::utils::strip_html(&error.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Won't add block that already exists: {block_number}")]
    BlockExists { block_number: u64 },
    #[error("Invalid table identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Refusing to persist an empty model set for header {header_id}")]
    EmptyModels { header_id: i64 },
    #[error("Database query error: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Query(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Event {event} not found in contract ABI")]
    UnknownEvent { event: String },
    #[error("Invalid contract ABI: {0}")]
    InvalidAbi(String),
    #[error("Log {log_index} in tx {tx_hash}: expected {expected} topics, got {got}")]
    TopicCount {
        tx_hash: String,
        log_index: u64,
        expected: usize,
        got: usize,
    },
    #[error("Log {log_index} in tx {tx_hash}: expected at least {expected} data bytes, got {got}")]
    ShortData {
        tx_hash: String,
        log_index: u64,
        expected: usize,
        got: usize,
    },
    #[error("Log {log_index} in tx {tx_hash}: {message}")]
    Abi {
        tx_hash: String,
        log_index: u64,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("Transaction task {index} did not complete: {message}")]
    Join { index: usize, message: String },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Chain head is 0; the node has not synced yet")]
    ChainNotSynced,
    #[error("Starting block number ({starting_block}) greater than client's most recent synced block ({head})")]
    StartingBlockBeyondHead { starting_block: u64, head: u64 },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

#[derive(Error, Debug)]
pub enum TransformerError {
    #[error("Error getting unchecked headers for {event}: {source}")]
    MissingHeaders {
        event: String,
        #[source]
        source: StorageError,
    },
    #[error("Error fetching logs for header {header_id} (block {block_number}): {source}")]
    FetchLogs {
        header_id: i64,
        block_number: u64,
        #[source]
        source: ChainError,
    },
    #[error("Error converting logs for header {header_id} (block {block_number}): {source}")]
    Convert {
        header_id: i64,
        block_number: u64,
        #[source]
        source: DecodeError,
    },
    #[error("Error persisting header {header_id} (block {block_number}): {source}")]
    Persist {
        header_id: i64,
        block_number: u64,
        #[source]
        source: StorageError,
    },
    #[error("Transformer {event} gave up after {errors} consecutive errors; last: {last}")]
    GaveUp {
        event: String,
        errors: u32,
        last: String,
    },
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Canonical hash for block {block_number} not found in local chain database")]
    MissingCanonicalHash { block_number: u64 },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
