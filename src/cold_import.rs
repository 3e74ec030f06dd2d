use alloy_primitives::B256;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::indexer::transformations::blocks::BlockConverter;
use crate::indexer::transformations::transactions::OfflineTransactionConverter;
use crate::metrics::Metrics;
use crate::models::common::RewardSchedule;
use crate::models::datasets::blocks::RawBlock;
use crate::models::datasets::transactions::{RawReceipt, Receipt};
use crate::models::errors::{ChainError, ImportError, StorageError};
use crate::storage::BlockRepository;

/// Read access to a node's local chain database.
#[async_trait]
pub trait ChainDatabase: Send + Sync {
    async fn canonical_hash(&self, block_number: u64) -> Result<Option<B256>, ChainError>;

    async fn block(&self, hash: B256, block_number: u64) -> Result<Option<RawBlock>, ChainError>;

    async fn receipts(&self, hash: B256, block_number: u64) -> Result<Vec<RawReceipt>, ChainError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Bulk import straight from the chain database, bypassing RPC. Senders are recovered
/// from signatures.
pub struct ColdImporter {
    database: Arc<dyn ChainDatabase>,
    repository: Arc<dyn BlockRepository>,
    schedule: RewardSchedule,
    metrics: Option<Arc<Metrics>>,
}

impl ColdImporter {
    pub fn new(
        database: Arc<dyn ChainDatabase>,
        repository: Arc<dyn BlockRepository>,
        schedule: RewardSchedule,
    ) -> Self {
        Self {
            database,
            repository,
            schedule,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Imports `[start, end]`. Blocks already stored are skipped along with their
    /// receipts, so re-running over an imported range writes nothing.
    pub async fn import_range(&self, start: u64, end: u64) -> Result<ImportSummary, ImportError> {
        info!("Cold importing blocks {} to {}", start, end);
        let mut summary = ImportSummary::default();

        for block_number in start..=end {
            if self.import_block(block_number).await? {
                summary.imported += 1;
            } else {
                summary.skipped += 1;
            }
        }

        self.repository.set_blocks_status(end).await?;

        info!(
            "Cold import of {} to {} done: {} imported, {} already present",
            start, end, summary.imported, summary.skipped
        );
        Ok(summary)
    }

    // false when the block was already stored
    async fn import_block(&self, block_number: u64) -> Result<bool, ImportError> {
        let hash = self
            .database
            .canonical_hash(block_number)
            .await?
            .ok_or(ImportError::MissingCanonicalHash { block_number })?;
        let raw = self
            .database
            .block(hash, block_number)
            .await?
            .ok_or(ChainError::MissingBlock { block_number })?;

        // Fees need gas used, so receipts are read before conversion
        let receipts = self.database.receipts(hash, block_number).await?;
        let converter = BlockConverter::new(
            Arc::new(OfflineTransactionConverter::new(receipts)),
            self.schedule,
        );
        let block = converter.convert_block(raw).await?;

        let block_id = match self.repository.create_or_update_block(&block).await {
            Ok(id) => id,
            Err(StorageError::BlockExists { .. }) => {
                debug!("Block {} already imported, skipping", block_number);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let receipts: Vec<Receipt> = block
            .transactions
            .iter()
            .map(|transaction| transaction.receipt.clone())
            .collect();
        self.repository
            .create_receipts_and_logs(block_id, &receipts)
            .await?;

        if let Some(metrics) = &self.metrics {
            metrics.blocks_imported.add(1, &metrics.labels("cold_import"));
        }

        Ok(true)
    }
}
