use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::indexer::ChainClient;
use crate::indexer::transformations::blocks::BlockConverter;
use crate::indexer::transformations::transactions::RpcTransactionConverter;
use crate::metrics::Metrics;
use crate::models::common::RewardSchedule;
use crate::models::datasets::transactions::Receipt;
use crate::models::errors::{StorageError, SyncError};
use crate::storage::BlockRepository;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockSyncPass {
    pub imported: usize,
    pub skipped: usize,
    /// First block the next pass should look at.
    pub next_block: u64,
}

/// Live block sync. Blocks come from the node over RPC and each transaction's sender
/// and receipt are looked up there as well.
pub struct BlockSync {
    chain: Arc<dyn ChainClient>,
    repository: Arc<dyn BlockRepository>,
    converter: BlockConverter<RpcTransactionConverter>,
    metrics: Option<Arc<Metrics>>,
}

impl BlockSync {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        repository: Arc<dyn BlockRepository>,
        schedule: RewardSchedule,
    ) -> Self {
        let converter = BlockConverter::new(
            Arc::new(RpcTransactionConverter::new(Arc::clone(&chain))),
            schedule,
        );
        Self {
            chain,
            repository,
            converter,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Imports `[start, head]`, then moves the finality watermark to head. Blocks
    /// already stored are skipped with their receipts. The first failure aborts the
    /// pass; everything imported before it stays.
    pub async fn sync_from(&self, start: u64) -> Result<BlockSyncPass, SyncError> {
        let (head, _) = self.chain.latest_header().await?;
        let mut pass = BlockSyncPass {
            next_block: start,
            ..BlockSyncPass::default()
        };
        if start > head {
            debug!("Block sync start {} is ahead of head {}", start, head);
            return Ok(pass);
        }

        for block_number in start..=head {
            if self.sync_block(block_number).await? {
                pass.imported += 1;
            } else {
                pass.skipped += 1;
            }
            pass.next_block = block_number + 1;
        }

        self.repository.set_blocks_status(head).await?;

        if pass.imported > 0 {
            info!("Synced blocks {} to {}: {} imported", start, head, pass.imported);
        }
        Ok(pass)
    }

    /// Runs passes from `starting_block` until `cancel` fires.
    pub async fn run(self, starting_block: u64, interval: Duration, cancel: CancellationToken) {
        let mut next_block = starting_block;

        while !cancel.is_cancelled() {
            match self.sync_from(next_block).await {
                Ok(pass) => next_block = pass.next_block,
                Err(e) => error!("Block sync pass from {} failed: {}", next_block, e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Block sync stopped at block {}", next_block);
    }

    // false when the block was already stored
    async fn sync_block(&self, block_number: u64) -> Result<bool, SyncError> {
        let raw = self.chain.block_by_number(block_number).await?;
        let block = self.converter.convert_block(raw).await?;

        let block_id = match self.repository.create_or_update_block(&block).await {
            Ok(id) => id,
            Err(StorageError::BlockExists { .. }) => return Ok(false),
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
            metrics.blocks_imported.add(1, &metrics.labels("block_sync"));
        }

        Ok(true)
    }
}
