pub mod backfill;
pub mod blocks;
pub mod validator;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::indexer::ChainClient;
use crate::metrics::Metrics;
use crate::models::common::HeaderSyncConfig;
use crate::models::errors::SyncError;
use crate::storage::HeaderRepository;
use crate::sync::backfill::populate_missing_headers;
use crate::sync::validator::HeaderValidator;

/// Startup preconditions for header sync. Returns the current head.
pub async fn validate_header_sync_args(
    chain: &dyn ChainClient,
    starting_block: u64,
) -> Result<u64, SyncError> {
    let (head, _) = chain.latest_header().await?;
    if head == 0 {
        return Err(SyncError::ChainNotSynced);
    }
    if starting_block > head {
        return Err(SyncError::StartingBlockBeyondHead {
            starting_block,
            head,
        });
    }
    Ok(head)
}

/// Backfill and validation as two independent tasks. They share nothing but the
/// header store.
pub struct HeaderSync {
    chain: Arc<dyn ChainClient>,
    repository: Arc<dyn HeaderRepository>,
    config: HeaderSyncConfig,
    metrics: Option<Arc<Metrics>>,
}

impl HeaderSync {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        repository: Arc<dyn HeaderRepository>,
        config: HeaderSyncConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            chain,
            repository,
            config,
            metrics,
        }
    }

    /// Checks the preconditions and runs both loops until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SyncError> {
        let head = validate_header_sync_args(self.chain.as_ref(), self.config.starting_block_number).await?;
        info!(
            "Starting header sync from block {} (head {}, validation window {})",
            self.config.starting_block_number, head, self.config.validation_window
        );

        let backfill = self.spawn_backfill(cancel.clone());
        let validation = self.spawn_validation(cancel.clone());

        for (name, handle) in [("backfill", backfill), ("validation", validation)] {
            if let Err(e) = handle.await {
                error!("Header sync {} task did not complete: {}", name, e);
            }
        }

        info!("Header sync stopped");
        Ok(())
    }

    fn spawn_backfill(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let chain = Arc::clone(&self.chain);
        let repository = Arc::clone(&self.repository);
        let metrics = self.metrics.clone();
        let starting_block = self.config.starting_block_number;
        let idle = Duration::from_secs(self.config.backfill_idle_secs);
        let retry = Duration::from_secs(self.config.polling_interval_secs);

        tokio::spawn(async move {
            while !cancel.is_cancelled() {
                let pause = match populate_missing_headers(
                    chain.as_ref(),
                    repository.as_ref(),
                    starting_block,
                    metrics.as_deref(),
                )
                .await
                {
                    // Caught up with head
                    Ok(0) => idle,
                    Ok(_) => Duration::ZERO,
                    Err(e) => {
                        error!("Backfill pass failed: {}", e);
                        retry
                    }
                };

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        })
    }

    fn spawn_validation(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let validator = HeaderValidator::new(
            Arc::clone(&self.chain),
            Arc::clone(&self.repository),
            self.config.validation_window,
        )
        .with_metrics(self.metrics.clone());
        let interval = Duration::from_secs(self.config.polling_interval_secs);

        tokio::spawn(async move {
            while !cancel.is_cancelled() {
                if let Err(e) = validator.validate_headers().await {
                    error!("Header validation failed: {}", e);
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    }
}
