use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::indexer::ChainClient;
use crate::metrics::Metrics;
use crate::models::datasets::headers::HeaderUpsert;
use crate::models::errors::{ChainError, StorageError, SyncError};
use crate::storage::HeaderRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationWindow {
    pub lower_bound: u64,
    pub upper_bound: u64,
}

impl ValidationWindow {
    pub fn new(head: u64, size: u64) -> Self {
        Self {
            lower_bound: head.saturating_sub(size),
            upper_bound: head,
        }
    }

    pub fn size(&self) -> u64 {
        self.upper_bound - self.lower_bound
    }
}

impl fmt::Display for ValidationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower_bound, self.upper_bound)
    }
}

#[derive(Error, Debug)]
enum CompareError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Re-checks the most recent `window` blocks against the node and overwrites stored
/// headers whose hash no longer matches.
pub struct HeaderValidator {
    chain: Arc<dyn ChainClient>,
    repository: Arc<dyn HeaderRepository>,
    window: u64,
    metrics: Option<Arc<Metrics>>,
}

impl HeaderValidator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        repository: Arc<dyn HeaderRepository>,
        window: u64,
    ) -> Self {
        Self {
            chain,
            repository,
            window,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// One tick. Only the head lookup is fatal; a failed comparison is logged and the
    /// rest of the window is still checked.
    pub async fn validate_headers(&self) -> Result<ValidationWindow, SyncError> {
        let (head, _) = self.chain.latest_header().await?;
        let window = ValidationWindow::new(head, self.window);

        if let Some(metrics) = &self.metrics {
            metrics
                .validation_window_upper
                .record(window.upper_bound, &metrics.labels("validate_headers"));
        }

        let mut replaced = 0;
        for block_number in window.lower_bound..=window.upper_bound {
            match self.compare(block_number).await {
                Ok(Some(HeaderUpsert::Replaced(id))) => {
                    warn!(
                        "Header {} at block {} diverged from the node, replaced",
                        id, block_number
                    );
                    replaced += 1;
                }
                Ok(_) => {}
                Err(e) => error!("Error validating header at block {}: {}", block_number, e),
            }
        }

        if let Some(metrics) = &self.metrics {
            if replaced > 0 {
                metrics
                    .headers_replaced
                    .add(replaced, &metrics.labels("validate_headers"));
            }
        }

        info!("Validated headers in window {}", window);
        Ok(window)
    }

    // None when the stored header already matches the canonical one
    async fn compare(&self, block_number: u64) -> Result<Option<HeaderUpsert>, CompareError> {
        let canonical = self.chain.header_by_number(block_number).await?;
        let stored = self.repository.get_header(block_number).await?;

        if stored.is_some_and(|stored| stored.hash == canonical.hash) {
            return Ok(None);
        }

        let upsert = self.repository.create_or_update_header(&canonical).await?;
        Ok(Some(upsert))
    }
}
