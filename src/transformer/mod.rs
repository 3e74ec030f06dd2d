pub mod abi;
pub mod fetcher;
pub mod watcher;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::Metrics;
use crate::models::datasets::events::{EventModel, TransformerConfig};
use crate::models::datasets::headers::Header;
use crate::models::datasets::logs::Log;
use crate::models::errors::{ChainError, DecodeError, StorageError, TransformerError};

////////////////////////////////////// Seams ///////////////////////////////////////////
#[async_trait]
pub trait LogFetcher: Send + Sync {
    async fn fetch_logs(
        &self,
        addresses: &[Address],
        topics: &[Vec<B256>],
        block_number: u64,
    ) -> Result<Vec<Log>, ChainError>;
}

pub trait LogConverter: Send + Sync {
    type Model: EventModel;

    /// All-or-nothing: one undecodable log fails the whole set.
    fn to_models(&self, logs: &[Log], header_id: i64) -> Result<Vec<Self::Model>, DecodeError>;
}

/// Storage for one event kind.
#[async_trait]
pub trait EventRepository: Send + Sync {
    type Model: EventModel;

    /// Upserts `models` keyed by (header id, transaction index, log index) and marks the
    /// header checked, in one transaction.
    async fn create(&self, header_id: i64, models: &[Self::Model]) -> Result<(), StorageError>;

    async fn missing_headers(&self, start: u64, end: Option<u64>) -> Result<Vec<Header>, StorageError>;

    async fn mark_header_checked(&self, header_id: i64) -> Result<(), StorageError>;
}

/////////////////////////////////// Transformer ////////////////////////////////////////
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub headers_checked: usize,
    pub models_persisted: usize,
}

pub struct EventTransformer<F, C, R> {
    config: TransformerConfig,
    fetcher: F,
    converter: C,
    repository: R,
    metrics: Option<Arc<Metrics>>,
}

impl<F, C, R> EventTransformer<F, C, R>
where
    F: LogFetcher,
    C: LogConverter,
    R: EventRepository<Model = C::Model>,
{
    pub fn new(config: TransformerConfig, fetcher: F, converter: C, repository: R) -> Self {
        Self {
            config,
            fetcher,
            converter,
            repository,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub async fn execute(&self) -> Result<ExecuteSummary, TransformerError> {
        self.execute_until(&CancellationToken::new()).await
    }

    /// One pass over every unchecked header in range. Cancellation is honoured between
    /// headers; committed headers stay committed when a later header fails.
    pub async fn execute_until(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ExecuteSummary, TransformerError> {
        let event = &self.config.event_name;
        let headers = self
            .repository
            .missing_headers(self.config.starting_block_number, self.config.ending_block())
            .await
            .map_err(|source| TransformerError::MissingHeaders {
                event: event.clone(),
                source,
            })?;

        let topics = vec![vec![self.config.topic_signature]];
        let mut summary = ExecuteSummary::default();

        for header in headers {
            if cancel.is_cancelled() {
                info!("{}: cancelled before block {}", event, header.block_number);
                break;
            }

            let logs = self
                .fetcher
                .fetch_logs(&self.config.contract_addresses, &topics, header.block_number)
                .await
                .map_err(|source| TransformerError::FetchLogs {
                    header_id: header.id,
                    block_number: header.block_number,
                    source,
                })?;

            if logs.is_empty() {
                self.repository
                    .mark_header_checked(header.id)
                    .await
                    .map_err(|source| TransformerError::Persist {
                        header_id: header.id,
                        block_number: header.block_number,
                        source,
                    })?;
                debug!("{}: no logs in block {}", event, header.block_number);
                summary.headers_checked += 1;
                self.record_checked(0);
                continue;
            }

            let models = self
                .converter
                .to_models(&logs, header.id)
                .map_err(|source| TransformerError::Convert {
                    header_id: header.id,
                    block_number: header.block_number,
                    source,
                })?;

            self.repository
                .create(header.id, &models)
                .await
                .map_err(|source| TransformerError::Persist {
                    header_id: header.id,
                    block_number: header.block_number,
                    source,
                })?;

            summary.headers_checked += 1;
            summary.models_persisted += models.len();
            self.record_checked(models.len() as u64);
        }

        if summary.headers_checked > 0 {
            info!(
                "{}: checked {} headers, persisted {} models",
                event, summary.headers_checked, summary.models_persisted
            );
        }

        Ok(summary)
    }

    fn record_checked(&self, models: u64) {
        if let Some(metrics) = &self.metrics {
            let labels = metrics.event_labels(&self.config.event_name);
            metrics.headers_checked.add(1, &labels);
            if models > 0 {
                metrics.models_persisted.add(models, &labels);
            }
        }
    }
}
