use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::common::ExecuteConfig;
use crate::models::errors::TransformerError;
use crate::transformer::{EventRepository, EventTransformer, ExecuteSummary, LogConverter, LogFetcher};

/// Object-safe handle on a transformer so differently typed instances can share one
/// watcher.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, cancel: &CancellationToken) -> Result<ExecuteSummary, TransformerError>;
}

#[async_trait]
impl<F, C, R> Executor for EventTransformer<F, C, R>
where
    F: LogFetcher,
    C: LogConverter,
    R: EventRepository<Model = C::Model>,
{
    fn name(&self) -> &str {
        &self.config().event_name
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<ExecuteSummary, TransformerError> {
        self.execute_until(cancel).await
    }
}

/// Re-runs every transformer on its own task until cancelled.
///
/// A transformer gives up after more than `max_consecutive_unexpected_errors` failed
/// runs in a row; a successful run resets its count. Giving up cancels the others.
pub struct EventWatcher {
    executors: Vec<Arc<dyn Executor>>,
    config: ExecuteConfig,
}

impl EventWatcher {
    pub fn new(config: ExecuteConfig) -> Self {
        Self {
            executors: Vec::new(),
            config,
        }
    }

    pub fn add_transformer(&mut self, executor: Arc<dyn Executor>) {
        self.executors.push(executor);
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), TransformerError> {
        info!("Watching {} transformers", self.executors.len());

        let handles: Vec<_> = self
            .executors
            .into_iter()
            .map(|executor| {
                let cancel = cancel.clone();
                let config = self.config.clone();
                tokio::spawn(async move {
                    let result = watch(executor, &config, &cancel).await;
                    if result.is_err() {
                        cancel.cancel();
                    }
                    result
                })
            })
            .collect();

        let mut first_error = None;
        for outcome in join_all(handles).await {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => error!("Transformer task did not complete: {}", e),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn watch(
    executor: Arc<dyn Executor>,
    config: &ExecuteConfig,
    cancel: &CancellationToken,
) -> Result<(), TransformerError> {
    let retry_interval = Duration::from_secs(config.retry_interval_secs);
    let mut consecutive_errors = 0u32;

    while !cancel.is_cancelled() {
        match executor.execute(cancel).await {
            Ok(_) => consecutive_errors = 0,
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors > config.max_consecutive_unexpected_errors {
                    error!(
                        "{}: giving up after {} consecutive errors: {}",
                        executor.name(),
                        consecutive_errors,
                        e
                    );
                    return Err(TransformerError::GaveUp {
                        event: executor.name().to_string(),
                        errors: consecutive_errors,
                        last: e.to_string(),
                    });
                }
                warn!(
                    "{}: run failed ({}/{}): {}",
                    executor.name(),
                    consecutive_errors,
                    config.max_consecutive_unexpected_errors,
                    e
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(retry_interval) => {}
        }
    }

    info!("{}: watcher stopped", executor.name());
    Ok(())
}
