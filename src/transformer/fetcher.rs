use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use std::sync::Arc;

use crate::indexer::ChainClient;
use crate::models::datasets::logs::Log;
use crate::models::errors::ChainError;
use crate::transformer::LogFetcher;

/// Fetches one block's worth of matching logs from the node.
pub struct ChainLogFetcher {
    client: Arc<dyn ChainClient>,
}

impl ChainLogFetcher {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogFetcher for ChainLogFetcher {
    async fn fetch_logs(
        &self,
        addresses: &[Address],
        topics: &[Vec<B256>],
        block_number: u64,
    ) -> Result<Vec<Log>, ChainError> {
        self.client
            .filter_logs(addresses, topics, block_number, block_number)
            .await
    }
}
