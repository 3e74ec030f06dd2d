use futures::future::join_all;
use std::sync::Arc;
use tracing::error;

use crate::indexer::transformations::rewards::{block_reward, uncles_reward};
use crate::indexer::transformations::transactions::TransactionConverter;
use crate::models::common::RewardSchedule;
use crate::models::datasets::blocks::{Block, RawBlock};
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::ConvertError;

/// Turns a raw block into a canonical [`Block`], enriching every transaction
/// concurrently and computing rewards.
pub struct BlockConverter<T: ?Sized> {
    transactions: Arc<T>,
    schedule: RewardSchedule,
}

impl<T> BlockConverter<T>
where
    T: TransactionConverter + ?Sized + 'static,
{
    pub fn new(transactions: Arc<T>, schedule: RewardSchedule) -> Self {
        Self {
            transactions,
            schedule,
        }
    }

    pub async fn convert_block(&self, raw: RawBlock) -> Result<Block, ConvertError> {
        let transactions = self.convert_transactions(&raw).await?;

        let reward = block_reward(raw.number, &transactions, &raw.uncles, &self.schedule);
        let uncles_reward = uncles_reward(raw.number, &raw.uncles, &self.schedule);

        Ok(Block {
            number: raw.number,
            hash: raw.hash,
            parent_hash: raw.parent_hash,
            time: raw.timestamp,
            difficulty: raw.difficulty,
            gas_limit: raw.gas_limit,
            gas_used: raw.gas_used,
            miner: raw.miner,
            nonce: raw.nonce,
            extra_data: raw.extra_data,
            uncle_hash: raw.uncle_hash,
            size: raw.size,
            reward,
            uncles_reward,
            transactions,
            is_final: false,
        })
    }

    // One task per transaction. Every task runs to completion; the first failure by
    // index is reported.
    async fn convert_transactions(&self, raw: &RawBlock) -> Result<Vec<Transaction>, ConvertError> {
        let handles: Vec<_> = raw
            .transactions
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, transaction)| {
                let converter = Arc::clone(&self.transactions);
                let block_hash = raw.hash;
                tokio::spawn(async move {
                    let result = converter
                        .convert_transaction(transaction, block_hash, index as u64)
                        .await;
                    (index, result)
                })
            })
            .collect();

        let mut slots: Vec<Option<Transaction>> = (0..handles.len()).map(|_| None).collect();
        let mut first_error: Option<ConvertError> = None;

        for (position, outcome) in join_all(handles).await.into_iter().enumerate() {
            match outcome {
                Ok((index, Ok(transaction))) => slots[index] = Some(transaction),
                Ok((index, Err(e))) => {
                    error!(
                        "Failed to convert transaction {} of block {}: {}",
                        index, raw.number, e
                    );
                    first_error.get_or_insert(ConvertError::Chain(e));
                }
                Err(e) => {
                    error!(
                        "Transaction task {} of block {} did not complete: {}",
                        position, raw.number, e
                    );
                    first_error.get_or_insert(ConvertError::Join {
                        index: position,
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
