use alloy_primitives::{U256, hex};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tracing::debug;

use crate::models::datasets::blocks::Block;
use crate::models::datasets::transactions::Receipt;
use crate::models::errors::StorageError;
use crate::storage::postgres::{PostgresStore, to_db_int};
use crate::storage::{BLOCKS_FROM_HEAD_BEFORE_FINAL, BlockRepository};
use crate::utils::u256_to_decimal;

fn decimal(value: U256) -> BigDecimal {
    u256_to_decimal(value, 0)
}

#[async_trait]
impl BlockRepository for PostgresStore {
    async fn create_or_update_block(&self, block: &Block) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, hash FROM blocks WHERE number = $1 AND node_fingerprint = $2 FOR UPDATE",
        )
        .bind(to_db_int(block.number))
        .bind(&self.node_fingerprint)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            Some((_, hash)) if hash == block.hash.to_string() => {
                return Err(StorageError::BlockExists {
                    block_number: block.number,
                });
            }
            Some((id, _)) => {
                debug!("Replacing block {} (stored id {})", block.number, id);
                // Transactions, receipts and logs cascade
                sqlx::query("DELETE FROM blocks WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {}
        }

        let (block_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO blocks (number, hash, parent_hash, block_time, difficulty, gas_limit,
                                gas_used, miner, nonce, extra_data, uncle_hash, size, reward,
                                uncles_reward, is_final, node_fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
            "#,
        )
        .bind(to_db_int(block.number))
        .bind(block.hash.to_string())
        .bind(block.parent_hash.to_string())
        .bind(to_db_int(block.time))
        .bind(decimal(block.difficulty))
        .bind(to_db_int(block.gas_limit))
        .bind(to_db_int(block.gas_used))
        .bind(block.miner.to_string())
        .bind(block.nonce.to_string())
        .bind(block.extra_data.to_vec())
        .bind(block.uncle_hash.to_string())
        .bind(to_db_int(block.size))
        .bind(&block.reward)
        .bind(&block.uncles_reward)
        .bind(block.is_final)
        .bind(&self.node_fingerprint)
        .fetch_one(&mut *tx)
        .await?;

        for transaction in &block.transactions {
            sqlx::query(
                r#"
                INSERT INTO full_sync_transactions (block_id, hash, nonce, tx_to, tx_from, gas_limit,
                                                    gas_price, value, input_data, tx_index)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (block_id, hash) DO NOTHING
                "#,
            )
            .bind(block_id)
            .bind(transaction.hash.to_string())
            .bind(BigDecimal::from(transaction.nonce))
            .bind(transaction.to.map(|to| to.to_string()))
            .bind(transaction.from.to_string())
            .bind(BigDecimal::from(transaction.gas_limit))
            .bind(BigDecimal::from(transaction.gas_price))
            .bind(decimal(transaction.value))
            .bind(transaction.data.to_vec())
            .bind(to_db_int(transaction.tx_index))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(block_id)
    }

    async fn create_receipts_and_logs(
        &self,
        block_id: i64,
        receipts: &[Receipt],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        for receipt in receipts {
            let (receipt_id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO receipts (block_id, tx_hash, contract_address, cumulative_gas_used,
                                      gas_used, bloom, state_root, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (block_id, tx_hash) DO UPDATE SET
                    contract_address = EXCLUDED.contract_address,
                    cumulative_gas_used = EXCLUDED.cumulative_gas_used,
                    gas_used = EXCLUDED.gas_used,
                    bloom = EXCLUDED.bloom,
                    state_root = EXCLUDED.state_root,
                    status = EXCLUDED.status
                RETURNING id
                "#,
            )
            .bind(block_id)
            .bind(receipt.tx_hash.to_string())
            .bind(&receipt.contract_address)
            .bind(BigDecimal::from(receipt.cumulative_gas_used))
            .bind(BigDecimal::from(receipt.gas_used))
            .bind(hex::encode_prefixed(receipt.bloom))
            .bind(&receipt.state_root)
            .bind(receipt.status)
            .fetch_one(&mut *tx)
            .await?;

            for log in &receipt.logs {
                sqlx::query(
                    r#"
                    INSERT INTO logs (receipt_id, address, block_number, tx_hash, tx_index,
                                      log_index, topics, data)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    ON CONFLICT (receipt_id, log_index) DO NOTHING
                    "#,
                )
                .bind(receipt_id)
                .bind(log.address.to_string())
                .bind(to_db_int(log.block_number))
                .bind(log.tx_hash.to_string())
                .bind(to_db_int(log.tx_index))
                .bind(to_db_int(log.index))
                .bind(log.topics.iter().map(|t| t.to_string()).collect::<Vec<_>>())
                .bind(log.data.to_vec())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_blocks_status(&self, chain_head: u64) -> Result<(), StorageError> {
        let watermark = chain_head.saturating_sub(BLOCKS_FROM_HEAD_BEFORE_FINAL);
        let result = sqlx::query(
            r#"
            UPDATE blocks SET is_final = TRUE
            WHERE number < $1 AND node_fingerprint = $2 AND is_final = FALSE
            "#,
        )
        .bind(to_db_int(watermark))
        .bind(&self.node_fingerprint)
        .execute(&self.pool)
        .await?;

        debug!(
            "Marked {} blocks final below {}",
            result.rows_affected(),
            watermark
        );
        Ok(())
    }
}
