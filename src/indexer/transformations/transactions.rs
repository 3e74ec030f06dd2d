use alloy_consensus::transaction::SignerRecoverable as _;
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::indexer::ChainClient;
use crate::indexer::transformations::receipts::ReceiptTransformer;
use crate::models::datasets::transactions::{RawReceipt, RawTransaction, Transaction};
use crate::models::errors::ChainError;

/// Resolves the sender and receipt of one transaction and assembles the canonical
/// record.
#[async_trait]
pub trait TransactionConverter: Send + Sync {
    async fn convert_transaction(
        &self,
        transaction: RawTransaction,
        block_hash: B256,
        index: u64,
    ) -> Result<Transaction, ChainError>;
}

/// Live sync: sender and receipt both come from the node.
pub struct RpcTransactionConverter {
    client: Arc<dyn ChainClient>,
}

impl RpcTransactionConverter {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransactionConverter for RpcTransactionConverter {
    async fn convert_transaction(
        &self,
        transaction: RawTransaction,
        block_hash: B256,
        index: u64,
    ) -> Result<Transaction, ChainError> {
        let from = self
            .client
            .transaction_sender(&transaction, block_hash, index)
            .await?;
        let receipt = self.client.transaction_receipt(transaction.hash()).await?;

        Ok(assemble(transaction, from, index, receipt))
    }
}

/// Cold import: sender recovered from the signature, receipts read up front from the
/// local chain database.
pub struct OfflineTransactionConverter {
    receipts: HashMap<B256, RawReceipt>,
}

impl OfflineTransactionConverter {
    pub fn new(receipts: Vec<RawReceipt>) -> Self {
        Self {
            receipts: receipts
                .into_iter()
                .map(|receipt| (receipt.tx_hash, receipt))
                .collect(),
        }
    }
}

#[async_trait]
impl TransactionConverter for OfflineTransactionConverter {
    async fn convert_transaction(
        &self,
        transaction: RawTransaction,
        _block_hash: B256,
        index: u64,
    ) -> Result<Transaction, ChainError> {
        let tx_hash = transaction.hash();
        let from = transaction
            .envelope
            .recover_signer()
            .map_err(|e| ChainError::SenderRecovery {
                tx_hash: tx_hash.to_string(),
                message: e.to_string(),
            })?;
        let receipt = self
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or(ChainError::MissingReceipt {
                tx_hash: tx_hash.to_string(),
            })?;

        Ok(assemble(transaction, from, index, receipt))
    }
}

fn assemble(transaction: RawTransaction, from: Address, index: u64, receipt: RawReceipt) -> Transaction {
    Transaction {
        hash: transaction.hash(),
        nonce: transaction.nonce(),
        to: transaction.to(),
        from,
        gas_limit: transaction.gas_limit(),
        gas_price: transaction.gas_price(),
        value: transaction.value(),
        data: transaction.input(),
        tx_index: index,
        receipt: receipt.transform_receipt(),
    }
}
