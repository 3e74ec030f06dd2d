mod common;

use alloy_primitives::B256;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ledger_indexer::cold_import::{ChainDatabase, ColdImporter, ImportSummary};
use ledger_indexer::models::common::RewardSchedule;
use ledger_indexer::models::datasets::blocks::RawBlock;
use ledger_indexer::models::datasets::transactions::RawReceipt;
use ledger_indexer::models::errors::{ChainError, ImportError};
use ledger_indexer::storage::memory::InMemoryStore;

use common::{NODE_ID, block_hash, eip155_transaction, raw_block, receipt_for};

/// Canonical chain kept in memory, keyed by number.
#[derive(Default)]
struct MockChainDatabase {
    chain: Mutex<BTreeMap<u64, (RawBlock, Vec<RawReceipt>)>>,
    unreadable: Mutex<Option<u64>>,
}

impl MockChainDatabase {
    fn with_range(start: u64, end: u64) -> Self {
        let db = Self::default();
        for number in start..=end {
            db.insert(raw_block(number, block_hash(number), Vec::new()), Vec::new());
        }
        db
    }

    fn corrupt(&self, block_number: u64) {
        *self.unreadable.lock().unwrap() = Some(block_number);
    }

    fn insert(&self, block: RawBlock, receipts: Vec<RawReceipt>) {
        self.chain
            .lock()
            .unwrap()
            .insert(block.number, (block, receipts));
    }
}

#[async_trait]
impl ChainDatabase for MockChainDatabase {
    async fn canonical_hash(&self, block_number: u64) -> Result<Option<B256>, ChainError> {
        if *self.unreadable.lock().unwrap() == Some(block_number) {
            return Err(ChainError::Database(format!("corrupt entry for block {block_number}")));
        }
        Ok(self
            .chain
            .lock()
            .unwrap()
            .get(&block_number)
            .map(|(block, _)| block.hash))
    }

    async fn block(&self, hash: B256, block_number: u64) -> Result<Option<RawBlock>, ChainError> {
        Ok(self
            .chain
            .lock()
            .unwrap()
            .get(&block_number)
            .filter(|(block, _)| block.hash == hash)
            .map(|(block, _)| block.clone()))
    }

    async fn receipts(&self, hash: B256, block_number: u64) -> Result<Vec<RawReceipt>, ChainError> {
        Ok(self
            .chain
            .lock()
            .unwrap()
            .get(&block_number)
            .filter(|(block, _)| block.hash == hash)
            .map(|(_, receipts)| receipts.clone())
            .unwrap_or_default())
    }
}

fn importer(
    db: &Arc<MockChainDatabase>,
    store: &Arc<InMemoryStore>,
) -> ColdImporter {
    ColdImporter::new(db.clone(), store.clone(), RewardSchedule::default())
}

#[tokio::test]
async fn imports_blocks_with_receipts() {
    let db = Arc::new(MockChainDatabase::with_range(1, 4));
    let transaction = eip155_transaction();
    let receipt = receipt_for(transaction.hash(), 21_000);
    db.insert(raw_block(5, block_hash(5), vec![transaction]), vec![receipt]);
    let store = Arc::new(InMemoryStore::new(NODE_ID));

    let summary = importer(&db, &store).import_range(1, 5).await.unwrap();

    assert_eq!(
        summary,
        ImportSummary {
            imported: 5,
            skipped: 0
        }
    );
    let blocks = store.blocks().await;
    assert_eq!(blocks.len(), 5);

    let (block_id, block) = &blocks[4];
    assert_eq!(block.number, 5);
    assert_eq!(block.transactions.len(), 1);
    let receipts = store.receipts(*block_id).await;
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].gas_used, 21_000);
}

#[tokio::test]
async fn rerun_over_imported_range_writes_nothing() {
    let db = Arc::new(MockChainDatabase::with_range(1, 30));
    let transaction = eip155_transaction();
    let receipt = receipt_for(transaction.hash(), 21_000);
    db.insert(raw_block(7, block_hash(7), vec![transaction]), vec![receipt]);
    let store = Arc::new(InMemoryStore::new(NODE_ID));
    let importer = importer(&db, &store);

    importer.import_range(1, 30).await.unwrap();
    let writes = store.writes().await;

    let summary = importer.import_range(1, 30).await.unwrap();

    assert_eq!(
        summary,
        ImportSummary {
            imported: 0,
            skipped: 30
        }
    );
    assert_eq!(store.writes().await, writes);
}

#[tokio::test]
async fn finality_watermark_trails_the_range_end() {
    let db = Arc::new(MockChainDatabase::with_range(1, 30));
    let store = Arc::new(InMemoryStore::new(NODE_ID));

    importer(&db, &store).import_range(1, 30).await.unwrap();

    for (_, block) in store.blocks().await {
        assert_eq!(block.is_final, block.number < 10, "block {}", block.number);
    }
}

#[tokio::test]
async fn diverged_block_is_replaced() {
    let db = Arc::new(MockChainDatabase::with_range(1, 3));
    let store = Arc::new(InMemoryStore::new(NODE_ID));
    let importer = importer(&db, &store);
    importer.import_range(1, 3).await.unwrap();

    let new_hash = B256::repeat_byte(0x03);
    db.insert(raw_block(3, new_hash, Vec::new()), Vec::new());
    let summary = importer.import_range(1, 3).await.unwrap();

    assert_eq!(
        summary,
        ImportSummary {
            imported: 1,
            skipped: 2
        }
    );
    let blocks = store.blocks().await;
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[2].1.hash, new_hash);
}

#[tokio::test]
async fn missing_canonical_hash_aborts_the_import() {
    let db = Arc::new(MockChainDatabase::with_range(1, 3));
    let store = Arc::new(InMemoryStore::new(NODE_ID));

    let result = importer(&db, &store).import_range(1, 5).await;

    assert!(matches!(
        result,
        Err(ImportError::MissingCanonicalHash { block_number: 4 })
    ));
    assert_eq!(store.blocks().await.len(), 3);
}

#[tokio::test]
async fn missing_receipts_fail_the_block() {
    let db = Arc::new(MockChainDatabase::default());
    db.insert(raw_block(1, block_hash(1), vec![eip155_transaction()]), Vec::new());
    let store = Arc::new(InMemoryStore::new(NODE_ID));

    let result = importer(&db, &store).import_range(1, 1).await;

    assert!(matches!(result, Err(ImportError::Convert(_))));
    assert!(store.blocks().await.is_empty());
}

#[tokio::test]
async fn database_read_error_aborts_the_import() {
    let db = Arc::new(MockChainDatabase::with_range(1, 5));
    db.corrupt(3);
    let store = Arc::new(InMemoryStore::new(NODE_ID));

    let result = importer(&db, &store).import_range(1, 5).await;

    assert!(matches!(
        result,
        Err(ImportError::Chain(ChainError::Database(_)))
    ));
    assert_eq!(store.blocks().await.len(), 2);
}
