use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::datasets::blocks::Block;
use crate::models::datasets::events::{EventKey, EventModel};
use crate::models::datasets::headers::{Header, HeaderUpsert};
use crate::models::datasets::transactions::Receipt;
use crate::models::errors::StorageError;
use crate::storage::{
    BLOCKS_FROM_HEAD_BEFORE_FINAL, BlockRepository, CheckedHeaderRepository, HeaderRepository,
};
use crate::transformer::EventRepository;

/// Rows changed per table since the store was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteCounts {
    pub headers: usize,
    pub checked_flags: usize,
    pub event_rows: usize,
    pub blocks: usize,
    pub receipts: usize,
    pub finalized: usize,
}

impl WriteCounts {
    pub fn total(&self) -> usize {
        self.headers + self.checked_flags + self.event_rows + self.blocks + self.receipts + self.finalized
    }
}

#[derive(Default)]
struct MemoryState {
    headers: BTreeMap<(String, u64), Header>,
    next_header_id: i64,
    checked: HashMap<i64, HashSet<String>>,
    events: HashMap<String, BTreeMap<EventKey, Value>>,
    blocks: BTreeMap<(String, u64), (i64, Block)>,
    next_block_id: i64,
    receipts: BTreeMap<i64, Vec<Receipt>>,
    fail_event_writes: bool,
    writes: WriteCounts,
}

/// Store backed by process memory with the same semantics as the Postgres store.
/// Mutations of one call happen under a single lock, which stands in for a database
/// transaction.
pub struct InMemoryStore {
    node_fingerprint: String,
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new(node_fingerprint: impl Into<String>) -> Self {
        Self {
            node_fingerprint: node_fingerprint.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn node_fingerprint(&self) -> &str {
        &self.node_fingerprint
    }

    pub async fn writes(&self) -> WriteCounts {
        self.state.lock().await.writes
    }

    pub async fn headers(&self) -> Vec<Header> {
        self.state.lock().await.headers.values().cloned().collect()
    }

    pub async fn is_checked(&self, header_id: i64, event_kind: &str) -> bool {
        self.state
            .lock()
            .await
            .checked
            .get(&header_id)
            .is_some_and(|kinds| kinds.contains(event_kind))
    }

    pub async fn event_rows(&self, event_kind: &str) -> BTreeMap<EventKey, Value> {
        self.state
            .lock()
            .await
            .events
            .get(event_kind)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn blocks(&self) -> Vec<(i64, Block)> {
        self.state.lock().await.blocks.values().cloned().collect()
    }

    pub async fn receipts(&self, block_id: i64) -> Vec<Receipt> {
        self.state
            .lock()
            .await
            .receipts
            .get(&block_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes every following event `create` fail before touching any row.
    pub async fn fail_event_writes(&self, fail: bool) {
        self.state.lock().await.fail_event_writes = fail;
    }

    pub fn event_repository<M: EventModel>(
        self: &Arc<Self>,
        event_kind: impl Into<String>,
    ) -> InMemoryEventRepository<M> {
        InMemoryEventRepository {
            store: Arc::clone(self),
            event_kind: event_kind.into(),
            _model: PhantomData,
        }
    }
}

fn mark_checked(state: &mut MemoryState, header_id: i64, event_kind: &str) {
    if state
        .checked
        .entry(header_id)
        .or_default()
        .insert(event_kind.to_string())
    {
        state.writes.checked_flags += 1;
    }
}

#[async_trait]
impl HeaderRepository for InMemoryStore {
    async fn create_or_update_header(&self, header: &Header) -> Result<HeaderUpsert, StorageError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let key = (header.node_fingerprint.clone(), header.block_number);

        if let Some(stored) = state.headers.get_mut(&key) {
            let id = stored.id;
            if stored.hash == header.hash {
                return Ok(HeaderUpsert::Unchanged(id));
            }
            stored.hash = header.hash;
            stored.raw = header.raw.clone();
            stored.timestamp = header.timestamp;
            state.checked.remove(&id);
            for rows in state.events.values_mut() {
                let before = rows.len();
                rows.retain(|key, _| key.header_id != id);
                state.writes.event_rows += before - rows.len();
            }
            state.writes.headers += 1;
            return Ok(HeaderUpsert::Replaced(id));
        }

        state.next_header_id += 1;
        let id = state.next_header_id;
        state.headers.insert(
            key,
            Header {
                id,
                ..header.clone()
            },
        );
        state.writes.headers += 1;
        Ok(HeaderUpsert::Inserted(id))
    }

    async fn get_header(&self, block_number: u64) -> Result<Option<Header>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .headers
            .get(&(self.node_fingerprint.clone(), block_number))
            .cloned())
    }

    async fn missing_block_numbers(
        &self,
        start: u64,
        end: u64,
        node_fingerprint: &str,
    ) -> Result<Vec<u64>, StorageError> {
        let state = self.state.lock().await;
        Ok((start..=end)
            .filter(|number| {
                !state
                    .headers
                    .contains_key(&(node_fingerprint.to_string(), *number))
            })
            .collect())
    }
}

#[async_trait]
impl CheckedHeaderRepository for InMemoryStore {
    async fn missing_headers(
        &self,
        start: u64,
        end: Option<u64>,
        event_kind: &str,
    ) -> Result<Vec<Header>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .headers
            .values()
            .filter(|header| header.node_fingerprint == self.node_fingerprint)
            .filter(|header| header.block_number >= start)
            .filter(|header| end.is_none_or(|end| header.block_number <= end))
            .filter(|header| {
                !state
                    .checked
                    .get(&header.id)
                    .is_some_and(|kinds| kinds.contains(event_kind))
            })
            .cloned()
            .collect())
    }

    async fn mark_header_checked(&self, header_id: i64, event_kind: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        mark_checked(&mut state, header_id, event_kind);
        Ok(())
    }
}

#[async_trait]
impl BlockRepository for InMemoryStore {
    async fn create_or_update_block(&self, block: &Block) -> Result<i64, StorageError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let key = (self.node_fingerprint.clone(), block.number);

        let stored = state
            .blocks
            .get(&key)
            .map(|(stored_id, stored)| (*stored_id, stored.hash));
        if let Some((stored_id, stored_hash)) = stored {
            if stored_hash == block.hash {
                return Err(StorageError::BlockExists {
                    block_number: block.number,
                });
            }
            state.blocks.remove(&key);
            state.receipts.remove(&stored_id);
        }

        state.next_block_id += 1;
        let id = state.next_block_id;
        state.blocks.insert(key, (id, block.clone()));
        state.writes.blocks += 1;
        Ok(id)
    }

    async fn create_receipts_and_logs(
        &self,
        block_id: i64,
        receipts: &[Receipt],
    ) -> Result<(), StorageError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let stored = state.receipts.entry(block_id).or_default();
        for receipt in receipts {
            match stored.iter_mut().find(|r| r.tx_hash == receipt.tx_hash) {
                Some(existing) => *existing = receipt.clone(),
                None => stored.push(receipt.clone()),
            }
        }
        state.writes.receipts += receipts.len();
        Ok(())
    }

    async fn set_blocks_status(&self, chain_head: u64) -> Result<(), StorageError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let watermark = chain_head.saturating_sub(BLOCKS_FROM_HEAD_BEFORE_FINAL);
        let mut finalized = 0;
        for ((fingerprint, number), (_, block)) in state.blocks.iter_mut() {
            if *fingerprint == self.node_fingerprint && *number < watermark && !block.is_final {
                block.is_final = true;
                finalized += 1;
            }
        }
        state.writes.finalized += finalized;
        Ok(())
    }
}

/// [`EventRepository`] over an [`InMemoryStore`]; models are kept as their JSON
/// serialization.
pub struct InMemoryEventRepository<M> {
    store: Arc<InMemoryStore>,
    event_kind: String,
    _model: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M: EventModel> EventRepository for InMemoryEventRepository<M> {
    type Model = M;

    async fn create(&self, header_id: i64, models: &[M]) -> Result<(), StorageError> {
        if models.is_empty() {
            return Err(StorageError::EmptyModels { header_id });
        }

        // Serialize everything before taking the lock so a bad model writes nothing
        let rows = models
            .iter()
            .map(|model| Ok((model.key(), serde_json::to_value(model)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;

        let mut guard = self.store.state.lock().await;
        let state = &mut *guard;
        if state.fail_event_writes {
            return Err(StorageError::Query("injected event write failure".to_string()));
        }

        let table = state.events.entry(self.event_kind.clone()).or_default();
        for (key, row) in rows {
            table.insert(key, row);
        }
        state.writes.event_rows += models.len();
        mark_checked(state, header_id, &self.event_kind);
        Ok(())
    }

    async fn missing_headers(&self, start: u64, end: Option<u64>) -> Result<Vec<Header>, StorageError> {
        self.store.missing_headers(start, end, &self.event_kind).await
    }

    async fn mark_header_checked(&self, header_id: i64) -> Result<(), StorageError> {
        self.store.mark_header_checked(header_id, &self.event_kind).await
    }
}
