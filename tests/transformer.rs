mod common;

use alloy_primitives::{Address, B256, Bytes, U256, b256};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use ledger_indexer::indexer::ChainClient;
use ledger_indexer::models::common::ExecuteConfig;
use ledger_indexer::models::datasets::events::{DecodedEvent, EventKey, TransformerConfig};
use ledger_indexer::models::datasets::logs::Log;
use ledger_indexer::models::errors::TransformerError;
use ledger_indexer::storage::HeaderRepository;
use ledger_indexer::storage::memory::{InMemoryEventRepository, InMemoryStore};
use ledger_indexer::transformer::abi::AbiEventConverter;
use ledger_indexer::transformer::fetcher::ChainLogFetcher;
use ledger_indexer::transformer::watcher::EventWatcher;
use ledger_indexer::transformer::{EventTransformer, ExecuteSummary};

use common::{MockChainClient, NODE_ID};

const CHECKED: &str = "transfer_checked";

const TRANSFER_TOPIC: B256 =
    b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

const TRANSFER_ABI: &str = r#"[{"type":"event","name":"Transfer","anonymous":false,"inputs":[
    {"name":"from","type":"address","indexed":true},
    {"name":"to","type":"address","indexed":true},
    {"name":"value","type":"uint256","indexed":false}]}]"#;

type Transformer = EventTransformer<ChainLogFetcher, AbiEventConverter, InMemoryEventRepository<DecodedEvent>>;

fn token() -> Address {
    Address::repeat_byte(0x70)
}

fn transformer_config(start: u64, end: i64) -> TransformerConfig {
    TransformerConfig {
        event_name: "Transfer".to_string(),
        contract_addresses: vec![token()],
        contract_abi: TRANSFER_ABI.to_string(),
        topic_signature: TRANSFER_TOPIC,
        starting_block_number: start,
        ending_block_number: end,
        checked_column_name: CHECKED.to_string(),
        table_name: None,
    }
}

fn transfer_log(block_number: u64, tx_index: u64, index: u64, value: u64) -> Log {
    Log {
        address: token(),
        block_number,
        tx_hash: B256::with_last_byte(tx_index as u8),
        tx_index,
        index,
        topics: vec![
            TRANSFER_TOPIC,
            Address::repeat_byte(0x11).into_word(),
            Address::repeat_byte(0x22).into_word(),
        ],
        data: Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec()),
    }
}

// Missing the `to` topic, so the ABI converter cannot decode it
fn malformed_log(block_number: u64) -> Log {
    let mut log = transfer_log(block_number, 0, 0, 1);
    log.topics.truncate(2);
    log
}

struct Fixture {
    chain: Arc<MockChainClient>,
    store: Arc<InMemoryStore>,
}

impl Fixture {
    async fn new(head: u64) -> Self {
        let chain = Arc::new(MockChainClient::new(head));
        let store = Arc::new(InMemoryStore::new(NODE_ID));
        for number in 0..=head {
            let header = chain.header_by_number(number).await.unwrap();
            store.create_or_update_header(&header).await.unwrap();
        }
        Self { chain, store }
    }

    fn transformer(&self, config: TransformerConfig) -> Transformer {
        let converter = AbiEventConverter::new(&config).unwrap();
        EventTransformer::new(
            config,
            ChainLogFetcher::new(self.chain.clone()),
            converter,
            self.store.event_repository(CHECKED),
        )
    }

    async fn header_id(&self, number: u64) -> i64 {
        self.store.get_header(number).await.unwrap().unwrap().id
    }

    async fn rows_for(&self, number: u64) -> usize {
        let header_id = self.header_id(number).await;
        self.store
            .event_rows(CHECKED)
            .await
            .keys()
            .filter(|key| key.header_id == header_id)
            .count()
    }
}

#[tokio::test]
async fn header_without_logs_is_checked_without_models() {
    let fixture = Fixture::new(3).await;
    let transformer = fixture.transformer(transformer_config(0, -1));

    let summary = transformer.execute().await.unwrap();

    assert_eq!(
        summary,
        ExecuteSummary {
            headers_checked: 4,
            models_persisted: 0
        }
    );
    for number in 0..=3 {
        assert!(fixture.store.is_checked(fixture.header_id(number).await, CHECKED).await);
    }
    assert!(fixture.store.event_rows(CHECKED).await.is_empty());
    assert_eq!(fixture.store.writes().await.event_rows, 0);
}

#[tokio::test]
async fn every_matching_log_becomes_one_model() {
    let fixture = Fixture::new(3).await;
    fixture.chain.add_logs(
        2,
        vec![
            transfer_log(2, 0, 0, 100),
            transfer_log(2, 0, 1, 200),
            transfer_log(2, 4, 7, 300),
        ],
    );
    let transformer = fixture.transformer(transformer_config(0, -1));

    let summary = transformer.execute().await.unwrap();

    assert_eq!(summary.models_persisted, 3);
    let header_id = fixture.header_id(2).await;
    assert!(fixture.store.is_checked(header_id, CHECKED).await);

    let rows = fixture.store.event_rows(CHECKED).await;
    let keys: Vec<EventKey> = rows.keys().copied().collect();
    assert_eq!(
        keys,
        vec![
            EventKey { header_id, transaction_index: 0, log_index: 0 },
            EventKey { header_id, transaction_index: 0, log_index: 1 },
            EventKey { header_id, transaction_index: 4, log_index: 7 },
        ]
    );
    let last = &rows[&keys[2]];
    assert_eq!(last["params"]["value"], "300");
    assert_eq!(last["event_name"], "Transfer");
}

#[tokio::test]
async fn logs_of_other_contracts_or_events_are_ignored() {
    let fixture = Fixture::new(1).await;
    let mut foreign_contract = transfer_log(1, 0, 0, 5);
    foreign_contract.address = Address::repeat_byte(0x99);
    let mut foreign_event = transfer_log(1, 0, 1, 5);
    foreign_event.topics[0] = B256::repeat_byte(0x01);
    fixture.chain.add_logs(1, vec![foreign_contract, foreign_event]);

    let summary = fixture.transformer(transformer_config(0, -1)).execute().await.unwrap();

    assert_eq!(summary.models_persisted, 0);
    assert!(fixture.store.is_checked(fixture.header_id(1).await, CHECKED).await);
}

#[tokio::test]
async fn rerunning_is_idempotent() {
    let fixture = Fixture::new(3).await;
    fixture.chain.add_logs(1, vec![transfer_log(1, 0, 0, 10), transfer_log(1, 1, 1, 20)]);
    let transformer = fixture.transformer(transformer_config(0, -1));

    transformer.execute().await.unwrap();
    let rows = fixture.store.event_rows(CHECKED).await;

    // Nothing is left unchecked, so the second run is a no-op
    let summary = transformer.execute().await.unwrap();
    assert_eq!(summary, ExecuteSummary::default());
    assert_eq!(fixture.store.event_rows(CHECKED).await, rows);

    // A reorg to the same logs reprocesses the header onto the same keys
    fixture.chain.set_hash(1, B256::repeat_byte(0x01));
    let header = fixture.chain.header_by_number(1).await.unwrap();
    fixture.store.create_or_update_header(&header).await.unwrap();

    let summary = transformer.execute().await.unwrap();
    assert_eq!(summary.headers_checked, 1);
    assert_eq!(summary.models_persisted, 2);
    assert_eq!(fixture.store.event_rows(CHECKED).await, rows);
}

#[tokio::test]
async fn reorg_onto_fewer_logs_drops_orphaned_rows() {
    let fixture = Fixture::new(2).await;
    fixture.chain.add_logs(
        1,
        vec![
            transfer_log(1, 0, 0, 10),
            transfer_log(1, 1, 1, 20),
            transfer_log(1, 2, 2, 30),
        ],
    );
    let transformer = fixture.transformer(transformer_config(0, -1));
    transformer.execute().await.unwrap();
    assert_eq!(fixture.rows_for(1).await, 3);

    // The canonical block at 1 now carries a single, different transfer
    fixture.chain.set_hash(1, B256::repeat_byte(0x01));
    fixture.chain.set_logs(1, vec![transfer_log(1, 4, 7, 99)]);
    let header = fixture.chain.header_by_number(1).await.unwrap();
    fixture.store.create_or_update_header(&header).await.unwrap();
    assert_eq!(fixture.rows_for(1).await, 0);

    let summary = transformer.execute().await.unwrap();

    assert_eq!(summary.headers_checked, 1);
    assert_eq!(summary.models_persisted, 1);
    let header_id = fixture.header_id(1).await;
    let keys: Vec<EventKey> = fixture
        .store
        .event_rows(CHECKED)
        .await
        .into_keys()
        .filter(|key| key.header_id == header_id)
        .collect();
    assert_eq!(
        keys,
        vec![EventKey {
            header_id,
            transaction_index: 4,
            log_index: 7,
        }]
    );
    assert!(fixture.store.is_checked(header_id, CHECKED).await);
}

#[tokio::test]
async fn reorg_onto_block_without_logs_leaves_no_rows() {
    let fixture = Fixture::new(2).await;
    fixture
        .chain
        .add_logs(1, vec![transfer_log(1, 0, 0, 10), transfer_log(1, 1, 1, 20)]);
    fixture.chain.add_logs(2, vec![transfer_log(2, 0, 0, 5)]);
    let transformer = fixture.transformer(transformer_config(0, -1));
    transformer.execute().await.unwrap();

    fixture.chain.set_hash(1, B256::repeat_byte(0x01));
    fixture.chain.set_logs(1, Vec::new());
    let header = fixture.chain.header_by_number(1).await.unwrap();
    fixture.store.create_or_update_header(&header).await.unwrap();

    let summary = transformer.execute().await.unwrap();

    assert_eq!(summary.headers_checked, 1);
    assert_eq!(summary.models_persisted, 0);
    assert_eq!(fixture.rows_for(1).await, 0);
    assert!(fixture.store.is_checked(fixture.header_id(1).await, CHECKED).await);
    // Neighbouring headers keep their rows
    assert_eq!(fixture.rows_for(2).await, 1);
}

#[tokio::test]
async fn decode_error_leaves_header_unchecked_and_keeps_earlier_headers() {
    let fixture = Fixture::new(3).await;
    fixture.chain.add_logs(1, vec![transfer_log(1, 0, 0, 10)]);
    fixture
        .chain
        .add_logs(2, vec![transfer_log(2, 0, 0, 10), malformed_log(2)]);
    let transformer = fixture.transformer(transformer_config(0, -1));

    let err = transformer.execute().await.unwrap_err();

    assert!(matches!(err, TransformerError::Convert { block_number: 2, .. }));
    // Earlier headers stay committed
    assert!(fixture.store.is_checked(fixture.header_id(0).await, CHECKED).await);
    assert!(fixture.store.is_checked(fixture.header_id(1).await, CHECKED).await);
    assert_eq!(fixture.rows_for(1).await, 1);
    // The failing header has neither rows nor a flag, and the run stopped there
    assert!(!fixture.store.is_checked(fixture.header_id(2).await, CHECKED).await);
    assert_eq!(fixture.rows_for(2).await, 0);
    assert!(!fixture.store.is_checked(fixture.header_id(3).await, CHECKED).await);
}

#[tokio::test]
async fn persist_failure_leaves_no_partial_state() {
    let fixture = Fixture::new(1).await;
    fixture.chain.add_logs(1, vec![transfer_log(1, 0, 0, 10), transfer_log(1, 0, 1, 11)]);
    let transformer = fixture.transformer(transformer_config(1, -1));

    fixture.store.fail_event_writes(true).await;
    let err = transformer.execute().await.unwrap_err();

    assert!(matches!(err, TransformerError::Persist { block_number: 1, .. }));
    assert!(!fixture.store.is_checked(fixture.header_id(1).await, CHECKED).await);
    assert!(fixture.store.event_rows(CHECKED).await.is_empty());

    fixture.store.fail_event_writes(false).await;
    let summary = transformer.execute().await.unwrap();
    assert_eq!(summary.models_persisted, 2);
    assert!(fixture.store.is_checked(fixture.header_id(1).await, CHECKED).await);
}

#[tokio::test]
async fn fetch_error_aborts_the_run() {
    let fixture = Fixture::new(2).await;
    fixture.chain.fail_logs(1, true);
    let transformer = fixture.transformer(transformer_config(0, -1));

    let err = transformer.execute().await.unwrap_err();

    assert!(matches!(err, TransformerError::FetchLogs { block_number: 1, .. }));
    assert!(fixture.store.is_checked(fixture.header_id(0).await, CHECKED).await);
    assert!(!fixture.store.is_checked(fixture.header_id(1).await, CHECKED).await);
    assert!(!fixture.store.is_checked(fixture.header_id(2).await, CHECKED).await);
}

#[tokio::test]
async fn only_headers_in_range_are_processed() {
    let fixture = Fixture::new(6).await;
    let transformer = fixture.transformer(transformer_config(2, 4));

    let summary = transformer.execute().await.unwrap();

    assert_eq!(summary.headers_checked, 3);
    for number in 0..=6 {
        let checked = fixture.store.is_checked(fixture.header_id(number).await, CHECKED).await;
        assert_eq!(checked, (2..=4).contains(&number), "block {number}");
    }
}

#[tokio::test]
async fn cancelled_run_checks_nothing() {
    let fixture = Fixture::new(3).await;
    let transformer = fixture.transformer(transformer_config(0, -1));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = transformer.execute_until(&cancel).await.unwrap();

    assert_eq!(summary, ExecuteSummary::default());
    assert_eq!(fixture.store.writes().await.checked_flags, 0);
}

//////// Watcher ////////
#[tokio::test]
async fn watcher_gives_up_after_too_many_consecutive_errors() {
    let fixture = Fixture::new(1).await;
    fixture.chain.fail_logs(0, true);
    let mut watcher = EventWatcher::new(ExecuteConfig {
        retry_interval_secs: 0,
        max_consecutive_unexpected_errors: 2,
    });
    watcher.add_transformer(Arc::new(fixture.transformer(transformer_config(0, -1))));

    let result = tokio::time::timeout(Duration::from_secs(5), watcher.run(CancellationToken::new()))
        .await
        .unwrap();

    assert!(matches!(
        result,
        Err(TransformerError::GaveUp { errors: 3, .. })
    ));
}

#[tokio::test]
async fn watcher_keeps_processing_new_headers_until_cancelled() {
    let fixture = Fixture::new(1).await;
    let mut watcher = EventWatcher::new(ExecuteConfig {
        retry_interval_secs: 0,
        max_consecutive_unexpected_errors: 2,
    });
    watcher.add_transformer(Arc::new(fixture.transformer(transformer_config(0, -1))));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(watcher.run(cancel.clone()));

    // A header arriving after the first pass is picked up by a later one
    fixture.chain.set_head(2);
    fixture.chain.add_logs(2, vec![transfer_log(2, 0, 0, 42)]);
    let header = fixture.chain.header_by_number(2).await.unwrap();
    fixture.store.create_or_update_header(&header).await.unwrap();

    let header_id = fixture.header_id(2).await;
    let checked = tokio::time::timeout(Duration::from_secs(5), async {
        while !fixture.store.is_checked(header_id, CHECKED).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(checked.is_ok());
    assert_eq!(fixture.rows_for(2).await, 1);

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
