#![allow(dead_code)]

use alloy_consensus::{Eip658Value, SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Address, B64, B256, Bloom, Bytes, Signature, TxKind, U256, hex};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use ledger_indexer::indexer::ChainClient;
use ledger_indexer::models::common::NodeInfo;
use ledger_indexer::models::datasets::blocks::RawBlock;
use ledger_indexer::models::datasets::headers::Header;
use ledger_indexer::models::datasets::logs::Log;
use ledger_indexer::models::datasets::transactions::{RawReceipt, RawTransaction};
use ledger_indexer::models::errors::ChainError;

pub const NODE_ID: &str = "mock-node";

//////// EIP-155 example transaction ////////
// nonce 9, 20 gwei, 21000 gas, 1 ether to 0x3535...35, chain id 1
pub const EIP155_TX_RLP: &str = concat!(
    "f86c098504a817c800825208943535353535353535353535353535353535353535880de0",
    "b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590",
    "620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
);
pub const EIP155_TX_SENDER: &str = "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F";

pub fn eip155_transaction() -> RawTransaction {
    let bytes = hex::decode(EIP155_TX_RLP).unwrap();
    RawTransaction::new(TxEnvelope::decode_2718(&mut bytes.as_slice()).unwrap())
}

/// Legacy transaction with a placeholder signature. Its hash is stable but its sender
/// cannot be recovered.
pub fn legacy_transaction(nonce: u64, gas_price: u128) -> RawTransaction {
    let tx = TxLegacy {
        chain_id: Some(1),
        nonce,
        gas_price,
        gas_limit: 21_000,
        to: TxKind::Call(Address::repeat_byte(0x35)),
        value: U256::from(1_000u64),
        input: Bytes::new(),
    };
    let signature = Signature::new(U256::from(1u64), U256::from(1u64), false);
    RawTransaction::new(TxEnvelope::from(tx.into_signed(signature)))
}

pub fn receipt_for(tx_hash: B256, gas_used: u64) -> RawReceipt {
    RawReceipt {
        tx_hash,
        contract_address: None,
        cumulative_gas_used: gas_used,
        gas_used,
        logs_bloom: Bloom::ZERO,
        status: Eip658Value::Eip658(true),
        logs: Vec::new(),
    }
}

pub fn block_hash(number: u64) -> B256 {
    B256::left_padding_from(&number.to_be_bytes())
}

pub fn raw_block(number: u64, hash: B256, transactions: Vec<RawTransaction>) -> RawBlock {
    RawBlock {
        number,
        hash,
        parent_hash: block_hash(number.saturating_sub(1)),
        timestamp: 1_500_000_000 + number,
        difficulty: U256::from(1_000u64),
        gas_limit: 8_000_000,
        gas_used: 21_000 * transactions.len() as u64,
        miner: Address::repeat_byte(0xaa),
        nonce: B64::ZERO,
        extra_data: Bytes::new(),
        uncle_hash: B256::ZERO,
        size: 500,
        transactions,
        uncles: Vec::new(),
    }
}

pub fn node_info() -> NodeInfo {
    NodeInfo {
        id: NODE_ID.to_string(),
        client_name: "Mock/v1.0.0".to_string(),
        network_id: "1".to_string(),
        genesis_block: block_hash(0).to_string(),
    }
}

#[derive(Default)]
struct MockState {
    head: u64,
    hashes: HashMap<u64, B256>,
    failing_headers: HashSet<u64>,
    logs: HashMap<u64, Vec<Log>>,
    failing_logs: HashSet<u64>,
    blocks: BTreeMap<u64, RawBlock>,
    senders: HashMap<B256, Address>,
    receipts: HashMap<B256, RawReceipt>,
    failing_receipts: HashSet<B256>,
    delays: HashMap<B256, Duration>,
    header_calls: usize,
    receipt_calls: Vec<B256>,
}

/// Scripted node. Block `n` hashes to [`block_hash`] unless overridden.
pub struct MockChainClient {
    node: NodeInfo,
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub fn new(head: u64) -> Self {
        Self {
            node: node_info(),
            state: Mutex::new(MockState {
                head,
                ..MockState::default()
            }),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    /// Simulates a reorg at `number`.
    pub fn set_hash(&self, number: u64, hash: B256) {
        self.state.lock().unwrap().hashes.insert(number, hash);
    }

    pub fn fail_header(&self, number: u64, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_headers.insert(number);
        } else {
            state.failing_headers.remove(&number);
        }
    }

    pub fn add_logs(&self, number: u64, logs: Vec<Log>) {
        self.state.lock().unwrap().logs.entry(number).or_default().extend(logs);
    }

    /// Replaces every log at `number`, as a reorg onto a different block would.
    pub fn set_logs(&self, number: u64, logs: Vec<Log>) {
        self.state.lock().unwrap().logs.insert(number, logs);
    }

    pub fn fail_logs(&self, number: u64, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_logs.insert(number);
        } else {
            state.failing_logs.remove(&number);
        }
    }

    pub fn add_block(&self, block: RawBlock) {
        self.state.lock().unwrap().blocks.insert(block.number, block);
    }

    pub fn add_transaction(&self, tx_hash: B256, sender: Address, receipt: RawReceipt, delay: Duration) {
        let mut state = self.state.lock().unwrap();
        state.senders.insert(tx_hash, sender);
        state.receipts.insert(tx_hash, receipt);
        state.delays.insert(tx_hash, delay);
    }

    pub fn fail_receipt(&self, tx_hash: B256) {
        self.state.lock().unwrap().failing_receipts.insert(tx_hash);
    }

    pub fn header_calls(&self) -> usize {
        self.state.lock().unwrap().header_calls
    }

    pub fn receipt_calls(&self) -> Vec<B256> {
        self.state.lock().unwrap().receipt_calls.clone()
    }

    fn hash_of(state: &MockState, number: u64) -> B256 {
        state
            .hashes
            .get(&number)
            .copied()
            .unwrap_or_else(|| block_hash(number))
    }
}

fn scripted(method: &str) -> ChainError {
    ChainError::rpc(method, "scripted failure")
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn node(&self) -> &NodeInfo {
        &self.node
    }

    async fn latest_header(&self) -> Result<(u64, B256), ChainError> {
        let state = self.state.lock().unwrap();
        Ok((state.head, Self::hash_of(&state, state.head)))
    }

    async fn header_by_number(&self, block_number: u64) -> Result<Header, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.header_calls += 1;
        if state.failing_headers.contains(&block_number) {
            return Err(scripted("eth_getBlockByNumber"));
        }
        if block_number > state.head {
            return Err(ChainError::MissingHeader { block_number });
        }
        let hash = Self::hash_of(&state, block_number);
        Ok(Header::new(
            block_number,
            hash,
            Bytes::copy_from_slice(hash.as_slice()),
            1_500_000_000 + block_number,
            NODE_ID,
        ))
    }

    async fn block_by_number(&self, block_number: u64) -> Result<RawBlock, ChainError> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .get(&block_number)
            .cloned()
            .ok_or(ChainError::MissingBlock { block_number })
    }

    async fn filter_logs(
        &self,
        addresses: &[Address],
        topics: &[Vec<B256>],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainError> {
        let state = self.state.lock().unwrap();
        let mut matching = Vec::new();
        for number in from_block..=to_block {
            if state.failing_logs.contains(&number) {
                return Err(scripted("eth_getLogs"));
            }
            let Some(logs) = state.logs.get(&number) else {
                continue;
            };
            matching.extend(logs.iter().filter(|log| {
                (addresses.is_empty() || addresses.contains(&log.address))
                    && topics.iter().enumerate().all(|(position, wanted)| {
                        wanted.is_empty()
                            || log
                                .topics
                                .get(position)
                                .is_some_and(|topic| wanted.contains(topic))
                    })
            }).cloned());
        }
        Ok(matching)
    }

    async fn transaction_sender(
        &self,
        transaction: &RawTransaction,
        block_hash: B256,
        index: u64,
    ) -> Result<Address, ChainError> {
        let delay = {
            let state = self.state.lock().unwrap();
            state.delays.get(&transaction.hash()).copied().unwrap_or_default()
        };
        tokio::time::sleep(delay).await;

        self.state
            .lock()
            .unwrap()
            .senders
            .get(&transaction.hash())
            .copied()
            .ok_or(ChainError::MissingTransaction {
                block_hash: block_hash.to_string(),
                index,
            })
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<RawReceipt, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.receipt_calls.push(tx_hash);
        if state.failing_receipts.contains(&tx_hash) {
            return Err(scripted("eth_getTransactionReceipt"));
        }
        state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or(ChainError::MissingReceipt {
                tx_hash: tx_hash.to_string(),
            })
    }

    async fn call_contract(
        &self,
        _to: Address,
        _data: Bytes,
        _block_number: u64,
    ) -> Result<Bytes, ChainError> {
        Ok(Bytes::new())
    }
}
