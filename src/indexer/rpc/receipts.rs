use alloy_consensus::TxReceipt;
use alloy_rpc_types_eth::{Log as RpcLog, TransactionReceipt};

use crate::models::datasets::logs::Log;
use crate::models::datasets::transactions::RawReceipt;

pub trait ReceiptParser {
    fn parse_receipt(self) -> RawReceipt;
}

pub trait LogParser {
    fn parse_log(self) -> Log;
}

impl ReceiptParser for TransactionReceipt {
    fn parse_receipt(self) -> RawReceipt {
        let envelope = &self.inner;

        RawReceipt {
            tx_hash: self.transaction_hash,
            contract_address: self.contract_address,
            cumulative_gas_used: envelope.cumulative_gas_used(),
            gas_used: self.gas_used,
            logs_bloom: envelope.bloom(),
            status: envelope.status_or_post_state(),
            logs: envelope
                .logs()
                .iter()
                .cloned()
                .map(LogParser::parse_log)
                .collect(),
        }
    }
}

impl LogParser for RpcLog {
    fn parse_log(self) -> Log {
        Log {
            address: self.inner.address,
            block_number: self.block_number.unwrap_or_default(),
            tx_hash: self.transaction_hash.unwrap_or_default(),
            tx_index: self.transaction_index.unwrap_or_default(),
            index: self.log_index.unwrap_or_default(),
            topics: self.inner.data.topics().to_vec(),
            data: self.inner.data.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, Bytes, LogData};

    #[test]
    fn parses_rpc_log_fields() {
        let topic = B256::repeat_byte(0x11);
        let rpc_log = RpcLog {
            inner: alloy_primitives::Log {
                address: Address::repeat_byte(0x22),
                data: LogData::new_unchecked(vec![topic], Bytes::from(vec![1, 2, 3])),
            },
            block_number: Some(42),
            transaction_hash: Some(B256::repeat_byte(0x33)),
            transaction_index: Some(2),
            log_index: Some(7),
            ..Default::default()
        };

        let log = rpc_log.parse_log();
        assert_eq!(log.address, Address::repeat_byte(0x22));
        assert_eq!(log.block_number, 42);
        assert_eq!(log.tx_index, 2);
        assert_eq!(log.index, 7);
        assert_eq!(log.topics, vec![topic]);
        assert_eq!(log.data, Bytes::from(vec![1, 2, 3]));
    }
}
