use alloy_consensus::Eip658Value;
use alloy_primitives::{Address, hex};

use crate::models::datasets::transactions::{RECEIPT_STATUS_SENTINEL, RawReceipt, Receipt};

pub trait ReceiptTransformer {
    fn transform_receipt(self) -> Receipt;
}

impl ReceiptTransformer for RawReceipt {
    fn transform_receipt(self) -> Receipt {
        let (state_root, status) = match self.status {
            Eip658Value::PostState(root) => (hex::encode_prefixed(root), RECEIPT_STATUS_SENTINEL),
            Eip658Value::Eip658(success) => (String::new(), i32::from(success)),
        };

        Receipt {
            tx_hash: self.tx_hash,
            contract_address: contract_address_string(self.contract_address),
            cumulative_gas_used: self.cumulative_gas_used,
            gas_used: self.gas_used,
            bloom: self.logs_bloom,
            state_root,
            status,
            logs: self.logs,
        }
    }
}

// Zero address and absent address both normalize to ""
fn contract_address_string(address: Option<Address>) -> String {
    match address {
        Some(address) if address != Address::ZERO => address.to_checksum(None),
        _ => String::new(),
    }
}
