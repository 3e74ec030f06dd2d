use alloy_dyn_abi::{DynSolValue, EventExt};
use alloy_json_abi::{Event, JsonAbi};
use alloy_primitives::hex;
use serde_json::{Map, Value};

use crate::models::datasets::events::{DecodedEvent, TransformerConfig};
use crate::models::datasets::logs::Log;
use crate::models::errors::DecodeError;
use crate::transformer::LogConverter;

// Every non-indexed parameter occupies at least one head word
const WORD_SIZE: usize = 32;

/// Decodes logs of one configured event using the contract ABI, producing a JSON
/// projection keyed by parameter name.
pub struct AbiEventConverter {
    event: Event,
}

impl AbiEventConverter {
    pub fn new(config: &TransformerConfig) -> Result<Self, DecodeError> {
        let abi: JsonAbi = serde_json::from_str(&config.contract_abi)
            .map_err(|e| DecodeError::InvalidAbi(e.to_string()))?;

        // Overloads share a name; the configured topic picks the right one
        let event = abi
            .events
            .get(&config.event_name)
            .and_then(|candidates| {
                candidates
                    .iter()
                    .find(|event| event.anonymous || event.selector() == config.topic_signature)
            })
            .cloned()
            .ok_or_else(|| DecodeError::UnknownEvent {
                event: config.event_name.clone(),
            })?;

        Ok(Self { event })
    }

    fn expected_topics(&self) -> usize {
        let indexed = self.event.inputs.iter().filter(|input| input.indexed).count();
        if self.event.anonymous { indexed } else { indexed + 1 }
    }

    fn decode(&self, log: &Log) -> Result<Map<String, Value>, DecodeError> {
        let tx_hash = log.tx_hash.to_string();

        let expected = self.expected_topics();
        if log.topics.len() != expected {
            return Err(DecodeError::TopicCount {
                tx_hash,
                log_index: log.index,
                expected,
                got: log.topics.len(),
            });
        }

        let min_data = self.event.inputs.iter().filter(|input| !input.indexed).count() * WORD_SIZE;
        if log.data.len() < min_data {
            return Err(DecodeError::ShortData {
                tx_hash,
                log_index: log.index,
                expected: min_data,
                got: log.data.len(),
            });
        }

        let decoded = self
            .event
            .decode_log_parts(log.topics.iter().copied(), &log.data)
            .map_err(|e| DecodeError::Abi {
                tx_hash: tx_hash.clone(),
                log_index: log.index,
                message: e.to_string(),
            })?;

        let mut indexed = decoded.indexed.iter();
        let mut body = decoded.body.iter();
        let mut params = Map::new();

        for (position, input) in self.event.inputs.iter().enumerate() {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            };
            let Some(value) = value else {
                return Err(DecodeError::Abi {
                    tx_hash,
                    log_index: log.index,
                    message: format!("missing value for parameter {position}"),
                });
            };
            let name = if input.name.is_empty() {
                format!("param{position}")
            } else {
                input.name.clone()
            };
            params.insert(name, to_json(value));
        }

        Ok(params)
    }
}

impl LogConverter for AbiEventConverter {
    type Model = DecodedEvent;

    fn to_models(&self, logs: &[Log], header_id: i64) -> Result<Vec<DecodedEvent>, DecodeError> {
        logs.iter()
            .map(|log| {
                Ok(DecodedEvent {
                    header_id,
                    log_index: log.index,
                    transaction_index: log.tx_index,
                    event_name: self.event.name.clone(),
                    params: self.decode(log)?,
                    raw_log: log.clone(),
                })
            })
            .collect()
    }
}

// Integers are rendered as decimal strings so nothing is lost in JSON
fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => Value::String(hex::encode_prefixed(&word[..*size])),
        DynSolValue::Address(address) => Value::String(address.to_checksum(None)),
        DynSolValue::Function(function) => Value::String(hex::encode_prefixed(function)),
        DynSolValue::Bytes(bytes) => Value::String(hex::encode_prefixed(bytes)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) | DynSolValue::Tuple(values) => {
            Value::Array(values.iter().map(to_json).collect())
        }
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}
