use alloy_primitives::U256;
use bigdecimal::BigDecimal;

use crate::models::common::RewardSchedule;
use crate::models::datasets::blocks::RawUncle;
use crate::models::datasets::transactions::Transaction;
use crate::utils::u256_to_decimal;

// wei per ether
const NATIVE_UNIT_SCALE: i64 = 18;

const PRE_BYZANTIUM_REWARD: u64 = 5;
const BYZANTIUM_REWARD: u64 = 3;

pub fn static_block_reward(block_number: u64, schedule: &RewardSchedule) -> BigDecimal {
    if block_number < schedule.byzantium_block {
        BigDecimal::from(PRE_BYZANTIUM_REWARD)
    } else {
        BigDecimal::from(BYZANTIUM_REWARD)
    }
}

/// Sum of `gas_price * receipt.gas_used` over all transactions, in native units.
pub fn transaction_fees(transactions: &[Transaction]) -> BigDecimal {
    let wei = transactions.iter().fold(U256::ZERO, |acc, tx| {
        acc + U256::from(tx.gas_price) * U256::from(tx.receipt.gas_used)
    });
    u256_to_decimal(wei, NATIVE_UNIT_SCALE)
}

/// Reward paid to the block miner for including `uncle_count` uncles.
pub fn uncle_inclusion_reward(
    block_number: u64,
    uncle_count: usize,
    schedule: &RewardSchedule,
) -> BigDecimal {
    static_block_reward(block_number, schedule) * BigDecimal::from(uncle_count as u64)
        / BigDecimal::from(32u64)
}

/// Reward paid to the miner of an uncle at `uncle_number` included by `block_number`.
///
/// Scales with depth: `static * (1 + (uncle_number - block_number) / 8)`.
pub fn uncle_miner_reward(
    block_number: u64,
    uncle_number: u64,
    schedule: &RewardSchedule,
) -> BigDecimal {
    let depth = uncle_number as i64 - block_number as i64;
    static_block_reward(block_number, schedule) * BigDecimal::from(8 + depth) / BigDecimal::from(8)
}

pub fn block_reward(
    block_number: u64,
    transactions: &[Transaction],
    uncles: &[RawUncle],
    schedule: &RewardSchedule,
) -> BigDecimal {
    static_block_reward(block_number, schedule)
        + transaction_fees(transactions)
        + uncle_inclusion_reward(block_number, uncles.len(), schedule)
}

pub fn uncles_reward(block_number: u64, uncles: &[RawUncle], schedule: &RewardSchedule) -> BigDecimal {
    uncles
        .iter()
        .map(|uncle| uncle_miner_reward(block_number, uncle.number, schedule))
        .fold(BigDecimal::from(0u64), |acc, reward| acc + reward)
}
