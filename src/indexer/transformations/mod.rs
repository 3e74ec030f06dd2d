pub mod blocks;
pub mod receipts;
pub mod rewards;
pub mod transactions;
