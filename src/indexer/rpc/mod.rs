pub mod blocks;
pub mod receipts;
