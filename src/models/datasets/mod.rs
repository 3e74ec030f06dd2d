pub mod blocks;
pub mod events;
pub mod headers;
pub mod logs;
pub mod transactions;
