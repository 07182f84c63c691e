pub mod config;
pub mod error;
pub mod fee_schedule;
pub mod fee_utils;
pub mod replica;
pub mod tx_types;
