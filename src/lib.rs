//! Ethereum Deposit-Address Clustering Library
//!
//! Investigates Ethereum address relationships through the Etherscan API:
//! forward clustering (user -> deposit -> exchange) and backward
//! funding-source discovery.

pub mod analyzer;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod etherscan;
pub mod exchanges;
pub mod fetcher;
pub mod funding;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
