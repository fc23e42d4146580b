pub mod types;
pub mod dedup;
pub mod data_fetcher;
pub mod indicators;
pub mod features;
pub mod classifier;
pub mod planner;
pub mod executor;
pub mod observer;
pub mod trading_agent;

pub use trading_agent::TradingAgent;
pub use types::*;
