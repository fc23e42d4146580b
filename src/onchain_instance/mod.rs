//! # Onchain Program Instance Module
//!
//! Everything that touches the pump.fun program directly.
//!
//! ## Features
//! - Bonding curve account decoding and spot price
//! - Buy/sell instruction building over one shared builder
//! - Rate-limited RPC access behind the `ChainRpc` capability

pub mod bonding_curve;
pub mod instance;
pub mod rpc;
