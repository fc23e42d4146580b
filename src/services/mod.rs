//! # Services Module
//!
//! Stateful services shared by the agent and the control API.

pub mod ledger;

pub use ledger::{Holding, PurchaseLedger};
