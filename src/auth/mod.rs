//! # Authentication Module
//!
//! Bearer-token guard for the control API. The token is the `control_token`
//! generated into the config file on first run.

pub mod middleware;

pub use middleware::ControlToken;
