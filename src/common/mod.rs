//! Shared utilities that glue the different components together.
pub mod config;
pub mod error;
pub mod log;

pub use config::{AppCfg, GlobalModelIds};
pub use error::{CardError, CardResult, ErrorCode};
