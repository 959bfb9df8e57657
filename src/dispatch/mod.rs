//! Request decoding and routing.

pub mod domain;
pub mod engine;
pub mod service;

pub use domain::{Outcome, Request, RequestHeader, Response};
pub use engine::{CommandEngine, NoEngine, QueryEngine};
pub use service::OpcodeDispatcher;
