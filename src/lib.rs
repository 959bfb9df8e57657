//! Learned cardinality estimation served over a shared-memory mailbox.
//!
//! A requester process writes estimate or generic requests into a mapped
//! control block; the `PollLoop` answers them from per-entity models, the raw
//! model store or an external query engine.

pub mod client;
pub mod common;
pub mod dispatch;
pub mod inference;
pub mod ipc;
pub mod models;
pub mod server;

pub use client::Requester;
pub use common::{AppCfg, CardError, CardResult, ErrorCode};
pub use dispatch::OpcodeDispatcher;
pub use inference::{EstimateRequest, Predictor};
pub use ipc::ControlBlock;
pub use server::PollLoop;
