//! Requester client for driving a responder through the control block.

pub mod requester;

pub use requester::Requester;
