//! Responder side of the control block.

pub mod poll_loop;

pub use poll_loop::{LoopState, PollLoop};
