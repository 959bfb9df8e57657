//! Shared-memory transport: the control block and its status sub-region.

pub mod control_block;
pub mod layout;
pub mod status;

pub use control_block::ControlBlock;
pub use status::{StatusChannel, StatusCode, StatusMessage};
