//! Model artefacts, their stores, and the in-process registry.

pub mod domain;
pub mod registry;
pub mod repo_fs;
pub mod repo_mem;

pub use domain::{decode_model, encode_model, Model, ModelKey, ModelStore};
pub use registry::ModelRegistry;
pub use repo_fs::FsModelStore;
pub use repo_mem::MemoryModelStore;
