//! In-memory model store for tests and embedders that fetch blobs themselves.

use std::collections::HashMap;

use crate::common::error::CardResult;

use super::domain::ModelStore;

#[derive(Default, Debug, Clone)]
pub struct MemoryModelStore {
    globals: HashMap<String, Vec<u8>>,
    entities: HashMap<(String, String), Vec<u8>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert_model(id, bytes);
        self
    }

    pub fn with_entity_model(
        mut self,
        namespace: impl Into<String>,
        entity: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.entities
            .insert((namespace.into(), entity.into()), bytes.into());
        self
    }

    pub fn insert_model(&mut self, id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.globals.insert(id.into(), bytes.into());
    }
}

impl ModelStore for MemoryModelStore {
    fn model_bytes(&self, id: &str) -> CardResult<Option<Vec<u8>>> {
        Ok(self.globals.get(id).cloned())
    }

    fn entity_model_bytes(&self, namespace: &str, entity: &str) -> CardResult<Option<Vec<u8>>> {
        Ok(self
            .entities
            .get(&(namespace.to_string(), entity.to_string()))
            .cloned())
    }
}
