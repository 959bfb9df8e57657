//! Lazy, process-lifetime cache of deserialized models.
//!
//! Handles are created on the first successful lookup and never evicted; the
//! number of entities is bounded by the schema. Failed lookups are not
//! remembered, so a model uploaded later is picked up on the next request.
//!
//! The cache is a plain map owned by the poll loop. It is not thread-safe and
//! would need a lock or a concurrent map if lookups were ever parallelized.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::common::error::{CardError, CardResult};

use super::domain::{decode_model, Model, ModelKey, ModelStore};

pub struct ModelRegistry {
    store: Box<dyn ModelStore>,
    cache: HashMap<ModelKey, Arc<Model>>,
}

impl ModelRegistry {
    pub fn new(store: Box<dyn ModelStore>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    /// Backing store, for callers that need raw artefact bytes.
    pub fn store(&self) -> &dyn ModelStore {
        self.store.as_ref()
    }

    /// Cached handle for a global model, loading it on a miss.
    pub fn get_global(&mut self, id: &str) -> CardResult<Arc<Model>> {
        let key = ModelKey::Global(id.to_string());
        if let Some(model) = self.cache.get(&key) {
            return Ok(Arc::clone(model));
        }
        let bytes = self.store.model_bytes(id)?;
        self.insert(key, bytes)
    }

    /// Cached handle for an entity histogram model, loading it on a miss.
    pub fn get_entity_model(&mut self, namespace: &str, entity: &str) -> CardResult<Arc<Model>> {
        let key = ModelKey::entity(namespace, entity);
        if let Some(model) = self.cache.get(&key) {
            return Ok(Arc::clone(model));
        }
        let bytes = self.store.entity_model_bytes(namespace, entity)?;
        self.insert(key, bytes)
    }

    pub fn is_cached(&self, key: &ModelKey) -> bool {
        self.cache.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn insert(&mut self, key: ModelKey, bytes: Option<Vec<u8>>) -> CardResult<Arc<Model>> {
        let label = key.label();
        let bytes = bytes.ok_or_else(|| {
            debug!(ev = "model_missing", model = %label);
            CardError::ModelNotFound(label.clone())
        })?;

        let start = Instant::now();
        let model = Arc::new(decode_model(&label, &bytes)?);
        info!(
            ev = "model_loaded",
            model = %label,
            kind = model.kind(),
            len = bytes.len(),
            dur_us = start.elapsed().as_micros() as u64,
        );
        self.cache.insert(key, Arc::clone(&model));
        Ok(model)
    }
}
