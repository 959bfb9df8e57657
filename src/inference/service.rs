//! Prediction pipeline with passthrough fallback.
//!
//! `estimate` never fails: when a model is missing, corrupt, mis-shaped or
//! produces a non-finite value, the caller gets the input count back.
//!
//! A global model that could not be loaded is not looked up again until
//! `GLOBAL_RETRY_AFTER` has passed; entity models are retried on every miss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::common::config::GlobalModelIds;
use crate::common::error::{CardError, CardResult};
use crate::models::domain::{BaseEncoder, Mlp, Model, ModelKey};
use crate::models::registry::ModelRegistry;

use super::domain::{Estimate, EstimateRequest, EstimateSource, WarmUp};
use super::features::{name_features, padded_features, tokenize};

/// Quiet period after a failed global model lookup.
pub const GLOBAL_RETRY_AFTER: Duration = Duration::from_secs(30);

pub struct Predictor {
    registry: ModelRegistry,
    ids: GlobalModelIds,
    failures: FailureMemory,
}

impl Predictor {
    pub fn new(registry: ModelRegistry, ids: GlobalModelIds) -> Self {
        Self {
            registry,
            ids,
            failures: FailureMemory::new(GLOBAL_RETRY_AFTER),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.failures = FailureMemory::new(retry_after);
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn model_ids(&self) -> &GlobalModelIds {
        &self.ids
    }

    /// Try to load the three global models. Failures are reported, never raised.
    pub fn warm_up(&mut self) -> WarmUp {
        let mut outcome = WarmUp::default();
        let ids = self.ids.clone();
        for id in ids.all() {
            match self.failures.global(&mut self.registry, id) {
                Ok(_) => outcome.loaded.push(id.to_string()),
                Err(err) => {
                    warn!(
                        ev = "warm_up_failed",
                        model = id,
                        code = err.code() as u32,
                        error = %err,
                    );
                    outcome.failed.push((id.to_string(), err.to_string()));
                }
            }
        }
        outcome
    }

    /// Estimated output rows for `req`, or `req.input_count` when inference is unavailable.
    pub fn estimate(&mut self, req: &EstimateRequest) -> Estimate {
        let start = Instant::now();
        let key = ModelKey::entity(&req.namespace, &req.entity);
        let was_cached = self.registry.is_cached(&key);

        let result = self.predict(req);
        let entity_loaded = !was_cached && self.registry.is_cached(&key);

        match result {
            Ok(value) => {
                debug!(
                    ev = "estimate",
                    entity = %key.label(),
                    input = req.input_count,
                    output = value,
                    dur_us = start.elapsed().as_micros() as u64,
                );
                Estimate {
                    value,
                    source: EstimateSource::Model,
                    entity_loaded,
                }
            }
            Err(err) => {
                debug!(
                    ev = "estimate_passthrough",
                    entity = %key.label(),
                    code = err.code() as u32,
                    error = %err,
                );
                Estimate {
                    value: req.passthrough(),
                    source: EstimateSource::Passthrough {
                        reason: err.to_string(),
                    },
                    entity_loaded,
                }
            }
        }
    }

    fn predict(&mut self, req: &EstimateRequest) -> CardResult<f64> {
        let hist = self
            .registry
            .get_entity_model(&req.namespace, &req.entity)?;
        let base = self.failures.global(&mut self.registry, &self.ids.base_encoder)?;
        let head = self.failures.global(&mut self.registry, &self.ids.output_head)?;
        let ordered = if req.is_ordered() {
            Some(self.failures.global(&mut self.registry, &self.ids.ordered_layer)?)
        } else {
            None
        };

        let label = format!("{}.{}", req.namespace, req.entity);
        let encoder = as_encoder(&base, &self.ids.base_encoder)?;
        let hist = as_layer(&hist, &label)?;
        let head = as_head(&head, &self.ids.output_head)?;
        let ordered = match &ordered {
            Some(model) => Some(as_layer(model, &self.ids.ordered_layer)?),
            None => None,
        };

        let width = encoder.embedding_dim();
        check_width(&label, hist.input_dim(), width)?;
        if let Some(layer) = ordered {
            check_width(&self.ids.ordered_layer, layer.input_dim(), width)?;
        }
        check_width(&self.ids.output_head, head.input_dim(), width)?;

        let tokens = tokenize(&req.filter, &req.order);
        let rows = padded_features(&tokens);
        let namespace = name_features(&req.namespace);
        let entity = name_features(&req.entity);

        let embedding = encoder.embed(&rows, &namespace, &entity, req.input_count as f64);
        let mut x = hist.forward(&embedding);
        if let Some(layer) = ordered {
            x = layer.forward(&x);
        }
        let log_pred = head.forward(&x).first().copied().unwrap_or(f32::NAN) as f64;

        let value = log_pred.exp_m1();
        if !value.is_finite() {
            return Err(CardError::corrupt(
                &self.ids.output_head,
                format!("non-finite prediction {value}"),
            ));
        }
        Ok(value.max(0.0))
    }
}

/// Global ids whose last lookup found no usable model, with when it happened.
struct FailureMemory {
    failed: HashMap<String, (Instant, CardError)>,
    retry_after: Duration,
}

impl FailureMemory {
    fn new(retry_after: Duration) -> Self {
        Self {
            failed: HashMap::new(),
            retry_after,
        }
    }

    /// Global model lookup that answers recent failures from memory.
    /// IO errors are passed through and not remembered.
    fn global(&mut self, registry: &mut ModelRegistry, id: &str) -> CardResult<Arc<Model>> {
        if let Some((since, err)) = self.failed.get(id) {
            if since.elapsed() < self.retry_after {
                return Err(recall(id, err));
            }
        }
        match registry.get_global(id) {
            Ok(model) => {
                self.failed.remove(id);
                Ok(model)
            }
            Err(err) if err.is_model_unavailable() => {
                debug!(ev = "global_unavailable", model = id, code = err.code() as u32);
                let recalled = recall(id, &err);
                self.failed.insert(id.to_string(), (Instant::now(), err));
                Err(recalled)
            }
            Err(err) => Err(err),
        }
    }
}

/// Fresh copy of a remembered model failure.
fn recall(id: &str, err: &CardError) -> CardError {
    match err {
        CardError::ModelCorrupt { id: model, reason } => {
            CardError::corrupt(model.as_str(), reason.as_str())
        }
        _ => CardError::ModelNotFound(id.to_string()),
    }
}

fn as_encoder<'a>(model: &'a Arc<Model>, id: &str) -> CardResult<&'a BaseEncoder> {
    match model.as_ref() {
        Model::BaseEncoder(enc) => Ok(enc),
        other => Err(wrong_kind(id, "base_encoder", other)),
    }
}

fn as_layer<'a>(model: &'a Arc<Model>, id: &str) -> CardResult<&'a Mlp> {
    match model.as_ref() {
        Model::Layer(mlp) => Ok(mlp),
        other => Err(wrong_kind(id, "layer", other)),
    }
}

fn as_head<'a>(model: &'a Arc<Model>, id: &str) -> CardResult<&'a Mlp> {
    match model.as_ref() {
        Model::Head(mlp) => Ok(mlp),
        other => Err(wrong_kind(id, "head", other)),
    }
}

fn wrong_kind(id: &str, expected: &str, found: &Model) -> CardError {
    CardError::corrupt(id, format!("expected {expected}, found {}", found.kind()))
}

fn check_width(id: &str, takes: usize, width: usize) -> CardResult<()> {
    if takes == width {
        Ok(())
    } else {
        Err(CardError::corrupt(
            id,
            format!("takes {takes} values, embedding is {width} wide"),
        ))
    }
}
