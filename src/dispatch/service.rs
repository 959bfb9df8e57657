//! Routes decoded requests to the predictor, the model store or the query engine.
//!
//! Nothing here returns an error: every failure is folded into an `Outcome`
//! so the poll loop always has something to publish.

use std::time::Instant;

use tracing::{info, warn};

use crate::common::config::AppCfg;
use crate::inference::domain::{EstimateRequest, WarmUp};
use crate::inference::service::Predictor;
use crate::ipc::layout::RESPONSE_MAX;
use crate::ipc::status::StatusCode;
use crate::models::domain::ModelStore;
use crate::models::registry::ModelRegistry;
use crate::models::repo_fs::FsModelStore;

use super::domain::{Outcome, Request, RequestHeader, Response};
use super::engine::{CommandEngine, NoEngine, QueryEngine};

pub struct OpcodeDispatcher {
    predictor: Predictor,
    engine: Box<dyn QueryEngine>,
}

impl OpcodeDispatcher {
    pub fn new(predictor: Predictor, engine: Box<dyn QueryEngine>) -> Self {
        Self { predictor, engine }
    }

    /// Filesystem models under `cfg.data_root` and the configured query command, if any.
    pub fn from_cfg(cfg: &AppCfg) -> Self {
        let registry = ModelRegistry::new(Box::new(FsModelStore::new(cfg)));
        let engine: Box<dyn QueryEngine> = match &cfg.query_cmd {
            Some(cmd) => Box::new(CommandEngine::new(cmd.clone())),
            None => Box::new(NoEngine),
        };
        Self::new(Predictor::new(registry, cfg.models.clone()), engine)
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn predictor_mut(&mut self) -> &mut Predictor {
        &mut self.predictor
    }

    pub fn warm_up(&mut self) -> WarmUp {
        self.predictor.warm_up()
    }

    /// Decode and serve one request. `payload` is the whole request region.
    pub fn dispatch(&mut self, header: &RequestHeader, payload: &[u8]) -> Outcome {
        let start = Instant::now();
        match Request::decode(header, payload) {
            Ok(request) => {
                let kind = request.kind();
                let outcome = self.handle(request);
                info!(
                    ev = "request_served",
                    kind,
                    statuses = outcome.statuses.len(),
                    dur_us = start.elapsed().as_micros() as u64,
                );
                outcome
            }
            Err(err) if header.is_legacy() => {
                warn!(
                    ev = "decode_failed",
                    mode = "legacy",
                    code = err.code() as u32,
                    error = %err,
                );
                Outcome::new(Response::Estimate(header.input_count as f64))
            }
            Err(err) => {
                warn!(
                    ev = "decode_failed",
                    mode = "generic",
                    code = err.code() as u32,
                    error = %err,
                );
                Outcome::failed(err.to_string())
            }
        }
    }

    pub fn handle(&mut self, request: Request) -> Outcome {
        match request {
            Request::Estimate(req) => self.estimate(&req),
            Request::FetchModel { model_id } => self.fetch_model(&model_id),
            Request::Execute { query } => self.execute(&query),
            Request::Unknown { opcode } => {
                // Unknown opcodes are answered silently; the requester sees only an empty body.
                // TODO: announce an ERROR status once requesters tolerate one for unknown opcodes.
                warn!(ev = "unknown_opcode", opcode);
                Outcome::new(Response::empty())
            }
        }
    }

    fn estimate(&mut self, req: &EstimateRequest) -> Outcome {
        let estimate = self.predictor.estimate(req);
        let outcome = Outcome::new(Response::Estimate(estimate.value));
        if estimate.entity_loaded {
            outcome.with_status(
                StatusCode::Info,
                format!("loaded histogram {}.{}", req.namespace, req.entity),
            )
        } else {
            outcome
        }
    }

    fn fetch_model(&mut self, model_id: &str) -> Outcome {
        match self.predictor.registry().store().model_bytes(model_id) {
            Ok(Some(bytes)) if bytes.len() > RESPONSE_MAX => Outcome::failed(format!(
                "model {model_id} is {} bytes, response region holds {RESPONSE_MAX}",
                bytes.len()
            )),
            Ok(Some(bytes)) => Outcome::new(Response::Payload(bytes)),
            Ok(None) => Outcome::failed(format!("model not found: {model_id}")),
            Err(err) => Outcome::failed(err.to_string()),
        }
    }

    fn execute(&mut self, query: &str) -> Outcome {
        match self.engine.execute(query) {
            Ok(text) if text.len() > RESPONSE_MAX => Outcome::failed(format!(
                "query result is {} bytes, response region holds {RESPONSE_MAX}",
                text.len()
            )),
            Ok(text) => Outcome::new(Response::Payload(text.into_bytes())),
            Err(err) => {
                let message = err.to_string();
                let mut body = message.clone().into_bytes();
                body.truncate(RESPONSE_MAX);
                Outcome::new(Response::Payload(body)).with_status(StatusCode::Error, message)
            }
        }
    }
}
