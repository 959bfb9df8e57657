//! Inference domain: feature encoding and the cardinality predictor.

pub mod domain;
pub mod features;
pub mod service;
#[cfg(test)]
pub(crate) mod testing;

pub use domain::{Estimate, EstimateRequest, EstimateSource, WarmUp};
pub use service::Predictor;
