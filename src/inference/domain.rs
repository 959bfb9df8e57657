//! Domain definitions for estimate requests and their outcomes.

use crate::common::config::GlobalModelIds;

/// A scan whose output cardinality should be estimated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EstimateRequest {
    pub namespace: String,
    pub entity: String,
    pub filter: String,
    /// `|`-separated order keys; empty for unordered scans.
    pub order: String,
    pub input_count: u64,
}

impl EstimateRequest {
    pub fn new(
        namespace: impl Into<String>,
        entity: impl Into<String>,
        filter: impl Into<String>,
        order: impl Into<String>,
        input_count: u64,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            entity: entity.into(),
            filter: filter.into(),
            order: order.into(),
            input_count,
        }
    }

    pub fn is_ordered(&self) -> bool {
        !self.order.is_empty()
    }

    /// Value returned when no prediction can be made.
    pub fn passthrough(&self) -> f64 {
        self.input_count as f64
    }
}

/// Where an estimate came from.
#[derive(Clone, Debug, PartialEq)]
pub enum EstimateSource {
    Model,
    /// The input count was returned unchanged.
    Passthrough { reason: String },
}

/// Result of `Predictor::estimate`. Always carries a usable value.
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub source: EstimateSource,
    /// The entity histogram was loaded from the store while serving this request.
    pub entity_loaded: bool,
}

impl Estimate {
    pub fn is_passthrough(&self) -> bool {
        matches!(self.source, EstimateSource::Passthrough { .. })
    }
}

/// Outcome of loading the global models at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WarmUp {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl WarmUp {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line summary for the startup INFO status.
    ///
    /// Losing only the ordered layer leaves unordered scans predicted, so the
    /// wording names which scans fall back.
    pub fn summary(&self, ids: &GlobalModelIds) -> String {
        if self.is_complete() {
            return format!("core models loaded: {}", self.loaded.join(", "));
        }
        let failed: Vec<String> = self
            .failed
            .iter()
            .map(|(id, reason)| format!("{id} ({reason})"))
            .collect();
        let only_ordered = self.failed.iter().all(|(id, _)| *id == ids.ordered_layer);
        if only_ordered {
            format!(
                "core models loaded: {}; missing: {}; ordered scans pass through",
                self.loaded.join(", "),
                failed.join(", ")
            )
        } else {
            format!(
                "core models missing: {}; passthrough mode",
                failed.join(", ")
            )
        }
    }
}
