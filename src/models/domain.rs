//! Model artefacts, the store contract, and the forward passes run at inference time.
//!
//! Artefacts are JSON documents produced by the offline trainer:
//!
//! ```json
//! {"version": 1, "model": {"kind": "layer", "layers": [
//!     {"inputs": 4, "outputs": 4, "weights": [...], "bias": [...], "activation": "relu"}
//! ]}}
//! ```
//!
//! Every dense layer is shape-checked on load; a handle that exists is safe to run.

use serde::{Deserialize, Serialize};

use crate::common::error::{CardError, CardResult};
use crate::inference::features::FEATURE_DIM;

/// Artefact format revision this build reads and writes.
pub const ARTIFACT_VERSION: u32 = 1;

/// Key of a cached model handle.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ModelKey {
    Global(String),
    Entity { namespace: String, entity: String },
}

impl ModelKey {
    pub fn entity(namespace: impl Into<String>, entity: impl Into<String>) -> Self {
        ModelKey::Entity {
            namespace: namespace.into(),
            entity: entity.into(),
        }
    }

    /// Human readable label used in logs and status messages.
    pub fn label(&self) -> String {
        match self {
            ModelKey::Global(id) => id.clone(),
            ModelKey::Entity { namespace, entity } => format!("{namespace}.{entity}"),
        }
    }
}

/// Source of serialized model bytes. `Ok(None)` means "not stored".
pub trait ModelStore: Send {
    fn model_bytes(&self, id: &str) -> CardResult<Option<Vec<u8>>>;
    fn entity_model_bytes(&self, namespace: &str, entity: &str) -> CardResult<Option<Vec<u8>>>;
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Relu => x.max(0.0),
        }
    }
}

/// Fully connected layer, weights stored row-major as `outputs x inputs`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub activation: Activation,
}

impl Dense {
    pub fn new(
        inputs: usize,
        outputs: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
        activation: Activation,
    ) -> Result<Self, String> {
        let layer = Self {
            inputs,
            outputs,
            weights,
            bias,
            activation,
        };
        layer.check()?;
        Ok(layer)
    }

    fn check(&self) -> Result<(), String> {
        if self.inputs == 0 || self.outputs == 0 {
            return Err("dense layer with zero width".to_string());
        }
        if self.weights.len() != self.inputs * self.outputs {
            return Err(format!(
                "expected {} weights for {}x{}, found {}",
                self.inputs * self.outputs,
                self.outputs,
                self.inputs,
                self.weights.len()
            ));
        }
        if self.bias.len() != self.outputs {
            return Err(format!(
                "expected {} bias terms, found {}",
                self.outputs,
                self.bias.len()
            ));
        }
        Ok(())
    }

    /// # Panics
    /// In debug builds, if `x.len() != self.inputs`. Shapes are validated on load.
    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        debug_assert_eq!(x.len(), self.inputs);
        self.weights
            .chunks_exact(self.inputs)
            .zip(&self.bias)
            .map(|(row, b)| {
                let sum = row.iter().zip(x).fold(*b, |acc, (w, v)| acc + w * v);
                self.activation.apply(sum)
            })
            .collect()
    }
}

/// Stack of dense layers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    pub layers: Vec<Dense>,
}

impl Mlp {
    pub fn new(layers: Vec<Dense>) -> Result<Self, String> {
        let mlp = Self { layers };
        mlp.check()?;
        Ok(mlp)
    }

    fn check(&self) -> Result<(), String> {
        if self.layers.is_empty() {
            return Err("mlp without layers".to_string());
        }
        for (idx, layer) in self.layers.iter().enumerate() {
            layer.check().map_err(|e| format!("layer {idx}: {e}"))?;
        }
        for (idx, pair) in self.layers.windows(2).enumerate() {
            if pair[0].outputs != pair[1].inputs {
                return Err(format!(
                    "layer {idx} emits {} values but layer {} takes {}",
                    pair[0].outputs,
                    idx + 1,
                    pair[1].inputs
                ));
            }
        }
        Ok(())
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.inputs)
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, |l| l.outputs)
    }

    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        self.layers
            .iter()
            .fold(x.to_vec(), |acc, layer| layer.forward(&acc))
    }
}

/// Shared encoder: projects the pooled token features, the namespace and the
/// entity into one embedding space, appends the scaled input count and runs
/// the MLP over the result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseEncoder {
    pub token_proj: Dense,
    pub namespace_proj: Dense,
    pub entity_proj: Dense,
    pub mlp: Mlp,
}

impl BaseEncoder {
    fn check(&self) -> Result<(), String> {
        for (name, proj) in [
            ("token_proj", &self.token_proj),
            ("namespace_proj", &self.namespace_proj),
            ("entity_proj", &self.entity_proj),
        ] {
            proj.check().map_err(|e| format!("{name}: {e}"))?;
            if proj.inputs != FEATURE_DIM {
                return Err(format!(
                    "{name} takes {} features, tokens carry {FEATURE_DIM}",
                    proj.inputs
                ));
            }
            if proj.outputs != self.token_proj.outputs {
                return Err(format!(
                    "{name} emits {} values, token_proj emits {}",
                    proj.outputs, self.token_proj.outputs
                ));
            }
        }
        self.mlp.check().map_err(|e| format!("mlp: {e}"))?;
        if self.mlp.input_dim() != self.token_proj.outputs + 1 {
            return Err(format!(
                "mlp takes {} values, expected embedding width {} plus input count",
                self.mlp.input_dim(),
                self.token_proj.outputs
            ));
        }
        Ok(())
    }

    /// Width of the embedding handed to the histogram model.
    pub fn embedding_dim(&self) -> usize {
        self.mlp.output_dim()
    }

    /// `tokens` is the padded token matrix; `namespace` and `entity` are single feature rows.
    pub fn embed(
        &self,
        tokens: &[[f32; FEATURE_DIM]],
        namespace: &[f32; FEATURE_DIM],
        entity: &[f32; FEATURE_DIM],
        input_count: f64,
    ) -> Vec<f32> {
        let mut pooled = [0f32; FEATURE_DIM];
        if !tokens.is_empty() {
            for row in tokens {
                for (acc, v) in pooled.iter_mut().zip(row) {
                    *acc += v;
                }
            }
            let n = tokens.len() as f32;
            pooled.iter_mut().for_each(|v| *v /= n);
        }

        let tok = self.token_proj.forward(&pooled);
        let ns = self.namespace_proj.forward(namespace);
        let ent = self.entity_proj.forward(entity);
        let mut combined: Vec<f32> = tok
            .iter()
            .zip(&ns)
            .zip(&ent)
            .map(|((a, b), c)| a + b + c)
            .collect();
        combined.push(((input_count.max(0.0)).ln_1p() / 10.0) as f32);
        self.mlp.forward(&combined)
    }
}

/// A deserialized, validated model handle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    BaseEncoder(BaseEncoder),
    /// Width-preserving adjustment: per-entity histograms and the ordered layer.
    Layer(Mlp),
    /// Final projection to one log-scaled value.
    Head(Mlp),
}

impl Model {
    pub fn kind(&self) -> &'static str {
        match self {
            Model::BaseEncoder(_) => "base_encoder",
            Model::Layer(_) => "layer",
            Model::Head(_) => "head",
        }
    }

    fn check(&self) -> Result<(), String> {
        match self {
            Model::BaseEncoder(enc) => enc.check(),
            Model::Layer(mlp) => {
                mlp.check()?;
                if mlp.input_dim() != mlp.output_dim() {
                    return Err(format!(
                        "layer maps {} values to {}, must preserve width",
                        mlp.input_dim(),
                        mlp.output_dim()
                    ));
                }
                Ok(())
            }
            Model::Head(mlp) => {
                mlp.check()?;
                if mlp.output_dim() != 1 {
                    return Err(format!("head emits {} values, expected 1", mlp.output_dim()));
                }
                Ok(())
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    version: u32,
    model: Model,
}

/// Parse and validate artefact bytes. `id` only labels the error.
pub fn decode_model(id: &str, bytes: &[u8]) -> CardResult<Model> {
    if bytes.is_empty() {
        return Err(CardError::corrupt(id, "empty artefact"));
    }
    let artifact: ModelArtifact =
        serde_json::from_slice(bytes).map_err(|e| CardError::corrupt(id, e.to_string()))?;
    if artifact.version != ARTIFACT_VERSION {
        return Err(CardError::corrupt(
            id,
            format!("unsupported artefact version {}", artifact.version),
        ));
    }
    artifact
        .model
        .check()
        .map_err(|reason| CardError::corrupt(id, reason))?;
    Ok(artifact.model)
}

/// Serialize a model into artefact bytes.
pub fn encode_model(model: &Model) -> CardResult<Vec<u8>> {
    let artifact = ModelArtifact {
        version: ARTIFACT_VERSION,
        model: model.clone(),
    };
    serde_json::to_vec(&artifact).map_err(|e| CardError::corrupt(model.kind(), e.to_string()))
}
