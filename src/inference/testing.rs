//! Small deterministic models shared by unit tests.

use crate::models::domain::{encode_model, Activation, BaseEncoder, Dense, Mlp, Model};
use crate::models::repo_mem::MemoryModelStore;

use super::features::FEATURE_DIM;

pub const TOY_EMBED: usize = 4;

fn dense(inputs: usize, outputs: usize, seed: usize, bias: f32) -> Dense {
    let weights = (0..inputs * outputs)
        .map(|i| (((i * 7 + seed) % 11) as f32 - 5.0) / 20.0)
        .collect();
    Dense::new(inputs, outputs, weights, vec![bias; outputs], Activation::Identity)
        .expect("toy dense layer")
}

fn bytes(model: Model) -> Vec<u8> {
    encode_model(&model).expect("encode toy model")
}

pub fn toy_encoder() -> Model {
    Model::BaseEncoder(BaseEncoder {
        token_proj: dense(FEATURE_DIM, TOY_EMBED, 1, 0.0),
        namespace_proj: dense(FEATURE_DIM, TOY_EMBED, 2, 0.0),
        entity_proj: dense(FEATURE_DIM, TOY_EMBED, 3, 0.0),
        mlp: Mlp::new(vec![dense(TOY_EMBED + 1, TOY_EMBED, 4, 0.1)]).expect("toy mlp"),
    })
}

pub fn toy_layer(seed: usize) -> Model {
    Model::Layer(Mlp::new(vec![dense(TOY_EMBED, TOY_EMBED, seed, 0.05)]).expect("toy layer"))
}

pub fn toy_head() -> Model {
    Model::Head(Mlp::new(vec![dense(TOY_EMBED, 1, 9, 1.0)]).expect("toy head"))
}

/// Store holding the three default global models and a `shop.orders` histogram.
pub fn toy_store() -> MemoryModelStore {
    MemoryModelStore::new()
        .with_model("base_encoder_v1", bytes(toy_encoder()))
        .with_model("ordered_layer_v1", bytes(toy_layer(6)))
        .with_model("output_head_v1", bytes(toy_head()))
        .with_entity_model("shop", "orders", bytes(toy_layer(5)))
}
