//! Tokenizer and per-token feature encoding for filter and order expressions.
//!
//! Each token becomes a fixed row of `FEATURE_DIM` floats:
//!
//! | columns | meaning |
//! |---|---|
//! | 0..16  | lexical fingerprint (character codes folded into 16 buckets) |
//! | 16, 17 | integer literal value and `ln(1 + |value|)`, zero otherwise |
//! | 18     | parenthesis depth at this token, divided by 16 |
//! | 19..36 | one-hot flag over `OP_TOKENS` (case-insensitive) |
//!
//! The layout must match what the trainer produced, so none of these
//! constants can change without retraining every model.

use std::sync::OnceLock;

use regex::Regex;

pub const HASH_DIM: usize = 16;

/// Operator and keyword vocabulary, in flag-column order.
pub const OP_TOKENS: [&str; 17] = [
    "(", ")", "and", "or", "not", ">", "<", ">=", "<=", "=", "!=", "<>", "equal?", "equal??",
    "?", "true", "false",
];

pub const FEATURE_DIM: usize = HASH_DIM + 2 + 1 + OP_TOKENS.len();

/// Token rows fed to the base encoder after padding or truncation.
pub const MAX_TOKENS: usize = 512;

const NUM_COL: usize = HASH_DIM;
const LOG_NUM_COL: usize = HASH_DIM + 1;
const DEPTH_COL: usize = HASH_DIM + 2;
const FLAG_COL: usize = HASH_DIM + 3;
const DEPTH_SCALE: f32 = 16.0;

pub type FeatureRow = [f32; FEATURE_DIM];

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\(|\)|\?|>=|<=|<>|!=|=|>|<|(?-u:\w)+|\||"(?:[^"\\]|\\.)*""#)
            .expect("token grammar is a valid regex")
    })
}

/// Filter tokens followed by the `|`-separated order keys.
pub fn tokenize<'a>(filter: &'a str, order: &'a str) -> Vec<&'a str> {
    let mut tokens: Vec<&str> = token_re().find_iter(filter).map(|m| m.as_str()).collect();
    if !order.is_empty() {
        tokens.extend(order.split('|'));
    }
    tokens
}

/// 16-bucket fingerprint: character code `& 0xFF` / 128 summed per bucket,
/// then scaled down for tokens longer than 16 characters.
pub fn lexical_hash(token: &str) -> [f32; HASH_DIM] {
    let mut v = [0f32; HASH_DIM];
    let mut len = 0usize;
    for (i, c) in token.chars().enumerate() {
        v[i % HASH_DIM] += ((c as u32) & 0xFF) as f32 / 128.0;
        len += 1;
    }
    let norm = (len as f32 / HASH_DIM as f32).max(1.0);
    v.iter_mut().for_each(|x| *x /= norm);
    v
}

/// Value of an optionally negative run of ASCII digits.
fn integer_value(token: &str) -> Option<f64> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<f64>().ok()
}

fn op_index(token: &str) -> Option<usize> {
    let lower = token.to_ascii_lowercase();
    OP_TOKENS.iter().position(|op| *op == lower)
}

fn encode_token(token: &str, depth: usize) -> FeatureRow {
    let mut row = [0f32; FEATURE_DIM];
    row[..HASH_DIM].copy_from_slice(&lexical_hash(token));
    if let Some(value) = integer_value(token) {
        row[NUM_COL] = value.clamp(f32::MIN as f64, f32::MAX as f64) as f32;
        row[LOG_NUM_COL] = value.abs().ln_1p() as f32;
    }
    row[DEPTH_COL] = depth as f32 / DEPTH_SCALE;
    if let Some(idx) = op_index(token) {
        row[FLAG_COL + idx] = 1.0;
    }
    row
}

/// One row per token; a single zero row when there are no tokens.
/// Depth is the nesting level before the token itself opens or closes a group.
pub fn token_features(tokens: &[&str]) -> Vec<FeatureRow> {
    if tokens.is_empty() {
        return vec![[0f32; FEATURE_DIM]];
    }
    let mut depth = 0usize;
    tokens
        .iter()
        .map(|token| {
            let row = encode_token(token, depth);
            match *token {
                "(" => depth += 1,
                ")" => depth = depth.saturating_sub(1),
                _ => {}
            }
            row
        })
        .collect()
}

/// Token rows padded with zeros or truncated to exactly `MAX_TOKENS`.
pub fn padded_features(tokens: &[&str]) -> Vec<FeatureRow> {
    let limit = tokens.len().min(MAX_TOKENS);
    let mut rows = token_features(&tokens[..limit]);
    rows.resize(MAX_TOKENS, [0f32; FEATURE_DIM]);
    rows
}

/// Namespace and entity names are encoded as one-token sequences.
pub fn name_features(name: &str) -> FeatureRow {
    encode_token(name, 0)
}
