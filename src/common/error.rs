//! Error handling primitives shared across the core.
//!
//! Every failure carries a stable numeric code so log consumers can group
//! events without parsing messages.

use std::io;

use thiserror::Error;

/// Stable error codes emitted in structured log events.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Shared-memory region missing, unwritable or too small.
    Transport = 1,
    /// Request bytes could not be decoded.
    Decode = 2,
    /// Requested model artefact was not available.
    ModelNotFound = 3,
    /// Model bytes were present but undecodable.
    ModelCorrupt = 4,
    /// Forwarded query failed inside the query engine.
    Engine = 5,
    /// Peer did not answer in time.
    Timeout = 6,
    /// Filesystem or process IO failure.
    Io = 7,
    /// Invalid configuration value.
    Config = 8,
}

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("model corrupt: {id}: {reason}")]
    ModelCorrupt { id: String, reason: String },

    #[error("engine: {0}")]
    Engine(String),

    #[error("timeout waiting for {0}")]
    Timeout(&'static str),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("config: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type CardResult<T> = Result<T, CardError>;

impl CardError {
    /// Machine parsable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CardError::Transport(_) => ErrorCode::Transport,
            CardError::Decode(_) => ErrorCode::Decode,
            CardError::ModelNotFound(_) => ErrorCode::ModelNotFound,
            CardError::ModelCorrupt { .. } => ErrorCode::ModelCorrupt,
            CardError::Engine(_) => ErrorCode::Engine,
            CardError::Timeout(_) => ErrorCode::Timeout,
            CardError::Io(_) => ErrorCode::Io,
            CardError::Config(_) => ErrorCode::Config,
        }
    }

    /// Transport helper.
    pub fn transport(msg: impl Into<String>) -> Self {
        CardError::Transport(msg.into())
    }

    /// Decode helper.
    pub fn decode(msg: impl Into<String>) -> Self {
        CardError::Decode(msg.into())
    }

    /// Corrupt model helper.
    pub fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        CardError::ModelCorrupt {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that mean "no usable model", as opposed to broken plumbing.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(
            self,
            CardError::ModelNotFound(_) | CardError::ModelCorrupt { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok as u32, 0);
        assert_eq!(ErrorCode::Transport as u32, 1);
        assert_eq!(ErrorCode::Decode as u32, 2);
        assert_eq!(ErrorCode::ModelNotFound as u32, 3);
        assert_eq!(ErrorCode::ModelCorrupt as u32, 4);
        assert_eq!(ErrorCode::Engine as u32, 5);
        assert_eq!(ErrorCode::Timeout as u32, 6);
        assert_eq!(ErrorCode::Io as u32, 7);
        assert_eq!(ErrorCode::Config as u32, 8);
    }

    #[test]
    fn variants_map_to_codes() {
        assert_eq!(CardError::transport("x").code(), ErrorCode::Transport);
        assert_eq!(CardError::corrupt("m", "bad").code(), ErrorCode::ModelCorrupt);
        let io = CardError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(io.code(), ErrorCode::Io);
    }

    #[test]
    fn unavailable_covers_missing_and_corrupt() {
        assert!(CardError::ModelNotFound("a".into()).is_model_unavailable());
        assert!(CardError::corrupt("a", "b").is_model_unavailable());
        assert!(!CardError::Engine("e".into()).is_model_unavailable());
    }

    #[test]
    fn messages_carry_context() {
        let err = CardError::corrupt("base_encoder_v1", "shape mismatch");
        assert_eq!(
            err.to_string(),
            "model corrupt: base_encoder_v1: shape mismatch"
        );
    }
}
