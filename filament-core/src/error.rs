//! Error types for the fallible parts of the engine.
//!
//! Propagation itself never fails: a panic inside user code either unwinds
//! to the writer or is isolated by a batched flush. The errors here cover
//! snapshot encoding and restoring, and configuration parsing.

use thiserror::Error;

/// Errors produced by snapshot and configuration handling.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A serializable signal's current value could not be converted.
    #[error("failed to serialize signal {id}: {source}")]
    Serialize {
        id: u64,
        #[source]
        source: serde_json::Error,
    },

    /// A snapshot value did not match the type of the signal it targets.
    #[error("failed to restore signal {id}: {source}")]
    Restore {
        id: u64,
        #[source]
        source: serde_json::Error,
    },

    /// Malformed JSON input (snapshot text or configuration).
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A snapshot could not be encoded as MessagePack.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack input could not be decoded into a snapshot.
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
