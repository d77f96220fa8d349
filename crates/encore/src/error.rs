//! Error taxonomy for the capture engine.
//!
//! Only conditions the caller can act on get a variant. Recoverable faults
//! (normalization, persistence, remote sync) degrade in place and are logged
//! instead of surfaced.

use thiserror::Error;

use crate::model::RecordKind;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Only one performance capture may run at a time.
    #[error("a performance capture is already in progress")]
    AlreadyRecording,

    /// The mixing engine has no live audio graph to tap.
    #[error("no live audio graph to capture from")]
    MissingAudioContext,

    /// The tap could not start streaming.
    #[error("audio capture unavailable: {reason}")]
    CaptureUnavailable { reason: String },

    /// Lookup by id came up empty.
    #[error("no {kind} record with id {id}")]
    NotFound { kind: RecordKind, id: String },

    /// A record could not be serialized for export.
    #[error("failed to serialize {id} for export")]
    ExportFailed {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}
