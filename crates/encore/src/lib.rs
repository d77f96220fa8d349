//! Encore - performance recording and session capture engine
//!
//! Captures live mixing sessions: audio from the active graph's master
//! output, plus a time-correlated log of every desk action, sealed into
//! immutable records that can be listed, exported, and synced.

pub mod capture;
pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod graph;
pub mod library;
pub mod model;
pub mod sync;

pub use config::EncoreConfig;
pub use engine::{CaptureEngine, CaptureState};
pub use error::EngineError;
pub use model::{CaptureRecord, EventKind, RecordKind, RecordingEvent};
