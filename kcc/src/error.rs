//! Error types.
//!
//! Usage errors are returned to the caller; processor faults are caught by the
//! pipeline and logged; codec errors reject a malformed word buffer.

use thiserror::Error;

use crate::pipeline::Stage;

/// Programmer errors raised by the agent API.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KccError {
    #[error("stage introspection or suppression requires an active stage")]
    NoActiveStage,
    #[error("features can only be suppressed during SetInputProperties (active: {0:?})")]
    FeatureSuppressionOutsideInput(Option<Stage>),
    #[error("manual update is not enabled for this agent")]
    ManualUpdateDisabled,
    #[error("agent is not initialized")]
    NotInitialized,
}

/// A fault raised from inside a processor callback.
///
/// The pipeline never propagates this; it is logged and the next processor runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessorError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Kcc(#[from] KccError),
}

impl ProcessorError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Failures while reading a network word buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("word buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("settings layout version mismatch: expected {expected}, found {found}")]
    LayoutVersion { expected: u8, found: u8 },
}
