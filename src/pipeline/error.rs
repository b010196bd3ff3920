//! Pipeline error types.

use thiserror::Error;

use crate::model::ModelError;
use crate::storage::StorageError;

/// Errors raised while building or driving a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid construction parameters.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Signal model could not be constructed.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Store setup failed (connect, schema, sensor registry).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// `start()` called while a run is active.
    #[error("pipeline '{0}' is already running")]
    AlreadyRunning(String),

    /// A producer or consumer task panicked or was aborted.
    #[error("task join failure: {0}")]
    Join(String),
}
