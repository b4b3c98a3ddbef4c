// Error taxonomy shared by the lifecycle manager, the generation service and the routes

use hyper::StatusCode;
use thiserror::Error;

/// Failures surfaced to HTTP callers. Each variant maps to exactly one status code.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Malformed or missing request fields. Never reaches the core.
    #[error("{0}")]
    Validation(String),

    /// `generate` was called while the model slot is empty.
    #[error("No model loaded. Call /load first.")]
    NoModelLoaded,

    #[error("Failed to load model '{path}': {cause}")]
    LoadFailed { path: String, cause: String },

    #[error("Generation failed: {0}")]
    GenerationFailed(String),
}

impl SidecarError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SidecarError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SidecarError::NoModelLoaded => StatusCode::BAD_REQUEST,
            SidecarError::LoadFailed { .. } | SidecarError::GenerationFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Secondary release problems during unload. Logged and reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReclaimWarning {
    /// Generations that started before the unload still hold the old model.
    /// Its memory is released when the last of them finishes.
    #[error("model still referenced by {holders} in-flight generation(s); memory is released when they finish")]
    InFlight { holders: usize },

    #[error("failed to clear accelerator cache: {0}")]
    AcceleratorCache(String),
}
