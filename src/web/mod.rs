// Sidecar modules: HTTP boundary, model lifecycle and the generation pipeline

pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod logger;
pub mod model_manager;
pub mod model_source;
pub mod models;
pub mod request_parsing;
pub mod response_helpers;
pub mod routes;
pub mod server;
pub mod system;

#[cfg(feature = "llama")]
pub mod gguf_utils;
#[cfg(feature = "llama")]
pub mod llama_backend;

#[cfg(test)]
pub(crate) mod mock_backend;

pub use backend::{LoadedModel, ModelHandle, ModelLoader, NoBackendLoader, Tokenizer};
pub use config::{BackendOptions, GenerationDefaults, SidecarConfig};
pub use error::{ReclaimWarning, SidecarError};
pub use model_manager::{ModelLifecycleManager, UnloadOutcome, UnloadStatus};
pub use server::{handle_request, serve, AppState};
