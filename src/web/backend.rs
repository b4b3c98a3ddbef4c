// Seam between the lifecycle/generation core and the numeric runtime

use super::chat::{ChatConvention, SamplingPipeline};
use super::model_source::ModelSource;

/// Loaded weights, able to decode a continuation of a prompt.
///
/// Calls block; they are always made from a blocking worker thread.
pub trait ModelHandle: Send + Sync {
    /// Decode at most `max_tokens` tokens after `prompt`, stopping early at an
    /// end-of-generation token or a trailing `stop_markers` entry. Returns the
    /// raw text with the stop marker removed.
    fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        pipeline: &SamplingPipeline,
        stop_markers: &[String],
    ) -> Result<String, String>;
}

/// Vocabulary and chat convention matching a [`ModelHandle`].
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<i32>, String>;

    fn convention(&self) -> &ChatConvention;

    fn count_tokens(&self, text: &str) -> Result<usize, String> {
        self.encode(text).map(|tokens| tokens.len())
    }
}

/// A handle and its tokenizer, produced together by one load.
pub struct LoadedModel {
    pub handle: Box<dyn ModelHandle>,
    pub tokenizer: Box<dyn Tokenizer>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("convention", self.tokenizer.convention())
            .finish_non_exhaustive()
    }
}

/// Instantiates models and reclaims what they leave behind.
pub trait ModelLoader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Acquire weights and tokenizer for a resolved source. Blocking.
    fn load(&self, source: &ModelSource) -> Result<LoadedModel, String>;

    /// Release runtime-side caches after the last model reference is gone.
    fn reclaim(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Loader used when the binary was built without an inference backend.
#[derive(Debug, Default)]
pub struct NoBackendLoader;

impl ModelLoader for NoBackendLoader {
    fn name(&self) -> &'static str {
        "none"
    }

    fn load(&self, _source: &ModelSource) -> Result<LoadedModel, String> {
        Err("no inference backend compiled in (rebuild with --features llama)".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_no_backend_loader_always_fails() {
        let loader = NoBackendLoader;
        let source = ModelSource::LocalFile(PathBuf::from("/models/qwen.gguf"));
        let err = loader.load(&source).unwrap_err();
        assert!(err.contains("no inference backend"));
        assert!(loader.reclaim().is_ok());
    }
}
