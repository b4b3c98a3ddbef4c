use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::spawn_blocking;
use uuid::Uuid;

use super::super::config::GenerationDefaults;
use super::super::error::SidecarError;
use super::super::model_manager::{join_error_cause, ModelLifecycleManager, ModelSlot};
use super::super::models::{GenerationRequest, GenerationResult, TokenBudget};
use super::super::system::total_ram_gb;
use super::formatter::format_prompt;
use super::jinja_templates::ChatMessage;
use super::sampler::SamplingPipeline;
use super::sanitizer::clean;
use super::stop_conditions::default_stop_markers;

const MIN_AUTO_TOKENS: usize = 64;

/// Upper bound of the automatic budget for a machine's memory, using the
/// same tiers the host applies when recommending a model size.
fn budget_cap(ram_gb: Option<u64>) -> usize {
    match ram_gb {
        Some(gb) if gb > 16 => 1024,
        Some(gb) if gb > 8 => 512,
        _ => 256,
    }
}

/// Token budget for a request that asked the sidecar to choose: one and a half
/// times the prompt plus headroom, clamped to the memory tier.
pub fn resolve_token_budget(prompt_tokens: usize, ram_gb: Option<u64>) -> usize {
    let wanted = prompt_tokens.saturating_mul(3) / 2 + MIN_AUTO_TOKENS;
    wanted.clamp(MIN_AUTO_TOKENS, budget_cap(ram_gb))
}

/// Runs one prompt through formatting, decoding and sanitizing against the
/// resident model.
#[derive(Debug)]
pub struct GenerationService {
    manager: Arc<ModelLifecycleManager>,
    defaults: GenerationDefaults,
    stop_markers: Vec<String>,
}

impl GenerationService {
    pub fn new(manager: Arc<ModelLifecycleManager>, defaults: GenerationDefaults) -> Self {
        Self {
            manager,
            defaults,
            stop_markers: default_stop_markers(),
        }
    }

    pub fn defaults(&self) -> &GenerationDefaults {
        &self.defaults
    }

    /// Generate a sanitized answer.
    ///
    /// Fails with `NoModelLoaded` before doing any work when the slot is empty.
    /// The model is snapshotted at the start, so an unload or reload during
    /// decoding does not affect this call.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, SidecarError> {
        let slot = self.manager.acquire().ok_or(SidecarError::NoModelLoaded)?;

        let request_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        info!(
            "[{request_id}] Generating with {} (max_tokens={:?}, temperature={})",
            slot.source_path, request.max_tokens, request.sampling.temperature
        );

        let pipeline = SamplingPipeline::build(&request.sampling, &self.defaults);
        let stop_markers = self.stop_markers.clone();
        let started = Instant::now();

        let id = request_id.clone();
        let result = spawn_blocking(move || {
            run_generation(&slot, &request, &pipeline, &stop_markers, &id)
        })
        .await
        .map_err(|e| SidecarError::GenerationFailed(join_error_cause(e)))
        .and_then(|result| result);

        match &result {
            Ok(output) => info!(
                "[{request_id}] Done in {:.2?}: {} tokens",
                started.elapsed(),
                output.token_count
            ),
            Err(e) => warn!("[{request_id}] {e}"),
        }
        result
    }
}

fn run_generation(
    slot: &ModelSlot,
    request: &GenerationRequest,
    pipeline: &SamplingPipeline,
    stop_markers: &[String],
    request_id: &str,
) -> Result<GenerationResult, SidecarError> {
    let messages = [ChatMessage::user(request.prompt.as_str())];
    let prompt = format_prompt(&messages, slot.tokenizer.convention());
    debug!(
        "[{request_id}] Prompt (thinking {:?}):\n{}",
        prompt.thinking, prompt.text
    );

    let max_tokens = match request.max_tokens {
        TokenBudget::Fixed(n) => n,
        TokenBudget::Auto => {
            let prompt_tokens = slot
                .tokenizer
                .count_tokens(&request.prompt)
                .map_err(|e| SidecarError::GenerationFailed(format!("Tokenization failed: {e}")))?;
            let ram_gb = request.system_ram_gb.or_else(total_ram_gb);
            let budget = resolve_token_budget(prompt_tokens, ram_gb);
            debug!(
                "[{request_id}] Auto budget: {budget} tokens (prompt={prompt_tokens}, ram={ram_gb:?} GB)"
            );
            budget
        }
    };

    let raw = slot
        .handle
        .generate(&prompt.text, max_tokens, pipeline, stop_markers)
        .map_err(SidecarError::GenerationFailed)?;
    debug!("[{request_id}] Raw output:\n{raw}");

    let text = clean(Some(&raw));
    debug!("[{request_id}] Cleaned output:\n{text}");

    let token_count = if text.is_empty() {
        0
    } else {
        slot.tokenizer
            .count_tokens(&text)
            .map_err(|e| SidecarError::GenerationFailed(format!("Tokenization failed: {e}")))?
    };

    Ok(GenerationResult { text, token_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::mock_backend::{Gate, MockLoader};
    use crate::web::models::SamplingParams;
    use std::time::Duration;

    fn request(prompt: &str, max_tokens: TokenBudget, ram: Option<u64>) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            max_tokens,
            sampling: SamplingParams {
                temperature: 0.7,
                top_p: None,
                min_p: None,
            },
            system_ram_gb: ram,
        }
    }

    async fn loaded_service(loader: MockLoader) -> (GenerationService, Arc<ModelLifecycleManager>) {
        let manager = Arc::new(ModelLifecycleManager::new(Arc::new(loader)));
        manager.load("test/qwen3-0.6b").await.unwrap();
        let service = GenerationService::new(manager.clone(), GenerationDefaults::default());
        (service, manager)
    }

    #[test]
    fn test_budget_scales_with_prompt() {
        assert_eq!(resolve_token_budget(0, Some(32)), 64);
        assert_eq!(resolve_token_budget(100, Some(32)), 214);
        assert_eq!(resolve_token_budget(10_000, Some(32)), 1024);
    }

    #[test]
    fn test_budget_respects_ram_tiers() {
        assert_eq!(resolve_token_budget(1_000, Some(17)), 1024);
        assert_eq!(resolve_token_budget(1_000, Some(16)), 512);
        assert_eq!(resolve_token_budget(1_000, Some(9)), 512);
        assert_eq!(resolve_token_budget(1_000, Some(8)), 256);
        assert_eq!(resolve_token_budget(1_000, None), 256);
    }

    #[tokio::test]
    async fn test_generate_without_model_fails_fast() {
        let loader = Arc::new(MockLoader::new());
        let manager = Arc::new(ModelLifecycleManager::new(loader.clone()));
        let service = GenerationService::new(manager, GenerationDefaults::default());

        let err = service
            .generate(request("Fix: teh", TokenBudget::Fixed(150), None))
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::NoModelLoaded));
        assert_eq!(loader.probe.generations(), 0);
    }

    #[tokio::test]
    async fn test_generate_formats_and_sanitizes() {
        let loader = MockLoader::new()
            .with_output("<think>user wants a fix</think>Output: I have an apple.\n\nOutput: again");
        let probe = loader.probe.clone();
        let (service, _manager) = loaded_service(loader).await;

        let result = service
            .generate(request("Correct: i has a apple", TokenBudget::Fixed(150), None))
            .await
            .unwrap();
        assert_eq!(result.text, "I have an apple.");
        assert_eq!(result.token_count, 4);

        let prompt = probe.last_prompt().unwrap();
        assert!(prompt.contains("<|im_start|>user\nCorrect: i has a apple<|im_end|>"));
        assert!(prompt.contains("<think>\n\n</think>"));
        assert_eq!(probe.last_max_tokens(), Some(150));
    }

    #[tokio::test]
    async fn test_builtin_format_without_template() {
        let loader = MockLoader::new().without_template();
        let probe = loader.probe.clone();
        let (service, _manager) = loaded_service(loader).await;

        service
            .generate(request("Translate: Hallo", TokenBudget::Fixed(10), None))
            .await
            .unwrap();
        // Family detected from the repository name
        assert_eq!(
            probe.last_prompt().unwrap(),
            "<|im_start|>user\nTranslate: Hallo<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[tokio::test]
    async fn test_reasoning_only_output_counts_zero_tokens() {
        let loader = MockLoader::new().with_output("<think>endless musing");
        let (service, _manager) = loaded_service(loader).await;

        let result = service
            .generate(request("hi", TokenBudget::Fixed(5), None))
            .await
            .unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.token_count, 0);
    }

    #[tokio::test]
    async fn test_auto_budget_uses_ram_hint() {
        let loader = MockLoader::new();
        let probe = loader.probe.clone();
        let (service, _manager) = loaded_service(loader).await;

        service
            .generate(request("one two three four", TokenBudget::Auto, Some(32)))
            .await
            .unwrap();
        assert_eq!(probe.last_max_tokens(), Some(70));
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_model_loaded() {
        let loader = MockLoader::new().failing_generation();
        let (service, manager) = loaded_service(loader).await;

        let err = service
            .generate(request("hi", TokenBudget::Fixed(5), None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Generation failed: decode failed");
        assert!(manager.status().model_loaded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_in_flight_generation_survives_unload() {
        let (gate, entered, release) = Gate::new();
        let loader = MockLoader::new().with_gate(gate);
        let probe = loader.probe.clone();
        let (service, manager) = loaded_service(loader).await;
        let service = Arc::new(service);

        let task = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .generate(request("Fix: teh cat", TokenBudget::Fixed(20), None))
                    .await
            })
        };
        entered.recv_timeout(Duration::from_secs(10)).unwrap();

        // Status answers while decoding is parked
        assert!(manager.status().model_loaded);

        let outcome = manager.unload().await;
        assert_eq!(
            outcome.warnings,
            vec![crate::web::error::ReclaimWarning::InFlight { holders: 1 }]
        );
        assert!(!manager.status().model_loaded);
        assert_eq!(probe.dropped(), 0);

        release.send(()).unwrap();
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.text, "Corrected text.");
        assert_eq!(probe.dropped(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_in_flight_generation_survives_reload() {
        let (gate, entered, release) = Gate::new();
        let loader = MockLoader::new().echoing_model_name().with_gate(gate);
        let probe = loader.probe.clone();
        let (service, manager) = loaded_service(loader).await;
        let service = Arc::new(service);

        let task = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .generate(request("Translate: Guten Morgen", TokenBudget::Fixed(20), None))
                    .await
            })
        };
        entered.recv_timeout(Duration::from_secs(10)).unwrap();

        manager.load("test/model-b").await.unwrap();
        assert_eq!(manager.status().model_path.as_deref(), Some("test/model-b"));
        assert_eq!(probe.loads(), 2);
        // The first model is still held by the parked generation
        assert_eq!(probe.dropped(), 0);

        release.send(()).unwrap();
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.text, "Answer from test/qwen3-0.6b.");
        assert_eq!(probe.dropped(), 1);
        assert_eq!(manager.status().model_path.as_deref(), Some("test/model-b"));
    }
}
