use serde::{Deserialize, Serialize};

use super::config::GenerationDefaults;
use super::error::SidecarError;

// ─── Domain types ─────────────────────────────────────────────────────

/// Read-only snapshot of the sidecar, recomputed on every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub running: bool,
    pub model_loaded: bool,
    pub model_path: Option<String>,
}

/// How many tokens a generation may decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenBudget {
    Fixed(usize),
    /// Sized from the prompt length and system memory.
    Auto,
}

impl TokenBudget {
    /// Negative values are the host's sentinel for "pick for me".
    pub fn from_wire(max_tokens: i64) -> Self {
        if max_tokens < 0 {
            TokenBudget::Auto
        } else {
            TokenBudget::Fixed(max_tokens as usize)
        }
    }
}

/// Caller-controlled decoding parameters. Omitted values fall back to
/// [`GenerationDefaults`] when the pipeline is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub min_p: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: TokenBudget,
    pub sampling: SamplingParams,
    pub system_ram_gb: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub text: String,
    /// Tokens in the sanitized text, not in the raw decode.
    pub token_count: usize,
}

// ─── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub model_path: String,
}

impl LoadRequest {
    /// Reject a blank path. The path is otherwise passed on untouched, so
    /// `/load` and `/status` report exactly what the caller sent.
    pub fn validate(&self) -> Result<&str, SidecarError> {
        if self.model_path.trim().is_empty() {
            return Err(SidecarError::Validation(
                "model_path must be a non-empty string".to_string(),
            ));
        }
        Ok(&self.model_path)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadResponse {
    pub status: String,
    pub model_path: String,
}

/// `/unload` takes no fields; an empty body or `{}` are both accepted.
#[derive(Debug, Default, Deserialize)]
pub struct UnloadRequest {}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub min_p: Option<f32>,
    #[serde(default)]
    pub system_ram_gb: Option<u64>,
}

impl GenerateRequest {
    /// Check field ranges and fill omitted values from the configured defaults.
    pub fn into_generation_request(
        self,
        defaults: &GenerationDefaults,
    ) -> Result<GenerationRequest, SidecarError> {
        if self.prompt.trim().is_empty() {
            return Err(SidecarError::Validation(
                "prompt must be a non-empty string".to_string(),
            ));
        }

        let temperature = self.temperature.unwrap_or(defaults.temperature);
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(SidecarError::Validation(format!(
                "temperature must be >= 0, got {temperature}"
            )));
        }
        if let Some(top_p) = self.top_p {
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(SidecarError::Validation(format!(
                    "top_p must be in (0, 1], got {top_p}"
                )));
            }
        }
        if let Some(min_p) = self.min_p {
            if !(0.0..1.0).contains(&min_p) {
                return Err(SidecarError::Validation(format!(
                    "min_p must be in [0, 1), got {min_p}"
                )));
            }
        }

        Ok(GenerationRequest {
            prompt: self.prompt,
            max_tokens: TokenBudget::from_wire(self.max_tokens.unwrap_or(defaults.max_tokens)),
            sampling: SamplingParams {
                temperature,
                top_p: self.top_p,
                min_p: self.min_p,
            },
            system_ram_gb: self.system_ram_gb,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateResponse {
    pub response: String,
    pub tokens_generated: usize,
}

impl From<GenerationResult> for GenerateResponse {
    fn from(result: GenerationResult) -> Self {
        Self {
            response: result.text,
            tokens_generated: result.token_count,
        }
    }
}

/// Body of `/status` and `/unload`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_path: Option<String>,
}

impl From<StatusView> for StatusResponse {
    fn from(view: StatusView) -> Self {
        Self {
            status: if view.running { "running" } else { "stopped" }.to_string(),
            model_loaded: view.model_loaded,
            model_path: view.model_path,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub detail: String,
}
