use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use log::info;

/// Fixed decoding settings applied when a request leaves them out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    /// Short correction/translation answers need few tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Floor on candidate tokens for every truncating sampler.
    #[serde(default = "default_min_keep")]
    pub min_keep: usize,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    /// Lookback window for the repetition penalty.
    #[serde(default = "default_repetition_context_size")]
    pub repetition_context_size: i32,
    /// Fixed sampler seed for reproducible runs. `None` draws a fresh seed
    /// for every request.
    #[serde(default)]
    pub seed: Option<u32>,
}

/// Options handed to the inference backend at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendOptions {
    #[serde(default = "default_gpu_layers")]
    pub gpu_layers: u32,
    #[serde(default = "default_context_size")]
    pub context_size: u32,
    #[serde(default = "default_n_batch")]
    pub n_batch: u32,
    /// 0 lets llama.cpp pick.
    #[serde(default)]
    pub threads: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarConfig {
    #[serde(default)]
    pub generation: GenerationDefaults,
    #[serde(default)]
    pub backend: BackendOptions,
}

fn default_max_tokens() -> i64 {
    150
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.8
}

fn default_min_keep() -> usize {
    1
}

fn default_repetition_penalty() -> f32 {
    1.15
}

fn default_repetition_context_size() -> i32 {
    64
}

fn default_gpu_layers() -> u32 {
    999
}

fn default_context_size() -> u32 {
    4096
}

fn default_n_batch() -> u32 {
    512
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            min_keep: default_min_keep(),
            repetition_penalty: default_repetition_penalty(),
            repetition_context_size: default_repetition_context_size(),
            seed: None,
        }
    }
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            gpu_layers: default_gpu_layers(),
            context_size: default_context_size(),
            n_batch: default_n_batch(),
            threads: 0,
        }
    }
}

impl SidecarConfig {
    /// Load the JSON config file, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
        let config: SidecarConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("Invalid config {}: {e}", path.display()))?;
        config.validate()?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let g = &self.generation;
        if g.min_keep == 0 {
            return Err("generation.min_keep must be at least 1".to_string());
        }
        if !(g.top_p > 0.0 && g.top_p <= 1.0) {
            return Err(format!("generation.top_p must be in (0, 1], got {}", g.top_p));
        }
        if g.temperature < 0.0 {
            return Err(format!("generation.temperature must be >= 0, got {}", g.temperature));
        }
        if g.repetition_context_size <= 0 {
            return Err("generation.repetition_context_size must be positive".to_string());
        }
        if self.backend.context_size == 0 {
            return Err("backend.context_size must be non-zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_correction_tuning() {
        let config = SidecarConfig::default();
        assert_eq!(config.generation.max_tokens, 150);
        assert_eq!(config.generation.top_p, 0.8);
        assert_eq!(config.generation.min_keep, 1);
        assert_eq!(config.generation.repetition_penalty, 1.15);
        assert_eq!(config.generation.repetition_context_size, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        assert_eq!(SidecarConfig::load(None).unwrap(), SidecarConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"generation":{{"temperature":0.2}},"backend":{{"gpu_layers":0}}}}"#)
            .unwrap();

        let config = SidecarConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.generation.temperature, 0.2);
        assert_eq!(config.generation.top_p, 0.8);
        assert_eq!(config.backend.gpu_layers, 0);
        assert_eq!(config.backend.context_size, 4096);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"generation":{{"min_keep":0}}}}"#).unwrap();
        let err = SidecarConfig::load(Some(file.path())).unwrap_err();
        assert!(err.contains("min_keep"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = SidecarConfig::load(Some(Path::new("/nonexistent/sidecar.json"))).unwrap_err();
        assert!(err.contains("/nonexistent/sidecar.json"));
    }
}
