// llama.cpp backend (feature `llama`)

use hf_hub::api::sync::ApiBuilder;
use llama_cpp_2::{
    context::params::LlamaContextParams,
    llama_backend::LlamaBackend,
    llama_batch::LlamaBatch,
    model::{params::LlamaModelParams, AddBos, LlamaModel, Special},
    token::LlamaToken,
};
use log::{debug, info, warn};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backend::{LoadedModel, ModelHandle, ModelLoader, Tokenizer};
use super::chat::sampler::create_sampler;
use super::chat::stop_conditions::{check_stop_conditions, trim_partial_marker};
use super::chat::token_text::TokenTextDecoder;
use super::chat::{ChatConvention, SamplingPipeline};
use super::config::BackendOptions;
use super::gguf_utils::read_chat_info;
use super::model_source::{pick_gguf_file, ModelSource};

/// Loads GGUF models through llama.cpp. The backend is initialized once per
/// process and shared by every model.
pub struct LlamaLoader {
    backend: Arc<LlamaBackend>,
    options: BackendOptions,
}

impl std::fmt::Debug for LlamaLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlamaLoader")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LlamaLoader {
    pub fn new(options: BackendOptions) -> Result<Self, String> {
        let backend = LlamaBackend::init().map_err(|e| format!("Failed to init backend: {e}"))?;
        Ok(Self {
            backend: Arc::new(backend),
            options,
        })
    }
}

/// Fetch a GGUF file from a model repository into the local cache.
fn download_remote(repo: &str, file: Option<&str>) -> Result<PathBuf, String> {
    // Uses HF_TOKEN if available
    let api = ApiBuilder::new()
        .with_token(std::env::var("HF_TOKEN").ok())
        .build()
        .map_err(|e| format!("Failed to create hub client: {e}"))?;
    let repo_api = api.model(repo.to_string());

    let file = match file {
        Some(file) => file.to_string(),
        None => {
            let info = repo_api
                .info()
                .map_err(|e| format!("Failed to list repository {repo}: {e}"))?;
            let names: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
            pick_gguf_file(&names)
                .ok_or_else(|| format!("no .gguf model file found in repository {repo}"))?
        }
    };

    info!("Fetching {file} from {repo}");
    repo_api
        .get(&file)
        .map_err(|e| format!("Failed to download {repo}/{file}: {e}"))
}

fn model_display_name(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

impl ModelLoader for LlamaLoader {
    fn name(&self) -> &'static str {
        "llama.cpp"
    }

    fn load(&self, source: &ModelSource) -> Result<LoadedModel, String> {
        let path = match source {
            ModelSource::LocalFile(path) => path.clone(),
            ModelSource::Remote { repo, file } => download_remote(repo, file.as_deref())?,
        };

        let model_params = LlamaModelParams::default().with_n_gpu_layers(self.options.gpu_layers);
        debug!("Loading {} with {} GPU layers", path.display(), self.options.gpu_layers);
        let model = LlamaModel::load_from_file(&self.backend, &path, &model_params)
            .map_err(|e| format!("Failed to load model: {e}"))?;

        let chat_info = read_chat_info(&path).unwrap_or_else(|e| {
            warn!("Could not read GGUF metadata from {}: {e}", path.display());
            Default::default()
        });
        let name = chat_info.general_name.or_else(|| model_display_name(&path));
        if chat_info.chat_template.is_none() {
            info!("No chat template in metadata, using built-in format");
        }

        let special = |token: LlamaToken| model.token_to_str(token, Special::Tokenize).unwrap_or_default();
        let convention = ChatConvention::new(chat_info.chat_template, name.as_deref())
            .with_special_tokens(special(model.token_bos()), special(model.token_eos()));
        info!(
            "Loaded {} (template family {:?})",
            name.as_deref().unwrap_or("unnamed model"),
            convention.family
        );

        let model = Arc::new(model);
        Ok(LoadedModel {
            handle: Box::new(LlamaHandle {
                backend: Arc::clone(&self.backend),
                model: Arc::clone(&model),
                options: self.options.clone(),
            }),
            tokenizer: Box::new(LlamaTokenizer { model, convention }),
        })
    }
}

struct LlamaHandle {
    backend: Arc<LlamaBackend>,
    model: Arc<LlamaModel>,
    options: BackendOptions,
}

impl ModelHandle for LlamaHandle {
    fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        pipeline: &SamplingPipeline,
        stop_markers: &[String],
    ) -> Result<String, String> {
        let mut ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.options.context_size))
            .with_n_batch(self.options.n_batch);
        if self.options.threads > 0 {
            ctx_params = ctx_params
                .with_n_threads(self.options.threads)
                .with_n_threads_batch(self.options.threads);
        }
        let mut context = self
            .model
            .new_context(&self.backend, ctx_params)
            .map_err(|e| format!("Context creation failed: {e}"))?;

        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Never)
            .map_err(|e| format!("Tokenization failed: {e}"))?;
        if tokens.is_empty() {
            return Err("prompt produced no tokens".to_string());
        }

        let n_ctx = context.n_ctx() as usize;
        if tokens.len() >= n_ctx {
            return Err(format!(
                "prompt of {} tokens does not fit the {n_ctx}-token context",
                tokens.len()
            ));
        }
        let max_tokens = max_tokens.min(n_ctx - tokens.len());

        // Evaluate the prompt in batch-sized chunks; logits only for the last token
        let batch_cap = (self.options.n_batch as usize).max(1);
        let mut batch = LlamaBatch::new(batch_cap, 1);
        let last = tokens.len() - 1;
        for (chunk_idx, chunk) in tokens.chunks(batch_cap).enumerate() {
            batch.clear();
            for (offset, &token) in chunk.iter().enumerate() {
                let pos = chunk_idx * batch_cap + offset;
                batch
                    .add(token, pos as i32, &[0], pos == last)
                    .map_err(|e| format!("Batch add failed at prompt token {pos}: {e}"))?;
            }
            context
                .decode(&mut batch)
                .map_err(|e| format!("Prompt decode failed (chunk {}): {e}", chunk_idx + 1))?;
        }

        let mut sampler = create_sampler(pipeline);
        let mut text_decoder = TokenTextDecoder::new();
        let mut response = String::new();
        let mut token_pos = tokens.len() as i32;

        for generated in 0..max_tokens {
            let next_token = sampler.sample(&context, -1);

            if self.model.is_eog_token(next_token) {
                debug!("End of generation after {generated} tokens");
                break;
            }

            batch.clear();
            batch
                .add(next_token, token_pos, &[0], true)
                .map_err(|e| format!("Batch add failed at token {generated}: {e}"))?;
            context
                .decode(&mut batch)
                .map_err(|e| format!("Decode failed at token {generated}: {e}"))?;
            token_pos += 1;

            let bytes = match self.model.token_to_bytes(next_token, Special::Tokenize) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("Token {next_token} has no text piece: {e}");
                    continue;
                }
            };
            // Part of a multi-byte character; the rest arrives with later tokens
            let token_str = text_decoder.push(&bytes);
            if token_str.is_empty() {
                continue;
            }

            let stop_result = check_stop_conditions(&response, &token_str, stop_markers);
            if stop_result.should_stop {
                debug!("Stop marker {:?} after {generated} tokens", stop_result.matched_token);
                stop_result.finish(&mut response, &token_str);
                break;
            }
            response.push_str(&token_str);
        }

        Ok(trim_partial_marker(&response, stop_markers))
    }
}

struct LlamaTokenizer {
    model: Arc<LlamaModel>,
    convention: ChatConvention,
}

impl Tokenizer for LlamaTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<i32>, String> {
        self.model
            .str_to_token(text, AddBos::Never)
            .map(|tokens| tokens.into_iter().map(|t| t.0).collect())
            .map_err(|e| format!("Tokenization failed: {e}"))
    }

    fn convention(&self) -> &ChatConvention {
        &self.convention
    }
}
