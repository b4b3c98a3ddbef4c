use log::debug;
use uuid::Uuid;

use super::super::config::GenerationDefaults;
use super::super::models::SamplingParams;

/// One step of the sampler chain, applied in list order to the logits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerStage {
    RepetitionPenalty { penalty: f32, last_n: i32 },
    Temperature(f32),
    TopP { p: f32, min_keep: usize },
    MinP { p: f32, min_keep: usize },
    Distribution { seed: u32 },
    Greedy,
}

/// Ordered sampler configuration for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPipeline {
    stages: Vec<SamplerStage>,
}

impl SamplingPipeline {
    /// Build the chain for one request.
    ///
    /// The repetition penalty always runs first. A zero temperature selects
    /// greedy decoding; otherwise temperature, nucleus, optional min-p and the
    /// seeded distribution follow. Without a configured seed every call draws
    /// its own, so repeated prompts decode independently.
    pub fn build(params: &SamplingParams, defaults: &GenerationDefaults) -> Self {
        let min_keep = defaults.min_keep.max(1);
        let mut stages = vec![SamplerStage::RepetitionPenalty {
            penalty: defaults.repetition_penalty,
            last_n: defaults.repetition_context_size,
        }];

        if params.temperature <= 0.0 {
            stages.push(SamplerStage::Greedy);
        } else {
            stages.push(SamplerStage::Temperature(params.temperature));
            stages.push(SamplerStage::TopP {
                p: params.top_p.unwrap_or(defaults.top_p),
                min_keep,
            });
            if let Some(min_p) = params.min_p.filter(|p| *p > 0.0) {
                stages.push(SamplerStage::MinP { p: min_p, min_keep });
            }
            let seed = defaults.seed.unwrap_or_else(fresh_seed);
            stages.push(SamplerStage::Distribution { seed });
        }

        debug!("Sampler chain: {stages:?}");
        Self { stages }
    }

    pub fn stages(&self) -> &[SamplerStage] {
        &self.stages
    }

    pub fn is_greedy(&self) -> bool {
        self.stages.contains(&SamplerStage::Greedy)
    }
}

fn fresh_seed() -> u32 {
    Uuid::new_v4().as_u128() as u32
}

/// Translate the pipeline 1:1 into a llama.cpp sampler chain.
#[cfg(feature = "llama")]
pub(crate) fn create_sampler(pipeline: &SamplingPipeline) -> llama_cpp_2::sampling::LlamaSampler {
    use llama_cpp_2::sampling::LlamaSampler;

    let samplers: Vec<LlamaSampler> = pipeline
        .stages()
        .iter()
        .map(|stage| match *stage {
            SamplerStage::RepetitionPenalty { penalty, last_n } => {
                LlamaSampler::penalties(last_n, penalty, 0.0, 0.0)
            }
            SamplerStage::Temperature(t) => LlamaSampler::temp(t),
            SamplerStage::TopP { p, min_keep } => LlamaSampler::top_p(p, min_keep),
            SamplerStage::MinP { p, min_keep } => LlamaSampler::min_p(p, min_keep),
            SamplerStage::Distribution { seed } => LlamaSampler::dist(seed),
            SamplerStage::Greedy => LlamaSampler::greedy(),
        })
        .collect();

    LlamaSampler::chain_simple(samplers)
}
