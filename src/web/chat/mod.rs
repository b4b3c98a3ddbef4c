// Chat module: everything between a raw prompt and a clean answer
//
// - formatter.rs: conversation -> prompt text (jinja template or built-in layout)
// - sampler.rs: sampler chain configuration
// - generation.rs: GenerationService and the automatic token budget
// - stop_conditions.rs: chat-turn marker detection for the decode loop
// - token_text.rs: token bytes -> UTF-8 text for the decode loop
// - sanitizer.rs: raw output -> single clean answer

mod formatter;
mod generation;
mod jinja_templates;
pub mod sampler;
pub mod sanitizer;
pub mod stop_conditions;
mod templates;
pub mod token_text;

pub use formatter::{format_prompt, ChatConvention, FormattedPrompt, ThinkingMode};
pub use generation::{resolve_token_budget, GenerationService};
pub use jinja_templates::ChatMessage;
pub use sampler::{SamplerStage, SamplingPipeline};
pub use templates::TemplateFamily;
