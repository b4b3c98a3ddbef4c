use log::{debug, warn};

use super::jinja_templates::{apply_native_chat_template, supports_thinking_toggle, ChatMessage};
use super::templates::{apply_builtin_template, TemplateFamily};

/// How a loaded model expects its conversation to be laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConvention {
    /// Jinja chat template from the model metadata, if it ships one.
    pub template: Option<String>,
    pub family: TemplateFamily,
    pub bos_token: String,
    pub eos_token: String,
}

impl ChatConvention {
    pub fn new(template: Option<String>, model_name: Option<&str>) -> Self {
        let family = TemplateFamily::detect(template.as_deref(), model_name);
        Self {
            template,
            family,
            bos_token: String::new(),
            eos_token: String::new(),
        }
    }

    pub fn with_special_tokens(mut self, bos_token: String, eos_token: String) -> Self {
        self.bos_token = bos_token;
        self.eos_token = eos_token;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingMode {
    /// The template honored `enable_thinking = false`.
    Disabled,
    /// No toggle available; the template's own behavior applies.
    TemplateDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPrompt {
    pub text: String,
    pub thinking: ThinkingMode,
}

/// Render a conversation into the prompt text the model expects.
///
/// Reasoning mode is disabled when the template supports the toggle. A template
/// that rejects the toggle is rendered again without it, and a template that
/// cannot be rendered at all falls back to the built-in layout of its family.
pub fn format_prompt(messages: &[ChatMessage], convention: &ChatConvention) -> FormattedPrompt {
    if let Some(template) = convention.template.as_deref() {
        match render_template(template, messages, convention) {
            Ok(prompt) => return prompt,
            Err(e) => warn!(
                "Chat template failed, using built-in {:?} format: {e}",
                convention.family
            ),
        }
    }

    FormattedPrompt {
        text: apply_builtin_template(messages, convention.family),
        thinking: ThinkingMode::TemplateDefault,
    }
}

fn render_template(
    template: &str,
    messages: &[ChatMessage],
    convention: &ChatConvention,
) -> Result<FormattedPrompt, String> {
    let render = |enable_thinking: Option<bool>| {
        apply_native_chat_template(
            template,
            messages,
            true,
            &convention.bos_token,
            &convention.eos_token,
            enable_thinking,
        )
    };

    if supports_thinking_toggle(template) {
        match render(Some(false)) {
            Ok(text) => {
                return Ok(FormattedPrompt {
                    text,
                    thinking: ThinkingMode::Disabled,
                })
            }
            Err(e) => debug!("Template rejected enable_thinking=false, retrying without it: {e}"),
        }
    }

    render(None).map(|text| FormattedPrompt {
        text,
        thinking: ThinkingMode::TemplateDefault,
    })
}
