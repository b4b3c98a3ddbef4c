use minijinja::{context, Environment, Error, ErrorKind};
use serde::{Deserialize, Serialize};

/// Chat message structure for Jinja2 templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Preprocess a Jinja2 template string for minijinja compatibility.
///
/// Fixes Python-specific syntax that minijinja doesn't support:
/// - `tojson(ensure_ascii=False)` → `tojson`
/// - `.endswith("x")` → ` is endingwith("x")`
/// - `.startswith("x")` → ` is startingwith("x")`
/// - `.strip()` → ` | trim`
/// - `.items()` → ` | items`
fn preprocess_template(template: &str) -> String {
    use regex::Regex;

    let mut result = template
        .replace("tojson(ensure_ascii=False)", "tojson")
        .replace("tojson(ensure_ascii=True)", "tojson");

    if let Ok(re) = Regex::new(r"\.endswith\(") {
        result = re.replace_all(&result, " is endingwith(").to_string();
    }
    if let Ok(re) = Regex::new(r"\.startswith\(") {
        result = re.replace_all(&result, " is startingwith(").to_string();
    }

    result = result.replace(".strip()", " | trim");
    result = result.replace(".items()", " | items");

    result
}

/// Whether the template exposes the reasoning toggle (Qwen3-style).
pub fn supports_thinking_toggle(template_string: &str) -> bool {
    template_string.contains("enable_thinking")
}

/// Render a chat template from model metadata.
///
/// `enable_thinking` is only placed in the context when given; templates that
/// test `enable_thinking is defined` keep their default behavior otherwise.
pub fn apply_native_chat_template(
    template_string: &str,
    messages: &[ChatMessage],
    add_generation_prompt: bool,
    bos_token: &str,
    eos_token: &str,
    enable_thinking: Option<bool>,
) -> Result<String, String> {
    let processed_template = preprocess_template(template_string);

    let mut env = Environment::new();

    // raise_exception(msg) is used by templates for input validation
    env.add_function("raise_exception", |msg: String| -> Result<String, Error> {
        Err(Error::new(ErrorKind::InvalidOperation, msg))
    });
    env.add_function("strftime_now", |fmt: String| -> Result<String, Error> {
        use std::fmt::Write;
        let mut out = String::new();
        write!(out, "{}", chrono::Local::now().format(&fmt)).map_err(|_| {
            Error::new(ErrorKind::InvalidOperation, format!("bad strftime format: {fmt}"))
        })?;
        Ok(out)
    });

    env.add_template("chat_template", &processed_template)
        .map_err(|e| format!("Failed to parse chat template: {e}"))?;

    let template = env
        .get_template("chat_template")
        .map_err(|e| format!("Failed to get template: {e}"))?;

    let rendered = match enable_thinking {
        Some(enable_thinking) => template.render(context! {
            messages => messages,
            add_generation_prompt => add_generation_prompt,
            bos_token => bos_token,
            eos_token => eos_token,
            enable_thinking => enable_thinking,
        }),
        None => template.render(context! {
            messages => messages,
            add_generation_prompt => add_generation_prompt,
            bos_token => bos_token,
            eos_token => eos_token,
        }),
    };

    rendered.map_err(|e| format!("Failed to render template: {e}"))
}
