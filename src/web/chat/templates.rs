use super::jinja_templates::ChatMessage;

/// Prompt layout family, detected from the chat template markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFamily {
    ChatMl,
    Mistral,
    Llama3,
    Gemma,
    Phi,
    Generic,
}

impl TemplateFamily {
    /// Detect the family from a chat template, falling back to the model name
    /// when the metadata carries no template.
    pub fn detect(template: Option<&str>, model_name: Option<&str>) -> Self {
        if let Some(s) = template {
            if s.contains("<|im_start|>") && s.contains("<|im_end|>") {
                return TemplateFamily::ChatMl; // Qwen, OpenAI format
            } else if s.contains("[INST]") && s.contains("[/INST]") {
                return TemplateFamily::Mistral;
            } else if s.contains("<|start_header_id|>") {
                return TemplateFamily::Llama3;
            } else if s.contains("<start_of_turn>") && s.contains("<end_of_turn>") {
                return TemplateFamily::Gemma;
            } else if s.contains("<|user|>") && s.contains("<|assistant|>") && s.contains("<|end|>") {
                return TemplateFamily::Phi;
            }
        }

        let name = model_name.unwrap_or_default().to_lowercase();
        if name.contains("qwen") {
            TemplateFamily::ChatMl
        } else if name.contains("mistral") || name.contains("ministral") {
            TemplateFamily::Mistral
        } else if name.contains("llama-3") || name.contains("llama3") {
            TemplateFamily::Llama3
        } else if name.contains("gemma") {
            TemplateFamily::Gemma
        } else if name.contains("phi") {
            TemplateFamily::Phi
        } else {
            TemplateFamily::Generic
        }
    }
}

/// Format messages with the built-in layout of a template family.
///
/// Used when the model ships no chat template or its template fails to render,
/// so it never fails.
pub fn apply_builtin_template(messages: &[ChatMessage], family: TemplateFamily) -> String {
    let mut p = String::new();

    match family {
        TemplateFamily::ChatMl => {
            // <|im_start|>role\ncontent<|im_end|>
            for m in messages {
                p.push_str("<|im_start|>");
                p.push_str(&m.role);
                p.push('\n');
                p.push_str(&m.content);
                p.push_str("<|im_end|>\n");
            }
            p.push_str("<|im_start|>assistant\n");
        }
        TemplateFamily::Mistral => {
            p.push_str("<s>");
            for m in messages {
                match m.role.as_str() {
                    "system" => {
                        p.push_str("[SYSTEM_PROMPT]");
                        p.push_str(&m.content);
                        p.push_str("[/SYSTEM_PROMPT]");
                    }
                    "assistant" => {
                        p.push_str(&m.content);
                        p.push_str("</s>");
                    }
                    _ => {
                        p.push_str("[INST]");
                        p.push_str(&m.content);
                        p.push_str("[/INST]");
                    }
                }
            }
        }
        TemplateFamily::Llama3 => {
            p.push_str("<|begin_of_text|>");
            for m in messages {
                p.push_str("<|start_header_id|>");
                p.push_str(&m.role);
                p.push_str("<|end_header_id|>\n\n");
                p.push_str(&m.content);
                p.push_str("<|eot_id|>");
            }
            p.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
        }
        TemplateFamily::Gemma => {
            // Gemma has no system role and calls the assistant "model"
            let mut pending_system = String::new();
            for m in messages {
                match m.role.as_str() {
                    "system" => {
                        pending_system.push_str(&m.content);
                        pending_system.push_str("\n\n");
                    }
                    "assistant" => {
                        p.push_str("<start_of_turn>model\n");
                        p.push_str(&m.content);
                        p.push_str("<end_of_turn>\n");
                    }
                    _ => {
                        p.push_str("<start_of_turn>user\n");
                        p.push_str(&pending_system);
                        pending_system.clear();
                        p.push_str(&m.content);
                        p.push_str("<end_of_turn>\n");
                    }
                }
            }
            p.push_str("<start_of_turn>model\n");
        }
        TemplateFamily::Phi => {
            for m in messages {
                p.push_str("<|");
                p.push_str(&m.role);
                p.push_str("|>\n");
                p.push_str(&m.content);
                p.push_str("<|end|>\n");
            }
            p.push_str("<|assistant|>\n");
        }
        TemplateFamily::Generic => {
            for m in messages {
                let label = match m.role.as_str() {
                    "system" => "System",
                    "assistant" => "Assistant",
                    _ => "User",
                };
                p.push_str(label);
                p.push_str(": ");
                p.push_str(&m.content);
                p.push_str("\n\n");
            }
            p.push_str("Assistant: ");
        }
    }

    p
}
