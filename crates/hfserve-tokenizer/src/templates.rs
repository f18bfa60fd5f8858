//! Chat templates for rendering role-tagged messages into one prompt

use hfserve_types::{ChatMessage, MessageRole, Result, ServeError};
use regex::{Captures, Regex};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Chat template for formatting conversations.
///
/// Each message is rendered through a per-role format string in which
/// `{{ role }}`, `{{ content }}`, `{{ bos_token }}` and `{{ eos_token }}`
/// are substituted in a single pass, so message content is never
/// re-expanded.
#[derive(Debug, Clone)]
pub struct ChatTemplate {
    name: String,
    /// Format used for roles without an explicit entry
    default_format: String,
    role_formats: HashMap<&'static str, String>,
    /// Rendered once before the first message
    prefix: String,
    /// Opens the assistant turn
    generation_prompt: String,
    /// Fold a leading system message into the first user turn
    system_format: Option<String>,
    var_regex: Regex,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

impl ChatTemplate {
    /// Create new chat template
    pub fn new(name: impl Into<String>, default_format: impl Into<String>) -> Result<Self> {
        let var_regex = Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").map_err(|e| {
            ServeError::tokenizer(format!("Invalid template regex: {}", e))
        })?;

        Ok(Self {
            name: name.into(),
            default_format: default_format.into(),
            role_formats: HashMap::new(),
            prefix: String::new(),
            generation_prompt: String::new(),
            system_format: None,
            var_regex,
            bos_token: None,
            eos_token: None,
        })
    }

    pub fn with_role_format(mut self, role: MessageRole, format: impl Into<String>) -> Self {
        self.role_formats.insert(role.as_str(), format.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_generation_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.generation_prompt = prompt.into();
        self
    }

    /// Format applied to `{{ system }}` + `{{ content }}` of the first user turn
    pub fn with_system_merge(mut self, format: impl Into<String>) -> Self {
        self.system_format = Some(format.into());
        self
    }

    pub fn with_special_tokens(mut self, bos: Option<String>, eos: Option<String>) -> Self {
        self.bos_token = bos;
        self.eos_token = eos;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply template to conversation, preserving message order
    pub fn apply(&self, messages: &[ChatMessage], add_generation_prompt: bool) -> Result<String> {
        if messages.is_empty() {
            return Err(ServeError::request_validation(
                "messages must contain at least one message",
            ));
        }

        let mut context = HashMap::new();
        context.insert("bos_token", self.bos_token.clone().unwrap_or_default());
        context.insert("eos_token", self.eos_token.clone().unwrap_or_default());

        let mut rendered = self.substitute(&self.prefix, &context);
        let mut pending_system: Option<&str> = None;

        for (i, message) in messages.iter().enumerate() {
            if i == 0 && message.role == MessageRole::System && self.system_format.is_some() {
                pending_system = Some(&message.content);
                continue;
            }

            let mut content = message.content.clone();
            if message.role == MessageRole::User {
                if let (Some(system), Some(format)) = (pending_system.take(), &self.system_format) {
                    let mut merge = context.clone();
                    merge.insert("system", system.to_string());
                    merge.insert("content", content);
                    content = self.substitute(format, &merge);
                }
            }

            let format = self
                .role_formats
                .get(message.role.as_str())
                .unwrap_or(&self.default_format);
            let mut message_ctx = context.clone();
            message_ctx.insert("role", message.role.as_str().to_string());
            message_ctx.insert("content", content);
            rendered.push_str(&self.substitute(format, &message_ctx));
        }

        if let Some(system) = pending_system {
            // System message with no user turn after it
            rendered.push_str(system);
        }

        if add_generation_prompt {
            rendered.push_str(&self.substitute(&self.generation_prompt, &context));
        }

        debug!(template = %self.name, messages = messages.len(), "Applied chat template");
        Ok(rendered)
    }

    fn substitute(&self, text: &str, context: &HashMap<&str, String>) -> String {
        self.var_regex
            .replace_all(text, |caps: &Captures| {
                let var_name = &caps[1];
                match context.get(var_name) {
                    Some(value) => value.clone(),
                    None => {
                        warn!("Template variable '{}' not found in context", var_name);
                        // Keep the placeholder for missing variables
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}

/// Common chat templates for popular model families
pub struct CommonTemplates;

impl CommonTemplates {
    /// ChatML, the default for models that ship no template of their own
    pub fn chatml() -> Result<ChatTemplate> {
        Ok(ChatTemplate::new(
            "chatml",
            "<|im_start|>{{ role }}\n{{ content }}<|im_end|>\n",
        )?
        .with_generation_prompt("<|im_start|>assistant\n"))
    }

    /// Llama-2 chat template
    pub fn llama2() -> Result<ChatTemplate> {
        Ok(ChatTemplate::new("llama2", "{{ content }}")?
            .with_role_format(
                MessageRole::User,
                "{{ bos_token }}[INST] {{ content }} [/INST]",
            )
            .with_role_format(MessageRole::Assistant, " {{ content }} {{ eos_token }}")
            .with_system_merge("<<SYS>>\n{{ system }}\n<</SYS>>\n\n{{ content }}"))
    }

    /// Zephyr style template
    pub fn zephyr() -> Result<ChatTemplate> {
        Ok(
            ChatTemplate::new("zephyr", "<|{{ role }}|>\n{{ content }}{{ eos_token }}\n")?
                .with_generation_prompt("<|assistant|>\n"),
        )
    }

    /// Plain `role: content` lines
    pub fn simple() -> Result<ChatTemplate> {
        Ok(ChatTemplate::new("simple", "{{ role }}: {{ content }}\n")?
            .with_generation_prompt("assistant: "))
    }

    /// Get template by name
    pub fn get(name: &str) -> Result<Option<ChatTemplate>> {
        match name.to_lowercase().as_str() {
            "chatml" => Self::chatml().map(Some),
            "llama2" | "llama-2" | "mistral" => Self::llama2().map(Some),
            "zephyr" => Self::zephyr().map(Some),
            "simple" | "basic" => Self::simple().map(Some),
            _ => Ok(None),
        }
    }

    /// Pick a template for a model: an explicit name or inline per-message
    /// format wins, then the model family, then ChatML.
    pub fn resolve(
        template_override: Option<&str>,
        model_type: Option<&str>,
        bos_token: Option<String>,
        eos_token: Option<String>,
    ) -> Result<ChatTemplate> {
        let template = match template_override {
            Some(spec) => match Self::get(spec)? {
                Some(template) => template,
                None if spec.contains("{{") => ChatTemplate::new("custom", spec)?,
                None => {
                    return Err(ServeError::config(format!(
                        "Unknown chat template: {} (available: {})",
                        spec,
                        Self::available_templates().join(", ")
                    )))
                }
            },
            None => match model_type.map(str::to_lowercase).as_deref() {
                Some("llama") | Some("mistral") => Self::llama2()?,
                _ => Self::chatml()?,
            },
        };
        Ok(template.with_special_tokens(bos_token, eos_token))
    }

    /// List available template names
    pub fn available_templates() -> Vec<&'static str> {
        vec!["chatml", "llama2", "zephyr", "simple"]
    }
}
