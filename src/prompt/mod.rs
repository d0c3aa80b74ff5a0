//! Chat prompt templates.
//!
//! A prompt is the fixed scaffolding around one model call: a system template
//! (with `{name}` variable slots), then prior conversation, then the user
//! input, then the scratchpad of the current run (the assistant's tool calls
//! and their results so far). Rendering produces the ordered message list a
//! provider consumes; the system text travels separately, the way provider
//! requests carry it.

use std::collections::HashMap;

use crate::types::Message;

/// A chat prompt: system template plus slots for history, input, scratchpad.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    system_template: String,
    variables: HashMap<String, String>,
}

impl ChatPrompt {
    pub fn new(system_template: impl Into<String>) -> Self {
        Self {
            system_template: system_template.into(),
            variables: HashMap::new(),
        }
    }

    /// Bind a `{name}` variable for system-template substitution.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// System text with variables substituted.
    ///
    /// Substitution is single-pass; `{name}` slots without a bound variable
    /// pass through verbatim.
    pub fn system_text(&self) -> String {
        substitute(&self.system_template, &self.variables)
    }

    /// Ordered message list for one model call: history, then the user input,
    /// then the scratchpad.
    pub fn render_messages(
        &self,
        history: &[Message],
        input: &str,
        scratchpad: &[Message],
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + scratchpad.len() + 1);
        messages.extend(history.iter().cloned());
        messages.push(Message::user(input));
        messages.extend(scratchpad.iter().cloned());
        messages
    }
}

impl Default for ChatPrompt {
    fn default() -> Self {
        Self::new("You are a helpful assistant.")
    }
}

fn substitute(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        match after_open.find('}') {
            Some(close) => {
                let name = &after_open[..close];
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after_open[close + 1..];
            }
            None => {
                // Unclosed brace: emit the remainder as-is.
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}
