//! Context-sensitive completion over the command model.

use std::collections::BTreeSet;
use std::sync::Arc;

use yangcli_dsl::{ArgStyle, CommandModel};

use crate::interpreter::{split_key_value, SHOW_COMMAND};

/// "Input is complete; press Enter." Displayed, never inserted.
pub const END_OF_INPUT: &str = "<CR>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub display: String,
    pub replacement: String,
}

impl Candidate {
    fn word(text: &str) -> Self {
        if text == END_OF_INPUT {
            return Self::end_of_input();
        }
        Self {
            display: text.to_string(),
            replacement: text.to_string(),
        }
    }

    pub fn end_of_input() -> Self {
        Self {
            display: END_OF_INPUT.to_string(),
            replacement: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionEngine {
    model: Arc<CommandModel>,
    builtins: Vec<String>,
}

impl CompletionEngine {
    pub fn new(model: Arc<CommandModel>, builtins: Vec<String>) -> Self {
        Self { model, builtins }
    }

    /// The partial word at the end of `text` (after the last whitespace).
    pub fn current_word(text: &str) -> &str {
        match text.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
            Some((i, c)) => &text[i + c.len_utf8()..],
            None => text,
        }
    }

    /// Candidates for `text`, assumed to end at the cursor.
    pub fn complete(&self, text: &str) -> Vec<Candidate> {
        let Some(mut tokens) = shlex::split(text) else {
            return Vec::new();
        };
        if text.ends_with(char::is_whitespace) {
            tokens.push(String::new());
        }

        let word = Self::current_word(text);
        self.candidates(&tokens)
            .into_iter()
            .filter(|c| c.starts_with(word))
            .map(|c| Candidate::word(&c))
            .collect()
    }

    fn candidates(&self, tokens: &[String]) -> Vec<String> {
        if tokens.len() <= 1 {
            return self.top_level();
        }
        let head = &tokens[0];

        if head == SHOW_COMMAND {
            return self.show_candidates(&tokens[1..]);
        }

        match self.model.command(head) {
            Some(command) if command.arg_style == ArgStyle::Kv => {
                let typed = match tokens.split_last() {
                    Some((last, rest)) if last.is_empty() => &rest[1..],
                    _ => &tokens[1..],
                };
                let used: BTreeSet<&str> = typed
                    .iter()
                    .filter_map(|t| split_key_value(t).ok())
                    .map(|(key, _)| key)
                    .collect();
                command
                    .input_params
                    .iter()
                    .filter(|p| !used.contains(p.as_str()))
                    .map(|p| format!("{p}="))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn top_level(&self) -> Vec<String> {
        self.builtins
            .iter()
            .cloned()
            .chain(self.model.visible_commands().map(|c| c.name.clone()))
            .collect()
    }

    /// `args` are the tokens after `show`.
    fn show_candidates(&self, args: &[String]) -> Vec<String> {
        let [field, tail @ ..] = args else {
            return Vec::new();
        };
        if tail.is_empty() {
            return self
                .model
                .status_fields()
                .iter()
                .map(|f| f.name.clone())
                .collect();
        }

        let Some(field) = self.model.status_field(field) else {
            return Vec::new();
        };
        let value_typed = tail.iter().any(|t| !t.is_empty());
        let ends_with_empty = tail.last().is_some_and(|t| t.is_empty());
        if value_typed && ends_with_empty {
            return vec![END_OF_INPUT.to_string()];
        }
        field.completions.clone()
    }
}
