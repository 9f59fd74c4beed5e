//! Prompt templating with `__param:<key>__` substitution.
//!
//! Two strategies are available:
//!
//! - [`Substitution::Tree`] parses the template and walks it. A string that is
//!   exactly one token is replaced by the parameter's JSON value (so numbers
//!   stay numbers); tokens embedded in longer strings are replaced by the
//!   value's text form. Each string is scanned once, so substituted text is
//!   never expanded again. Unknown keys leave the token in place.
//! - [`Substitution::Text`] replaces tokens in the raw template text, in
//!   parameter order, then parses the result. Later parameters can expand
//!   tokens introduced by earlier values.
//!
//! Caller-facing parameter names are translated through an alias map before
//! lookup; names without an alias are used as-is.
use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::config::Substitution;
use crate::error::{AppError, AppResult};

pub const TOKEN_OPEN: &str = "__param:";
pub const TOKEN_CLOSE: &str = "__";

#[derive(Debug, Clone, Default)]
pub struct PromptConstructor {
    strategy: Substitution,
    aliases: HashMap<String, String>,
}

impl PromptConstructor {
    pub fn new() -> Self {
        PromptConstructor::default()
    }

    pub fn with_strategy(mut self, strategy: Substitution) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Construct a prompt by substituting placeholders inside the raw
    /// `template` text with values from `params`.
    pub fn construct_prompt(&self, template: &str, params: &Map<String, Value>) -> AppResult<Value> {
        let params = self.rename(params);
        match self.strategy {
            Substitution::Tree => {
                let mut doc: Value = serde_json::from_str(template)
                    .map_err(|e| AppError::PromptConstruction(format!("template is not valid JSON: {}", e)))?;
                replace_placeholders(&mut doc, &params);
                Ok(doc)
            }
            Substitution::Text => replace_text(template, &params),
        }
    }

    fn rename(&self, params: &Map<String, Value>) -> Map<String, Value> {
        params
            .iter()
            .map(|(k, v)| {
                let key = self.aliases.get(k).cloned().unwrap_or_else(|| k.clone());
                (key, v.clone())
            })
            .collect()
    }
}

/// Recursively replace placeholder strings with parameter values.
fn replace_placeholders(value: &mut Value, params: &Map<String, Value>) {
    match value {
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                replace_placeholders(v, params);
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                replace_placeholders(v, params);
            }
        }
        Value::String(s) => {
            if !s.contains(TOKEN_OPEN) {
                return;
            }
            let rewritten = {
                let segments = split_tokens(s);
                match segments.as_slice() {
                    [Segment::Token { key, .. }] => params.get(*key).cloned(),
                    _ => Some(Value::String(interpolate(&segments, params))),
                }
            };
            if let Some(v) = rewritten {
                *value = v;
            }
        }
        _ => {}
    }
}

fn interpolate(segments: &[Segment<'_>], params: &Map<String, Value>) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            Segment::Literal(text) => out.push_str(text),
            Segment::Token { key, raw } => match params.get(*key) {
                Some(v) => out.push_str(&text_form(v)),
                None => out.push_str(raw),
            },
        }
    }
    out
}

fn replace_text(template: &str, params: &Map<String, Value>) -> AppResult<Value> {
    let mut text = template.to_string();
    for (key, value) in params {
        let bare = format!("{}{}{}", TOKEN_OPEN, key, TOKEN_CLOSE);
        let quoted = format!("\"{}\"", bare);
        let encoded = serde_json::to_string(value)
            .map_err(|e| AppError::PromptConstruction(format!("cannot encode '{}': {}", key, e)))?;
        text = text.replace(&quoted, &encoded);
        if text.contains(&bare) {
            text = text.replace(&bare, &escape_in_string(&text_form(value)));
        }
    }
    serde_json::from_str(&text)
        .map_err(|e| AppError::PromptConstruction(format!("substituted template is not valid JSON: {}", e)))
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Token { key: &'a str, raw: &'a str },
}

fn split_tokens(s: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = s;
    let mut cursor = 0usize;
    while let Some(found) = rest[cursor..].find(TOKEN_OPEN) {
        let start = cursor + found;
        let key_start = start + TOKEN_OPEN.len();
        let Some(len) = rest[key_start..].find(TOKEN_CLOSE) else { break };
        if len == 0 {
            cursor = key_start;
            continue;
        }
        let end = key_start + len + TOKEN_CLOSE.len();
        if start > 0 {
            out.push(Segment::Literal(&rest[..start]));
        }
        out.push(Segment::Token { key: &rest[key_start..key_start + len], raw: &rest[start..end] });
        rest = &rest[end..];
        cursor = 0;
    }
    if !rest.is_empty() {
        out.push(Segment::Literal(rest));
    }
    out
}

/// Text form used when a value lands inside a longer string.
fn text_form(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_in_string(s: &str) -> String {
    let quoted = Value::String(s.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// True if any `__param:` token survives anywhere in `doc`.
pub fn has_placeholders(doc: &Value) -> bool {
    match doc {
        Value::Object(map) => map.values().any(has_placeholders),
        Value::Array(arr) => arr.iter().any(has_placeholders),
        Value::String(s) => split_tokens(s).iter().any(|seg| matches!(seg, Segment::Token { .. })),
        _ => false,
    }
}
