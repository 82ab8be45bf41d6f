//! Template interpolation for SQL routines
//!
//! Handles `{{ variable }}` interpolation in locally registered procedures.
//! Supports nested access like `{{ vars.target }}`.

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}").unwrap()
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Variables exposed as `vars.*`
    pub vars: Value,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with variables
    pub fn with_vars(vars: Value) -> Self {
        Self { vars }
    }

    /// Set a single variable
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        if !self.vars.is_object() {
            self.vars = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.vars {
            map.insert(name.into(), value.into());
        }
        self
    }

    /// Get a value by path (e.g., "vars.target")
    pub fn get(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        match parts.as_slice() {
            ["vars"] => Some(&self.vars),
            ["vars", rest @ ..] => get_nested_value(&self.vars, rest),
            // Bare names resolve against vars
            _ => get_nested_value(&self.vars, &parts),
        }
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        match current {
            Value::Object(map) => {
                current = map.get(*part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut result = template.to_string();
    let mut errors = Vec::new();

    for cap in TEMPLATE_REGEX.captures_iter(template) {
        let (Some(full_match), Some(var_path)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let (full_match, var_path) = (full_match.as_str(), var_path.as_str());

        match ctx.get(var_path) {
            Some(value) => {
                let replacement = value_to_string(value);
                result = result.replace(full_match, &replacement);
            }
            None => {
                errors.push(var_path.to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(Error::config(format!(
            "Undefined variable in template: {}",
            errors.join(", ")
        )))
    }
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
