// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Template engines used to render brick arguments.
//!
//! Three dialects are supported, all rendering against a JSON context and
//! producing a string:
//!
//! - [`TemplateEngine::Mustache`] - logic-less `{{name}}` templates with sections
//! - [`TemplateEngine::Handlebars`] - mustache plus `#if`/`#unless`/`#each`/`#with`
//! - [`TemplateEngine::Nunjucks`] - `{{ expr | filter }}` output and `{% %}` tags
//!
//! Template syntax is interpreted, never compiled to host code, so user
//! templates cannot execute arbitrary code. Whether interpolated values are
//! HTML-escaped is always decided by the caller.

pub mod escape;
mod mustache;
mod nunjucks;

use std::fmt;

use serde_json::Value;

use crate::expression::TemplateEngine;

pub use escape::escape_html;

/// A template failed to parse or render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    pub message: String,
}

impl TemplateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TemplateError {}

/// Render `source` with `engine` against `data`.
pub fn render_template(
    engine: TemplateEngine,
    source: &str,
    data: &Value,
    autoescape: bool,
) -> Result<String, TemplateError> {
    match engine {
        TemplateEngine::Mustache => {
            mustache::render(source, data, autoescape, mustache::Dialect::Mustache)
        }
        TemplateEngine::Handlebars => {
            mustache::render(source, data, autoescape, mustache::Dialect::Handlebars)
        }
        TemplateEngine::Nunjucks => nunjucks::render(source, data, autoescape),
    }
}

/// Stringify a value the way JavaScript template engines print it.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => display_number(num),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => display_value(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn display_number(num: &serde_json::Number) -> String {
    if num.is_i64() || num.is_u64() {
        return num.to_string();
    }
    match num.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        Some(f) => f.to_string(),
        None => num.to_string(),
    }
}

/// JavaScript truthiness (empty arrays and objects are truthy).
pub(crate) fn is_js_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(num) => num.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
