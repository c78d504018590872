// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Argument evaluation (`map_args`).
//!
//! Walks an [`ArgNode`] tree and replaces every expression with its value
//! against the template data of the current step. The evaluator is pure: it
//! never invokes bricks. `pipeline` and `defer` expressions are returned in
//! their wire form so that the consuming brick can hand them back to the
//! runtime through its execution services.
//!
//! Version-dependent behavior arrives through [`RenderOptions`]:
//!
//! - `implicit_render`: bare strings are rendered with this engine (v1/v2), or
//!   passed through verbatim when `None` (v3)
//! - `autoescape`: whether interpolated values are HTML-escaped
//! - `strict`: whether an unresolved `var` is an error

use serde_json::{Map, Value};
use tracing::trace;

use crate::api_version::{ApiVersion, ApiVersionOptions};
use crate::error::{RuntimeError, RuntimeResult};
use crate::expression::{is_simple_path, lookup, ArgNode, Expression, TemplateEngine};
use crate::template::render_template;

/// Property holding the sanitized configuration of an integration binding.
pub const SERVICE_KEY: &str = "__service";

/// Rendering switches derived from the active API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub autoescape: bool,
    pub implicit_render: Option<TemplateEngine>,
    /// Fail on unresolved `var` paths instead of yielding undefined.
    pub strict: bool,
}

impl RenderOptions {
    pub fn for_version(version: ApiVersion) -> Self {
        Self::from(version.options())
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl From<&ApiVersionOptions> for RenderOptions {
    fn from(options: &ApiVersionOptions) -> Self {
        Self {
            autoescape: options.autoescape,
            implicit_render: options.implicit_template_engine,
            strict: false,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::for_version(ApiVersion::default())
    }
}

/// Resolve every expression in `node` against `data`.
///
/// Undefined values drop their key inside objects and become `null` inside
/// arrays or at the top level.
pub fn map_args(node: &ArgNode, data: &Value, options: &RenderOptions) -> RuntimeResult<Value> {
    Ok(evaluate_node(node, data, options, "")?.unwrap_or(Value::Null))
}

/// Evaluate a deferred expression with extra bindings (e.g. `@element`).
///
/// `value` is the wire form received by a brick: either a `defer` expression
/// or any argument tree.
pub fn evaluate_deferred(
    value: &Value,
    data: &Value,
    extra: &Map<String, Value>,
    options: &RenderOptions,
) -> RuntimeResult<Value> {
    let node = match ArgNode::parse(value)? {
        ArgNode::Expression(Expression::Defer(inner)) => *inner,
        other => other,
    };

    let mut bindings = match data {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (key, binding) in extra {
        bindings.insert(key.clone(), binding.clone());
    }
    map_args(&node, &Value::Object(bindings), options)
}

/// An integration binding resolves to its sanitized configuration.
fn unwrap_service(value: &Value) -> &Value {
    match value {
        Value::Object(map) => map.get(SERVICE_KEY).unwrap_or(value),
        other => other,
    }
}

fn child_field(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn evaluate_node(
    node: &ArgNode,
    data: &Value,
    options: &RenderOptions,
    field: &str,
) -> RuntimeResult<Option<Value>> {
    match node {
        ArgNode::Expression(expression) => evaluate_expression(expression, data, options, field),
        ArgNode::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let item_field = format!("{field}[{index}]");
                values.push(evaluate_node(item, data, options, &item_field)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(values)))
        }
        ArgNode::Object(entries) => {
            let mut values = Map::with_capacity(entries.len());
            for (key, entry) in entries {
                if let Some(value) = evaluate_node(entry, data, options, &child_field(field, key))? {
                    values.insert(key.clone(), value);
                }
            }
            Ok(Some(Value::Object(values)))
        }
    }
}

fn evaluate_expression(
    expression: &Expression,
    data: &Value,
    options: &RenderOptions,
    field: &str,
) -> RuntimeResult<Option<Value>> {
    match expression {
        Expression::Literal(Value::String(text)) => match options.implicit_render {
            Some(engine) => render_implicit(engine, text, data, options, field),
            None => Ok(Some(Value::String(text.clone()))),
        },
        Expression::Literal(value) => Ok(Some(value.clone())),
        Expression::Var(path) => match lookup(data, path) {
            Some(value) => Ok(Some(unwrap_service(value).clone())),
            None if options.strict => Err(RuntimeError::configuration(format!(
                "Undefined variable {path} in {field}"
            ))),
            None => {
                trace!(path = %path, field = %field, "Variable resolved to undefined");
                Ok(None)
            }
        },
        Expression::Template { engine, source } => {
            render(*engine, source, data, options, field).map(|text| Some(Value::String(text)))
        }
        Expression::Pipeline(_) | Expression::Defer(_) => Ok(Some(expression.to_value())),
    }
}

fn render_implicit(
    engine: TemplateEngine,
    text: &str,
    data: &Value,
    options: &RenderOptions,
    field: &str,
) -> RuntimeResult<Option<Value>> {
    if is_simple_path(text, data) {
        return Ok(lookup(data, text).map(|value| unwrap_service(value).clone()));
    }
    if !text.contains("{{") && !text.contains("{%") {
        return Ok(Some(Value::String(text.to_string())));
    }
    render(engine, text, data, options, field).map(|text| Some(Value::String(text)))
}

fn render(
    engine: TemplateEngine,
    source: &str,
    data: &Value,
    options: &RenderOptions,
    field: &str,
) -> RuntimeResult<String> {
    render_template(engine, source, data, options.autoescape).map_err(|err| {
        RuntimeError::TemplateRender {
            engine,
            field: if field.is_empty() { "<root>".to_string() } else { field.to_string() },
            message: err.message,
            step: None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn args(value: Value) -> ArgNode {
        ArgNode::parse(&value).unwrap()
    }

    fn ctx() -> Value {
        json!({
            "@input": {"x": "a & b", "foo": 42, "items": [1, 2]},
            "@options": {},
            "@service": {"__service": {"prop": "abc123"}, "prop": "abc123"}
        })
    }

    #[test]
    fn test_implicit_render_by_version() {
        let node = args(json!({"message": "{{ @input.x }}"}));

        let v1 = map_args(&node, &ctx(), &RenderOptions::for_version(ApiVersion::V1)).unwrap();
        assert_eq!(v1, json!({"message": "a &amp; b"}));

        let v2 = map_args(&node, &ctx(), &RenderOptions::for_version(ApiVersion::V2)).unwrap();
        assert_eq!(v2, json!({"message": "a &amp; b"}));

        let v3 = map_args(&node, &ctx(), &RenderOptions::for_version(ApiVersion::V3)).unwrap();
        assert_eq!(v3, json!({"message": "{{ @input.x }}"}));
    }

    #[test]
    fn test_explicit_template_escaping() {
        let node = args(json!({"message": {"__type__": "mustache", "__value__": "{{ @input.x }}"}}));

        let v2 = map_args(&node, &ctx(), &RenderOptions::for_version(ApiVersion::V2)).unwrap();
        assert_eq!(v2["message"], json!("a &amp; b"));

        let v3 = map_args(&node, &ctx(), &RenderOptions::for_version(ApiVersion::V3)).unwrap();
        assert_eq!(v3["message"], json!("a & b"));
    }

    #[test]
    fn test_simple_path_preserves_type() {
        let node = args(json!({"value": "@input.foo", "list": "@input.items"}));
        let result = map_args(&node, &ctx(), &RenderOptions::for_version(ApiVersion::V1)).unwrap();
        assert_eq!(result, json!({"value": 42, "list": [1, 2]}));

        let v3 = map_args(&node, &ctx(), &RenderOptions::for_version(ApiVersion::V3)).unwrap();
        assert_eq!(v3, json!({"value": "@input.foo", "list": "@input.items"}));
    }

    #[test]
    fn test_var_and_undefined() {
        let node = args(json!({
            "found": {"__type__": "var", "__value__": "@input.foo"},
            "missing": {"__type__": "var", "__value__": "@input.nope"},
            "list": [{"__type__": "var", "__value__": "@input.nope"}]
        }));
        let result = map_args(&node, &ctx(), &RenderOptions::for_version(ApiVersion::V3)).unwrap();
        assert_eq!(result, json!({"found": 42, "list": [null]}));

        let err = map_args(
            &node,
            &ctx(),
            &RenderOptions::for_version(ApiVersion::V3).strict(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_service_binding_unwraps() {
        let node = args(json!({
            "whole": {"__type__": "var", "__value__": "@service"},
            "prop": {"__type__": "var", "__value__": "@service.prop"}
        }));
        let result = map_args(&node, &ctx(), &RenderOptions::for_version(ApiVersion::V3)).unwrap();
        assert_eq!(result, json!({"whole": {"prop": "abc123"}, "prop": "abc123"}));
    }

    #[test]
    fn test_pipeline_and_defer_pass_through() {
        let wire = json!({
            "body": {"__type__": "pipeline", "__value__": [{"id": "@test/echo"}]},
            "later": {"__type__": "defer", "__value__": {"__type__": "var", "__value__": "@element"}}
        });
        let result = map_args(&args(wire.clone()), &ctx(), &RenderOptions::default()).unwrap();
        assert_eq!(result["body"]["__type__"], json!("pipeline"));
        assert_eq!(result["body"]["__value__"][0]["id"], json!("@test/echo"));
        assert_eq!(result["later"], wire["later"]);
    }

    #[test]
    fn test_idempotent_on_plain_values() {
        let plain = json!({"a": [1, true, null, {"b": 2.5}], "c": {"d": []}});
        for version in ApiVersion::ALL {
            let result =
                map_args(&args(plain.clone()), &ctx(), &RenderOptions::for_version(version)).unwrap();
            assert_eq!(result, plain, "{version}");
        }
    }

    #[test]
    fn test_render_error_names_field() {
        let node = args(json!({"outer": [{"inner": {"__type__": "nunjucks", "__value__": "{% if %}"}}]}));
        let err = map_args(&node, &ctx(), &RenderOptions::default()).unwrap_err();
        match err {
            RuntimeError::TemplateRender { engine, field, .. } => {
                assert_eq!(engine, TemplateEngine::Nunjucks);
                assert_eq!(field, "outer[0].inner");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_evaluate_deferred_binds_extra() {
        let deferred = json!({"__type__": "defer", "__value__": {
            "doubled": {"__type__": "nunjucks", "__value__": "{{ @element * 2 }}"}
        }});
        let mut extra = Map::new();
        extra.insert("@element".to_string(), json!(21));

        let result =
            evaluate_deferred(&deferred, &ctx(), &extra, &RenderOptions::default()).unwrap();
        assert_eq!(result, json!({"doubled": "42"}));
    }
}
