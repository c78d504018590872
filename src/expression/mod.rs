// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Expression model for brick configuration.
//!
//! Brick arguments are stored as JSON in mod definitions. Values that need
//! evaluation are tagged objects of the form
//! `{"__type__": <kind>, "__value__": <payload>}`. Parsing turns that wire
//! format into a closed [`Expression`] sum type inside an [`ArgNode`] tree, so
//! evaluation sites match exhaustively.
//!
//! | `__type__`                               | payload                |
//! |------------------------------------------|------------------------|
//! | `var`                                    | path string            |
//! | `mustache` / `handlebars` / `nunjucks`   | template source        |
//! | `pipeline`                               | step or list of steps  |
//! | `defer`                                  | any argument tree      |

pub mod path;

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RuntimeError, RuntimeResult};
use crate::pipeline::{parse_pipeline, PipelineStep};

pub use path::{get_path, is_simple_path, lookup, parse_path, PathSegment, PathSyntaxError};

/// Wire key carrying the expression kind.
pub const TYPE_KEY: &str = "__type__";

/// Wire key carrying the expression payload.
pub const VALUE_KEY: &str = "__value__";

/// Supported template engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateEngine {
    Mustache,
    Handlebars,
    Nunjucks,
}

impl TemplateEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mustache => "mustache",
            Self::Handlebars => "handlebars",
            Self::Nunjucks => "nunjucks",
        }
    }
}

impl fmt::Display for TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateEngine {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mustache" => Ok(Self::Mustache),
            "handlebars" => Ok(Self::Handlebars),
            "nunjucks" => Ok(Self::Nunjucks),
            other => Err(RuntimeError::configuration(format!(
                "Unknown template engine: {other}"
            ))),
        }
    }
}

/// A literal value or something that must be evaluated against a context.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Var(String),
    Template {
        engine: TemplateEngine,
        source: String,
    },
    /// Executed by the reducer as a sub-pipeline, never by the evaluator.
    Pipeline(Vec<PipelineStep>),
    /// Evaluated later by a consuming brick with extra bindings.
    Defer(Box<ArgNode>),
}

impl Expression {
    /// Create a `var` expression.
    pub fn var(path: impl Into<String>) -> Self {
        Self::Var(path.into())
    }

    /// Create a template expression.
    pub fn template(engine: TemplateEngine, source: impl Into<String>) -> Self {
        Self::Template {
            engine,
            source: source.into(),
        }
    }

    /// The wire `__type__` of this expression (`None` for literals).
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Self::Literal(_) => None,
            Self::Var(_) => Some("var"),
            Self::Template { engine, .. } => Some(engine.as_str()),
            Self::Pipeline(_) => Some("pipeline"),
            Self::Defer(_) => Some("defer"),
        }
    }

    /// Parse a tagged wire object.
    fn from_wire(kind: &str, payload: &Value) -> RuntimeResult<Self> {
        match kind {
            "var" => match payload {
                Value::String(path) => Ok(Self::Var(path.clone())),
                other => Err(RuntimeError::configuration(format!(
                    "var expression expects a string path, got {other}"
                ))),
            },
            "mustache" | "handlebars" | "nunjucks" => {
                let engine: TemplateEngine = kind.parse()?;
                match payload {
                    Value::String(source) => Ok(Self::Template {
                        engine,
                        source: source.clone(),
                    }),
                    other => Err(RuntimeError::configuration(format!(
                        "{kind} expression expects a template string, got {other}"
                    ))),
                }
            }
            "pipeline" => match payload {
                Value::Null => Ok(Self::Pipeline(Vec::new())),
                Value::Array(_) | Value::Object(_) => Ok(Self::Pipeline(parse_pipeline(payload)?)),
                other => Err(RuntimeError::configuration(format!(
                    "pipeline expression expects a list of steps, got {other}"
                ))),
            },
            "defer" => Ok(Self::Defer(Box::new(ArgNode::parse(payload)?))),
            other => Err(RuntimeError::configuration(format!(
                "Unknown expression type: {other}"
            ))),
        }
    }

    /// Serialize back to the wire format.
    pub fn to_value(&self) -> Value {
        let payload = match self {
            Self::Literal(value) => return value.clone(),
            Self::Var(path) => Value::String(path.clone()),
            Self::Template { source, .. } => Value::String(source.clone()),
            Self::Pipeline(steps) => Value::Array(steps.iter().map(PipelineStep::to_value).collect()),
            Self::Defer(node) => node.to_value(),
        };
        let mut map = Map::new();
        if let Some(kind) = self.type_name() {
            map.insert(TYPE_KEY.to_string(), Value::String(kind.to_string()));
        }
        map.insert(VALUE_KEY.to_string(), payload);
        Value::Object(map)
    }
}

/// A parsed argument tree.
///
/// JSON scalars become [`Expression::Literal`] leaves; objects without a
/// `__type__` tag and arrays are walked structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ArgNode {
    Expression(Expression),
    Array(Vec<ArgNode>),
    Object(IndexMap<String, ArgNode>),
}

impl ArgNode {
    /// Parse a wire-format JSON value.
    pub fn parse(value: &Value) -> RuntimeResult<Self> {
        match value {
            Value::Object(map) => match map.get(TYPE_KEY) {
                Some(Value::String(kind)) => {
                    let payload = map.get(VALUE_KEY).unwrap_or(&Value::Null);
                    Ok(Self::Expression(Expression::from_wire(kind, payload)?))
                }
                Some(other) => Err(RuntimeError::configuration(format!(
                    "{TYPE_KEY} must be a string, got {other}"
                ))),
                None => {
                    let mut entries = IndexMap::with_capacity(map.len());
                    for (key, entry) in map {
                        entries.insert(key.clone(), Self::parse(entry)?);
                    }
                    Ok(Self::Object(entries))
                }
            },
            Value::Array(items) => items
                .iter()
                .map(Self::parse)
                .collect::<RuntimeResult<Vec<_>>>()
                .map(Self::Array),
            scalar => Ok(Self::Expression(Expression::Literal(scalar.clone()))),
        }
    }

    /// A literal leaf holding `value` as-is.
    pub fn literal(value: Value) -> Self {
        Self::Expression(Expression::Literal(value))
    }

    /// An empty object node.
    pub fn empty() -> Self {
        Self::Object(IndexMap::new())
    }

    /// Look up a property of an object node.
    pub fn get(&self, key: &str) -> Option<&ArgNode> {
        match self {
            Self::Object(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Check that the tree contains no expression needing evaluation.
    pub fn is_literal(&self) -> bool {
        match self {
            Self::Expression(Expression::Literal(_)) => true,
            Self::Expression(_) => false,
            Self::Array(items) => items.iter().all(Self::is_literal),
            Self::Object(entries) => entries.values().all(Self::is_literal),
        }
    }

    /// Visit every nested pipeline in the tree (not descending into them).
    pub fn pipelines(&self) -> Vec<&[PipelineStep]> {
        let mut found = Vec::new();
        self.collect_pipelines(&mut found);
        found
    }

    fn collect_pipelines<'a>(&'a self, found: &mut Vec<&'a [PipelineStep]>) {
        match self {
            Self::Expression(Expression::Pipeline(steps)) => found.push(steps.as_slice()),
            Self::Expression(Expression::Defer(inner)) => inner.collect_pipelines(found),
            Self::Expression(_) => {}
            Self::Array(items) => items.iter().for_each(|item| item.collect_pipelines(found)),
            Self::Object(entries) => entries.values().for_each(|entry| entry.collect_pipelines(found)),
        }
    }

    /// Serialize back to the wire format.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Expression(expression) => expression.to_value(),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, entry)| (key.clone(), entry.to_value()))
                    .collect(),
            ),
        }
    }
}

impl Default for ArgNode {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Expression> for ArgNode {
    fn from(expression: Expression) -> Self {
        Self::Expression(expression)
    }
}

impl TryFrom<Value> for ArgNode {
    type Error = RuntimeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArgNode> for Value {
    fn from(node: ArgNode) -> Self {
        node.to_value()
    }
}
