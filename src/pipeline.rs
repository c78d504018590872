// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline step definitions.
//!
//! A pipeline is an ordered list of [`PipelineStep`]s. In mod definitions each
//! step is written as:
//!
//! ```yaml
//! - id: "@pixiebrix/identity"
//!   outputKey: profile
//!   if: "{{ @input.enabled }}"
//!   onError:
//!     alert: true
//!   config:
//!     name: "{{ @input.name }}"
//! ```

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::api_version::ApiVersion;
use crate::error::{RuntimeError, RuntimeResult};
use crate::expression::ArgNode;
use crate::integrations::IntegrationDependency;

/// Valid output key identifiers (without the `@` prefix).
static OUTPUT_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid output key regex"));

/// Name under which a step's result is bound in the context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputKey(String);

impl OutputKey {
    /// Validate an output key; a leading `@` is accepted and dropped.
    pub fn new(key: &str) -> RuntimeResult<Self> {
        let bare = key.strip_prefix('@').unwrap_or(key);
        if OUTPUT_KEY_REGEX.is_match(bare) {
            Ok(Self(bare.to_string()))
        } else {
            Err(RuntimeError::configuration(format!(
                "Invalid output key: {key:?}"
            )))
        }
    }

    /// The key without the `@` prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as bound in the execution context, e.g. `@profile`.
    pub fn context_key(&self) -> String {
        format!("@{}", self.0)
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OutputKey {
    type Error = RuntimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<OutputKey> for String {
    fn from(key: OutputKey) -> Self {
        key.0
    }
}

/// Blank output keys are treated as absent.
fn deserialize_output_key<'de, D>(deserializer: D) -> Result<Option<OutputKey>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(key) => OutputKey::new(key).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Error handling options for a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnErrorPolicy {
    /// Send a deployment alert when the step fails.
    #[serde(default)]
    pub alert: bool,
}

/// One brick invocation in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    /// Registry id of the brick to run.
    pub id: String,

    #[serde(default)]
    pub config: ArgNode,

    #[serde(
        default,
        deserialize_with = "deserialize_output_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_key: Option<OutputKey>,

    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<ArgNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<OnErrorPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Stable id used to correlate trace records with the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl PipelineStep {
    /// Create a step invoking `id` with the given config.
    pub fn new(id: impl Into<String>, config: ArgNode) -> Self {
        Self {
            id: id.into(),
            config,
            output_key: None,
            condition: None,
            on_error: None,
            label: None,
            instance_id: None,
        }
    }

    pub fn with_output_key(mut self, key: OutputKey) -> Self {
        self.output_key = Some(key);
        self
    }

    pub fn with_condition(mut self, condition: ArgNode) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_alert(mut self) -> Self {
        self.on_error = Some(OnErrorPolicy { alert: true });
        self
    }

    /// Whether a failure of this step should raise a deployment alert.
    pub fn alerts_on_error(&self) -> bool {
        self.on_error.as_ref().map_or(false, |policy| policy.alert)
    }

    /// Serialize to the wire format.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Parse a pipeline from its wire format: a single step or a list of steps.
pub fn parse_pipeline(value: &Value) -> RuntimeResult<Vec<PipelineStep>> {
    let parse_step = |index: usize, step: &Value| {
        serde_json::from_value::<PipelineStep>(step.clone()).map_err(|err| {
            RuntimeError::configuration(format!("Invalid pipeline step {index}: {err}"))
        })
    };

    match value {
        Value::Array(steps) => steps
            .iter()
            .enumerate()
            .map(|(index, step)| parse_step(index, step))
            .collect(),
        Value::Object(_) => Ok(vec![parse_step(0, value)?]),
        Value::Null => Ok(Vec::new()),
        other => Err(RuntimeError::configuration(format!(
            "A pipeline must be a step or a list of steps, got {other}"
        ))),
    }
}

fn deserialize_pipeline<'de, D>(deserializer: D) -> Result<Vec<PipelineStep>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_pipeline(&value).map_err(serde::de::Error::custom)
}

/// Collect every brick id referenced by `steps`, including nested pipelines.
pub fn collect_brick_ids(steps: &[PipelineStep]) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    let mut pending: Vec<&[PipelineStep]> = vec![steps];
    while let Some(current) = pending.pop() {
        for step in current {
            ids.insert(step.id.clone());
            pending.extend(step.config.pipelines());
        }
    }
    ids
}

/// A runnable pipeline file: steps plus the values to start it with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<ApiVersion>,

    #[serde(deserialize_with = "deserialize_pipeline")]
    pub pipeline: Vec<PipelineStep>,

    #[serde(default)]
    pub integrations: Vec<IntegrationDependency>,

    #[serde(default)]
    pub input: Value,

    #[serde(default)]
    pub options: Value,
}
