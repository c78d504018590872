// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the brick runtime.
//!
//! This module provides strongly-typed errors for the pipeline runtime, using
//! `thiserror` for ergonomic error definitions and `anyhow` for error
//! propagation at the binary edge.
//!
//! Every [`RuntimeError`] carries a stable [`ErrorKind`] so a presentation
//! layer can render it without re-deriving semantics, and wrapped errors keep
//! their cause chain through [`std::error::Error::source`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::expression::TemplateEngine;
use crate::logging::MessageContext;

/// Stable, inspectable classification of a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ConfigurationError")]
    Configuration,
    #[serde(rename = "InputValidationError")]
    InputValidation,
    #[serde(rename = "BrickNotFoundError")]
    BrickNotFound,
    #[serde(rename = "BrickInvocationError")]
    BrickInvocation,
    #[serde(rename = "TemplateRenderError")]
    TemplateRender,
    #[serde(rename = "BusinessError")]
    Business,
    #[serde(rename = "IntegrationConfigNotFoundError")]
    IntegrationNotFound,
    #[serde(rename = "HeadlessModeError")]
    HeadlessMode,
    #[serde(rename = "ExecutionError")]
    Execution,
}

impl ErrorKind {
    /// The serialized name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "ConfigurationError",
            Self::InputValidation => "InputValidationError",
            Self::BrickNotFound => "BrickNotFoundError",
            Self::BrickInvocation => "BrickInvocationError",
            Self::TemplateRender => "TemplateRenderError",
            Self::Business => "BusinessError",
            Self::IntegrationNotFound => "IntegrationConfigNotFoundError",
            Self::HeadlessMode => "HeadlessModeError",
            Self::Execution => "ExecutionError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single JSON-schema violation reported for a brick's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaViolation {
    /// JSON pointer to the offending value, e.g. `/message`.
    pub instance_location: String,
    /// The schema keyword that failed (`type`, `required`, ...).
    pub keyword: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = if self.instance_location.is_empty() {
            "/"
        } else {
            self.instance_location.as_str()
        };
        write!(f, "{location} ({}): {}", self.keyword, self.message)
    }
}

/// Position of a step inside the pipeline that raised an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLocation {
    pub step_index: usize,
    pub brick_id: String,
}

impl fmt::Display for StepLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.step_index, self.brick_id)
    }
}

fn describe_step(step: &Option<StepLocation>) -> String {
    match step {
        Some(location) => format!(" at {location}"),
        None => String::new(),
    }
}

fn describe_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while configuring or executing a pipeline.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error{}: {message}", describe_step(.step))]
    Configuration {
        message: String,
        step: Option<StepLocation>,
    },

    #[error("Invalid inputs for brick {brick_id}{}: {}", describe_step(.step), describe_violations(.violations))]
    InputValidation {
        brick_id: String,
        step: Option<StepLocation>,
        violations: Vec<SchemaViolation>,
    },

    #[error("Brick not found: {brick_id}{}", describe_step(.step))]
    BrickNotFound {
        brick_id: String,
        step: Option<StepLocation>,
    },

    #[error(transparent)]
    BrickInvocation(Box<BrickInvocationError>),

    #[error("Error rendering {field} with {engine}{}: {message}", describe_step(.step))]
    TemplateRender {
        engine: TemplateEngine,
        field: String,
        message: String,
        step: Option<StepLocation>,
    },

    #[error("{message}")]
    Business {
        message: String,
        details: Option<Value>,
    },

    #[error("Integration configuration not found: {integration_id} ({config_id})")]
    IntegrationNotFound {
        integration_id: String,
        config_id: String,
    },

    #[error(transparent)]
    HeadlessMode(Box<HeadlessModeError>),

    #[error("Execution failed: {0}")]
    Execution(String),
}

impl RuntimeError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            step: None,
        }
    }

    /// Create a brick-not-found error for a registry miss.
    pub fn brick_not_found(brick_id: impl Into<String>) -> Self {
        Self::BrickNotFound {
            brick_id: brick_id.into(),
            step: None,
        }
    }

    /// Create an expected, user-facing business error.
    pub fn business(message: impl Into<String>) -> Self {
        Self::Business {
            message: message.into(),
            details: None,
        }
    }

    /// Create a generic execution error for a failing brick.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Stable kind of this error (the outermost layer for wrapped errors).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::InputValidation { .. } => ErrorKind::InputValidation,
            Self::BrickNotFound { .. } => ErrorKind::BrickNotFound,
            Self::BrickInvocation(_) => ErrorKind::BrickInvocation,
            Self::TemplateRender { .. } => ErrorKind::TemplateRender,
            Self::Business { .. } => ErrorKind::Business,
            Self::IntegrationNotFound { .. } => ErrorKind::IntegrationNotFound,
            Self::HeadlessMode(_) => ErrorKind::HeadlessMode,
            Self::Execution(_) => ErrorKind::Execution,
        }
    }

    /// The innermost error, unwrapping brick invocation layers.
    pub fn root_cause(&self) -> &RuntimeError {
        let mut current = self;
        while let Self::BrickInvocation(wrapped) = current {
            current = &wrapped.source;
        }
        current
    }

    /// Check whether any layer of the cause chain has the given kind.
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        let mut current = self;
        loop {
            if current.kind() == kind {
                return true;
            }
            match current {
                Self::BrickInvocation(wrapped) => current = &wrapped.source,
                _ => return false,
            }
        }
    }

    /// Check if this error (or its root cause) is an expected business error.
    ///
    /// Downstream reporting layers may use this to deprioritize alerting.
    pub fn is_business(&self) -> bool {
        self.has_kind(ErrorKind::Business)
    }

    /// Messages of this error and every error it wraps, outermost first.
    pub fn cause_chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            messages.push(err.to_string());
            source = err.source();
        }
        messages
    }

    /// Attach the step location to errors raised before a brick is invoked.
    pub fn at_step(self, step_index: usize, brick_id: &str) -> Self {
        let location = Some(StepLocation {
            step_index,
            brick_id: brick_id.to_string(),
        });
        match self {
            Self::TemplateRender {
                engine,
                field,
                message,
                step: None,
            } => Self::TemplateRender {
                engine,
                field,
                message,
                step: location,
            },
            Self::InputValidation {
                brick_id,
                step: None,
                violations,
            } => Self::InputValidation {
                brick_id,
                step: location,
                violations,
            },
            Self::Configuration {
                message,
                step: None,
            } => Self::Configuration {
                message,
                step: location,
            },
            Self::BrickNotFound {
                brick_id,
                step: None,
            } => Self::BrickNotFound {
                brick_id,
                step: location,
            },
            other => other,
        }
    }
}

/// A brick's `run` failed; carries the step identity and a context snapshot.
#[derive(Error, Debug)]
#[error("Error running brick {brick_id} at step {step_index}: {source}")]
pub struct BrickInvocationError {
    pub brick_id: String,
    pub step_index: usize,
    pub output_key: Option<String>,
    pub label: Option<String>,
    /// Template context at the time of failure.
    pub context: Value,
    #[source]
    pub source: RuntimeError,
}

impl From<BrickInvocationError> for RuntimeError {
    fn from(err: BrickInvocationError) -> Self {
        Self::BrickInvocation(Box::new(err))
    }
}

/// A renderer was reached while running headless.
///
/// Carries everything a caller needs to run the renderer itself.
#[derive(Error, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("Renderer {brick_id} cannot run in headless mode")]
pub struct HeadlessModeError {
    pub brick_id: String,
    pub args: Value,
    pub context: Value,
    pub logger_context: MessageContext,
}

impl From<HeadlessModeError> for RuntimeError {
    fn from(err: HeadlessModeError) -> Self {
        Self::HeadlessMode(Box::new(err))
    }
}

/// Plain, structurally-cloneable form of a [`RuntimeError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<SerializedError>>,
}

impl From<&RuntimeError> for SerializedError {
    fn from(err: &RuntimeError) -> Self {
        let details = match err {
            RuntimeError::Business { details, .. } => details.clone(),
            RuntimeError::InputValidation { violations, .. } => {
                serde_json::to_value(violations).ok()
            }
            _ => None,
        };
        let cause = match err {
            RuntimeError::BrickInvocation(wrapped) => {
                Some(Box::new(SerializedError::from(&wrapped.source)))
            }
            _ => None,
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            details,
            cause,
        }
    }
}

impl SerializedError {
    /// Convert into a JSON value suitable for binding in a context.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

impl From<RuntimeError> for ConfigError {
    fn from(err: RuntimeError) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
