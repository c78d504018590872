// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured loggers handed to bricks.
//!
//! A [`Logger`] carries a [`MessageContext`] identifying where a record comes
//! from (mod, deployment, brick, step). The reducer derives a child logger per
//! step. Logging never fails: sinks swallow their own errors.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a log record comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,
    /// Set when the mod was installed through a deployment; enables alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brick_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl MessageContext {
    pub fn for_deployment(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: Some(deployment_id.into()),
            ..Self::default()
        }
    }

    /// Fields set in `other` override fields in `self`.
    pub fn merge(&self, other: &MessageContext) -> MessageContext {
        fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }
        MessageContext {
            mod_id: pick(&self.mod_id, &other.mod_id),
            extension_id: pick(&self.extension_id, &other.extension_id),
            deployment_id: pick(&self.deployment_id, &other.deployment_id),
            brick_id: pick(&self.brick_id, &other.brick_id),
            step_index: pick(&self.step_index, &other.step_index),
            label: pick(&self.label, &other.label),
            run_id: pick(&self.run_id, &other.run_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Append-only sink for structured log records.
pub trait Logger: Send + Sync {
    fn context(&self) -> &MessageContext;

    /// A logger whose context is this one's merged with `context`.
    fn child(&self, context: MessageContext) -> Arc<dyn Logger>;

    fn log(&self, level: LogLevel, message: &str, data: Option<&Value>);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, None);
    }

    fn error(&self, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Error, message, data);
    }
}

/// Forwards records to `tracing`, with the message context as fields.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    context: MessageContext,
}

impl TracingLogger {
    pub fn new(context: MessageContext) -> Self {
        Self { context }
    }
}

impl Logger for TracingLogger {
    fn context(&self) -> &MessageContext {
        &self.context
    }

    fn child(&self, context: MessageContext) -> Arc<dyn Logger> {
        Arc::new(Self::new(self.context.merge(&context)))
    }

    fn log(&self, level: LogLevel, message: &str, data: Option<&Value>) {
        let ctx = &self.context;
        let brick_id = ctx.brick_id.as_deref().unwrap_or_default();
        let deployment_id = ctx.deployment_id.as_deref().unwrap_or_default();
        let step_index = ctx.step_index.map(|index| index as i64).unwrap_or(-1);
        let data = data.map(Value::to_string).unwrap_or_default();

        match level {
            LogLevel::Trace => {
                tracing::trace!(brick_id, deployment_id, step_index, data = %data, "{message}")
            }
            LogLevel::Debug => {
                tracing::debug!(brick_id, deployment_id, step_index, data = %data, "{message}")
            }
            LogLevel::Info => {
                tracing::info!(brick_id, deployment_id, step_index, data = %data, "{message}")
            }
            LogLevel::Warn => {
                tracing::warn!(brick_id, deployment_id, step_index, data = %data, "{message}")
            }
            LogLevel::Error => {
                tracing::error!(brick_id, deployment_id, step_index, data = %data, "{message}")
            }
        }
    }
}

/// One captured record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub context: MessageContext,
}

/// Captures records in memory; children share the parent's buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    context: MessageContext,
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLogger {
    pub fn new(context: MessageContext) -> Self {
        Self {
            context,
            records: Arc::default(),
        }
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl Logger for MemoryLogger {
    fn context(&self) -> &MessageContext {
        &self.context
    }

    fn child(&self, context: MessageContext) -> Arc<dyn Logger> {
        Arc::new(Self {
            context: self.context.merge(&context),
            records: Arc::clone(&self.records),
        })
    }

    fn log(&self, level: LogLevel, message: &str, data: Option<&Value>) {
        if let Ok(mut records) = self.records.lock() {
            records.push(LogRecord {
                timestamp: Utc::now(),
                level,
                message: message.to_string(),
                data: data.cloned(),
                context: self.context.clone(),
            });
        }
    }
}
