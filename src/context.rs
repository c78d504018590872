// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Execution context threaded through a pipeline.
//!
//! The context is an ordered map of `@`-prefixed bindings. It is shared
//! copy-on-write: [`ExecutionContext::derive`] is cheap and later writes to
//! either copy never affect the other.

use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::pipeline::OutputKey;

/// Binding for the pipeline's input.
pub const INPUT_KEY: &str = "@input";

/// Binding for the mod's options.
pub const OPTIONS_KEY: &str = "@options";

/// Keys that integration bindings may not claim.
pub const RESERVED_KEYS: [&str; 2] = [INPUT_KEY, OPTIONS_KEY];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    bindings: Arc<Map<String, Value>>,
}

impl ExecutionContext {
    /// Create the root context for a pipeline invocation.
    pub fn new(input: Value, options: Value) -> Self {
        let mut bindings = Map::new();
        bindings.insert(INPUT_KEY.to_string(), input);
        bindings.insert(OPTIONS_KEY.to_string(), options);
        Self {
            bindings: Arc::new(bindings),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn input(&self) -> &Value {
        self.get(INPUT_KEY).unwrap_or(&Value::Null)
    }

    pub fn options(&self) -> &Value {
        self.get(OPTIONS_KEY).unwrap_or(&Value::Null)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bind `key`, replacing any previous value.
    pub fn bind(&mut self, key: impl Into<String>, value: Value) {
        Arc::make_mut(&mut self.bindings).insert(key.into(), value);
    }

    /// Bind a step's result under `@<key>`.
    pub fn bind_output(&mut self, key: &OutputKey, value: Value) {
        self.bind(key.context_key(), value);
    }

    /// Bind every entry of `extra`, last write wins.
    pub fn extend(&mut self, extra: &Map<String, Value>) {
        if extra.is_empty() {
            return;
        }
        let bindings = Arc::make_mut(&mut self.bindings);
        for (key, value) in extra {
            bindings.insert(key.clone(), value.clone());
        }
    }

    /// A snapshot of this context with `extra` bound on top.
    pub fn derive(&self, extra: &Map<String, Value>) -> Self {
        let mut derived = self.clone();
        derived.extend(extra);
        derived
    }

    /// The context as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.bindings.as_ref().clone())
    }

    /// Data visible to templates at the current step.
    ///
    /// With implicit data flow (v1) the previous step's output fields are
    /// visible at the top level, with context bindings taking precedence.
    pub fn template_data(&self, previous_output: &Value, explicit_data_flow: bool) -> Value {
        match previous_output {
            Value::Object(fields) if !explicit_data_flow => {
                let mut data = fields.clone();
                for (key, value) in self.bindings.iter() {
                    data.insert(key.clone(), value.clone());
                }
                Value::Object(data)
            }
            _ => self.to_value(),
        }
    }
}

impl Serialize for ExecutionContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bindings.serialize(serializer)
    }
}

impl From<Map<String, Value>> for ExecutionContext {
    fn from(bindings: Map<String, Value>) -> Self {
        Self {
            bindings: Arc::new(bindings),
        }
    }
}
