// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::api_version::ApiVersion;
use crate::config::RuntimeConfig;
use crate::logging::{Logger, TracingLogger};
use crate::telemetry::RunId;
use crate::trace::Branch;

/// Values a top-level pipeline starts from.
#[derive(Debug, Clone, Default)]
pub struct InitialValues {
    /// Bound as `@input`; also the implicit data of the first step.
    pub input: Value,
    /// Bound as `@options`.
    pub options: Value,
    /// Integration bindings, see [`build_integration_context`](crate::integrations::build_integration_context).
    pub service_context: Map<String, Value>,
    pub root: Option<Value>,
}

impl InitialValues {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_service_context(mut self, service_context: Map<String, Value>) -> Self {
        self.service_context = service_context;
        self
    }

    pub fn with_root(mut self, root: Value) -> Self {
        self.root = Some(root);
        self
    }
}

/// Per-invocation switches for the reducer.
#[derive(Clone)]
pub struct ReduceOptions {
    pub api_version: ApiVersion,
    pub logger: Arc<dyn Logger>,
    pub run_id: RunId,
    /// Validate resolved arguments against the brick's input schema.
    pub validate_input: bool,
    /// Include rendered arguments and outputs in trace records.
    pub log_values: bool,
    /// Report renderers instead of running them.
    pub headless: bool,
    /// Branch path of nested invocations; empty at the top level.
    pub branches: Vec<Branch>,
    /// Extra bindings added on top of the initial context.
    pub extra_context: Map<String, Value>,
}

impl ReduceOptions {
    pub fn new(api_version: ApiVersion) -> Self {
        Self {
            api_version,
            ..Self::default()
        }
    }

    /// Options following the runtime configuration.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            api_version: config.api_version,
            validate_input: config.validate_input,
            log_values: config.log_values,
            ..Self::default()
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn headless(mut self) -> Self {
        self.headless = true;
        self
    }
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            api_version: ApiVersion::default(),
            logger: Arc::new(TracingLogger::default()),
            run_id: RunId::new(),
            validate_input: true,
            log_values: false,
            headless: false,
            branches: Vec::new(),
            extra_context: Map::new(),
        }
    }
}

impl fmt::Debug for ReduceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReduceOptions")
            .field("api_version", &self.api_version)
            .field("logger", self.logger.context())
            .field("run_id", &self.run_id)
            .field("validate_input", &self.validate_input)
            .field("log_values", &self.log_values)
            .field("headless", &self.headless)
            .field("branches", &self.branches)
            .finish()
    }
}
