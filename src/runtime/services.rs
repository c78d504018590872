// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Services handed to a brick while it runs.
//!
//! Control-flow bricks never call the reducer directly. They ask their
//! [`ExecutionServices`] to run a nested pipeline, and the services forward
//! the request to whatever [`PipelineRunner`] the reducer installed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::api_version::{ApiVersion, ConditionPolicy};
use crate::context::ExecutionContext;
use crate::error::{HeadlessModeError, RuntimeError, RuntimeResult};
use crate::evaluator::{self, RenderOptions};
use crate::expression::{ArgNode, Expression, TYPE_KEY};
use crate::logging::{Logger, MessageContext};
use crate::pipeline::{parse_pipeline, PipelineStep};
use crate::telemetry::RunId;
use crate::trace::Branch;

use super::options::ReduceOptions;

/// A nested pipeline to run on behalf of a brick.
pub struct NestedRun {
    pub steps: Vec<PipelineStep>,
    /// Context the nested pipeline starts from.
    pub context: ExecutionContext,
    pub root: Option<Value>,
    pub options: ReduceOptions,
}

/// Runs nested pipelines; implemented by the reducer.
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    async fn run_nested(&self, run: NestedRun) -> RuntimeResult<Value>;
}

/// A renderer reached by a headless pipeline, ready for the caller to run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererPayload {
    pub brick_id: String,
    pub args: Value,
    pub context: Value,
    pub logger_context: MessageContext,
    pub run_id: RunId,
}

impl RendererPayload {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Extract the steps of a pipeline argument.
///
/// Accepts the wire form of a `pipeline` expression as well as a bare step
/// or list of steps.
pub fn pipeline_steps(value: &Value) -> RuntimeResult<Vec<PipelineStep>> {
    match value {
        Value::Object(map) if map.contains_key(TYPE_KEY) => match ArgNode::parse(value)? {
            ArgNode::Expression(Expression::Pipeline(steps)) => Ok(steps),
            ArgNode::Expression(other) => Err(RuntimeError::configuration(format!(
                "Expected a pipeline, got a {} expression",
                other.type_name().unwrap_or("literal")
            ))),
            _ => Err(RuntimeError::configuration("Expected a pipeline")),
        },
        other => parse_pipeline(other),
    }
}

/// The services bag passed to [`Brick::run`](crate::bricks::Brick::run).
pub struct ExecutionServices {
    /// Context snapshot of the running step.
    pub ctxt: ExecutionContext,
    pub logger: Arc<dyn Logger>,
    /// Host element the mod runs against, if any.
    pub root: Option<Value>,
    pub run_id: RunId,
    pub api_version: ApiVersion,
    template_data: Value,
    options: ReduceOptions,
    runner: Arc<dyn PipelineRunner>,
}

impl fmt::Debug for ExecutionServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionServices")
            .field("ctxt", &self.ctxt)
            .field("root", &self.root)
            .field("run_id", &self.run_id)
            .field("api_version", &self.api_version)
            .field("branches", &self.options.branches)
            .finish_non_exhaustive()
    }
}

impl ExecutionServices {
    /// Services for a step whose templates see `template_data`.
    pub fn new(
        ctxt: ExecutionContext,
        template_data: Value,
        root: Option<Value>,
        options: ReduceOptions,
        runner: Arc<dyn PipelineRunner>,
    ) -> Self {
        Self {
            ctxt,
            logger: Arc::clone(&options.logger),
            root,
            run_id: options.run_id,
            api_version: options.api_version,
            template_data,
            options,
            runner,
        }
    }

    /// Replace the logger (the reducer installs a per-step child).
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Branch path leading to the running step.
    pub fn branches(&self) -> &[Branch] {
        &self.options.branches
    }

    pub fn condition_policy(&self) -> ConditionPolicy {
        self.api_version.options().condition_policy
    }

    /// Truthiness of a condition under the active API version.
    pub fn is_truthy(&self, value: &Value) -> bool {
        self.condition_policy().is_truthy(value)
    }

    fn nested(&self, pipeline: &Value, branch: Branch, extra: &Map<String, Value>, headless: bool) -> RuntimeResult<NestedRun> {
        let steps = pipeline_steps(pipeline)?;
        let mut options = self.options.clone();
        options.logger = Arc::clone(&self.logger);
        options.headless = headless;
        options.extra_context = Map::new();
        options.branches.push(branch);
        Ok(NestedRun {
            steps,
            context: self.ctxt.derive(extra),
            root: self.root.clone(),
            options,
        })
    }

    /// Run a nested pipeline with `extra` bound on top of the step's context.
    pub async fn run_pipeline(
        &self,
        pipeline: &Value,
        branch: Branch,
        extra: &Map<String, Value>,
    ) -> RuntimeResult<Value> {
        let run = self.nested(pipeline, branch, extra, false)?;
        self.runner.run_nested(run).await
    }

    /// Run a nested pipeline headless and capture the renderer it reaches.
    pub async fn run_renderer_pipeline(
        &self,
        pipeline: &Value,
        branch: Branch,
        extra: &Map<String, Value>,
    ) -> RuntimeResult<RendererPayload> {
        let run = self.nested(pipeline, branch, extra, true)?;
        match self.runner.run_nested(run).await {
            Err(RuntimeError::HeadlessMode(err)) => {
                let HeadlessModeError {
                    brick_id,
                    args,
                    context,
                    logger_context,
                } = *err;
                Ok(RendererPayload {
                    brick_id,
                    args,
                    context,
                    logger_context,
                    run_id: self.run_id,
                })
            }
            Err(err) => Err(err),
            Ok(_) => Err(RuntimeError::business(
                "Pipeline does not include a renderer brick",
            )),
        }
    }

    /// Evaluate a deferred expression with `extra` bound (e.g. `@element`).
    pub fn evaluate_deferred(&self, value: &Value, extra: &Map<String, Value>) -> RuntimeResult<Value> {
        let options = RenderOptions::for_version(self.api_version);
        evaluator::evaluate_deferred(value, &self.template_data, extra, &options)
    }
}
