// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The pipeline reducer.
//!
//! Runs the steps of a pipeline one after another, threading two pieces of
//! state between them:
//!
//! - `previous_output`: the result of the last step without an output key,
//!   starting as the pipeline input. This is the pipeline's return value.
//! - `context`: the `@`-bindings (`@input`, `@options`, integrations and
//!   every `@outputKey` bound so far).
//!
//! Per step the reducer checks the condition, resolves the arguments,
//! validates them, looks the brick up and runs it. Steps never overlap: step
//! `i + 1` starts only after step `i`, including every nested pipeline it
//! ran, has settled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(feature = "telemetry")]
use tracing::Instrument;

use crate::alerts::{dispatch_alert, DeploymentAlert, DeploymentAlerter, LogAlerter};
use crate::api_version::ApiVersionOptions;
use crate::bricks::BrickRegistry;
use crate::config::RuntimeConfig;
use crate::context::ExecutionContext;
use crate::error::{BrickInvocationError, HeadlessModeError, RuntimeError, RuntimeResult, SerializedError};
use crate::evaluator::{map_args, RenderOptions};
use crate::logging::{Logger, MessageContext};
use crate::pipeline::PipelineStep;
#[cfg(feature = "telemetry")]
use crate::telemetry::{BrickSpan, TimedOperation, GLOBAL_METRICS};
use crate::trace::{NoopTraceSink, TracePhase, TraceRecord, TraceSink};
use crate::types::BrickKind;

use super::options::{InitialValues, ReduceOptions};
use super::services::{ExecutionServices, NestedRun, PipelineRunner};
use super::validation::SchemaCache;

enum StepOutcome {
    Skipped,
    Output(Value),
}

/// Everything a step needs from the pipeline it runs in.
struct StepScope<'a> {
    context: &'a ExecutionContext,
    previous_output: &'a Value,
    root: &'a Option<Value>,
    options: &'a ReduceOptions,
    version: &'a ApiVersionOptions,
    render: RenderOptions,
}

/// Executes pipelines against a brick registry.
///
/// Cloning is cheap; clones share the registry, schema cache, trace sink and alerter.
#[derive(Clone)]
pub struct PipelineReducer {
    registry: Arc<dyn BrickRegistry>,
    schemas: Arc<SchemaCache>,
    trace_sink: Arc<dyn TraceSink>,
    alerter: Arc<dyn DeploymentAlerter>,
    alerts_enabled: bool,
    brick_timeout: Option<Duration>,
}

impl PipelineReducer {
    pub fn new(registry: Arc<dyn BrickRegistry>) -> Self {
        Self {
            registry,
            schemas: Arc::new(SchemaCache::new()),
            trace_sink: Arc::new(NoopTraceSink),
            alerter: Arc::new(LogAlerter),
            alerts_enabled: true,
            brick_timeout: None,
        }
    }

    pub fn with_trace_sink(mut self, trace_sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = trace_sink;
        self
    }

    pub fn with_alerter(mut self, alerter: Arc<dyn DeploymentAlerter>) -> Self {
        self.alerter = alerter;
        self
    }

    /// Apply the alert switch and brick timeout of the runtime configuration.
    pub fn with_config(mut self, config: &RuntimeConfig) -> Self {
        self.alerts_enabled = config.alerts;
        self.brick_timeout = config.brick_timeout_ms.map(Duration::from_millis);
        self
    }

    pub fn with_brick_timeout(mut self, timeout: Duration) -> Self {
        self.brick_timeout = Some(timeout);
        self
    }

    /// Run a top-level pipeline and return its final output.
    pub async fn reduce_pipeline(
        &self,
        steps: &[PipelineStep],
        initial: InitialValues,
        options: ReduceOptions,
    ) -> RuntimeResult<Value> {
        #[cfg(feature = "telemetry")]
        let timer = TimedOperation::start("pipeline");

        let InitialValues {
            input,
            options: mod_options,
            service_context,
            root,
        } = initial;

        let mut context = ExecutionContext::new(input.clone(), mod_options);
        context.extend(&service_context);
        context.extend(&options.extra_context);

        debug!(
            run_id = %options.run_id,
            api_version = %options.api_version,
            steps = steps.len(),
            "Running pipeline"
        );

        let result = self.run_steps(steps, context, input, &root, &options).await;

        #[cfg(feature = "telemetry")]
        timer.finish();

        match &result {
            Ok(_) => debug!(run_id = %options.run_id, "Pipeline complete"),
            Err(err) => debug!(run_id = %options.run_id, error = %err, "Pipeline failed"),
        }
        result
    }

    async fn run_steps(
        &self,
        steps: &[PipelineStep],
        mut context: ExecutionContext,
        mut previous_output: Value,
        root: &Option<Value>,
        options: &ReduceOptions,
    ) -> RuntimeResult<Value> {
        let version = options.api_version.options();
        let render = RenderOptions::from(version);

        for (index, step) in steps.iter().enumerate() {
            let scope = StepScope {
                context: &context,
                previous_output: &previous_output,
                root,
                options,
                version,
                render,
            };
            match self.run_step(index, step, scope).await? {
                StepOutcome::Skipped => {}
                StepOutcome::Output(output) => match &step.output_key {
                    Some(key) => context.bind_output(key, output),
                    None => previous_output = output,
                },
            }
        }

        Ok(previous_output)
    }

    async fn run_step(
        &self,
        index: usize,
        step: &PipelineStep,
        scope: StepScope<'_>,
    ) -> RuntimeResult<StepOutcome> {
        let options = scope.options;
        let instance_id = step
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let logger = options.logger.child(MessageContext {
            brick_id: Some(step.id.clone()),
            step_index: Some(index),
            label: step.label.clone(),
            run_id: Some(options.run_id.to_string()),
            ..MessageContext::default()
        });
        let data = scope
            .context
            .template_data(scope.previous_output, scope.version.explicit_data_flow);

        if let Some(condition) = &step.condition {
            let value = map_args(condition, &data, &scope.render)
                .map_err(|err| err.at_step(index, &step.id))?;
            if !scope.version.condition_policy.is_truthy(&value) {
                logger.debug("Skipping step, condition is falsy");
                #[cfg(feature = "telemetry")]
                GLOBAL_METRICS.record_skipped(&step.id);
                self.trace(
                    options,
                    &instance_id,
                    step,
                    index,
                    TracePhase::Exit {
                        output: None,
                        error: None,
                        skipped_run: true,
                    },
                );
                return Ok(StepOutcome::Skipped);
            }
        }

        let args = map_args(&step.config, &data, &scope.render)
            .map_err(|err| err.at_step(index, &step.id))?;

        let brick = self
            .registry
            .lookup(&step.id)
            .await
            .map_err(|err| err.at_step(index, &step.id))?;
        let definition = brick.definition();

        if options.validate_input {
            self.schemas
                .validate(&definition, &args)
                .map_err(|err| err.at_step(index, &step.id))?;
        }

        self.trace(
            options,
            &instance_id,
            step,
            index,
            TracePhase::Enter {
                render_args: options.log_values.then(|| args.clone()),
            },
        );

        if options.headless && definition.kind == BrickKind::Renderer {
            debug!(brick_id = %step.id, "Reached renderer in headless mode");
            let err: RuntimeError = HeadlessModeError {
                brick_id: step.id.clone(),
                args,
                context: data,
                logger_context: logger.context().clone(),
            }
            .into();
            self.trace_error(options, &instance_id, step, index, &err);
            return Err(err);
        }

        let services = ExecutionServices::new(
            scope.context.clone(),
            data.clone(),
            scope.root.clone(),
            options.clone(),
            Arc::new(self.clone()),
        )
        .with_logger(Arc::clone(&logger));

        #[cfg(feature = "telemetry")]
        let span = BrickSpan::start(&step.id, index, options.run_id);

        #[cfg(feature = "telemetry")]
        let result = self
            .with_timeout(&step.id, brick.run(args, &services))
            .instrument(span.span().clone())
            .await;

        #[cfg(not(feature = "telemetry"))]
        let result = self.with_timeout(&step.id, brick.run(args, &services)).await;

        #[cfg(feature = "telemetry")]
        span.finish_with_result(&result);

        match result {
            Ok(output) => {
                self.trace(
                    options,
                    &instance_id,
                    step,
                    index,
                    TracePhase::Exit {
                        output: options.log_values.then(|| output.clone()),
                        error: None,
                        skipped_run: false,
                    },
                );
                Ok(StepOutcome::Output(output))
            }
            Err(err @ RuntimeError::HeadlessMode(_)) => {
                self.trace_error(options, &instance_id, step, index, &err);
                Err(err)
            }
            Err(source) => {
                let err: RuntimeError = BrickInvocationError {
                    brick_id: step.id.clone(),
                    step_index: index,
                    output_key: step.output_key.as_ref().map(ToString::to_string),
                    label: step.label.clone(),
                    context: data,
                    source,
                }
                .into();
                let serialized = self.trace_error(options, &instance_id, step, index, &err);
                logger.error(&err.to_string(), Some(&serialized.to_value()));

                if step.alerts_on_error() {
                    self.alert(logger.as_ref(), step, index, serialized);
                }
                Err(err)
            }
        }
    }

    async fn with_timeout<F>(&self, brick_id: &str, run: F) -> RuntimeResult<Value>
    where
        F: Future<Output = RuntimeResult<Value>>,
    {
        match self.brick_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.unwrap_or_else(|_| {
                Err(RuntimeError::execution(format!(
                    "Brick {brick_id} timed out after {}ms",
                    limit.as_millis()
                )))
            }),
            None => run.await,
        }
    }

    fn alert(&self, logger: &dyn Logger, step: &PipelineStep, index: usize, error: SerializedError) {
        if !self.alerts_enabled {
            return;
        }
        let Some(deployment_id) = logger.context().deployment_id.clone() else {
            return;
        };
        dispatch_alert(
            Arc::clone(&self.alerter),
            DeploymentAlert {
                deployment_id,
                brick_id: step.id.clone(),
                step_index: index,
                error,
                message_context: logger.context().clone(),
                timestamp: Utc::now(),
            },
        );
    }

    fn trace(
        &self,
        options: &ReduceOptions,
        instance_id: &str,
        step: &PipelineStep,
        index: usize,
        phase: TracePhase,
    ) {
        self.trace_sink.record(TraceRecord {
            run_id: options.run_id,
            instance_id: instance_id.to_string(),
            brick_id: step.id.clone(),
            step_index: index,
            branches: options.branches.clone(),
            timestamp: Utc::now(),
            phase,
        });
    }

    fn trace_error(
        &self,
        options: &ReduceOptions,
        instance_id: &str,
        step: &PipelineStep,
        index: usize,
        err: &RuntimeError,
    ) -> SerializedError {
        let serialized = SerializedError::from(err);
        if matches!(err, RuntimeError::HeadlessMode(_)) {
            debug!(brick_id = %step.id, "Stopping at renderer");
        } else {
            warn!(brick_id = %step.id, step_index = index, error = %err, "Step failed");
        }
        self.trace(
            options,
            instance_id,
            step,
            index,
            TracePhase::Exit {
                output: None,
                error: Some(serialized.clone()),
                skipped_run: false,
            },
        );
        serialized
    }
}

#[async_trait]
impl PipelineRunner for PipelineReducer {
    async fn run_nested(&self, run: NestedRun) -> RuntimeResult<Value> {
        let NestedRun {
            steps,
            context,
            root,
            options,
        } = run;
        self.run_steps(&steps, context, Value::Object(Map::new()), &root, &options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::MockDeploymentAlerter;
    use crate::api_version::ApiVersion;
    use crate::bricks::{Brick, BrickRegistryBuilder, InMemoryBrickRegistry, MockBrickRegistry};
    use crate::error::{ErrorKind, StepLocation};
    use crate::logging::{MemoryLogger, MessageContext};
    use crate::pipeline::parse_pipeline;
    use crate::trace::MemoryTraceSink;
    use crate::types::{BrickDefinition, InputSchema};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns its arguments and counts invocations.
    #[derive(Default)]
    struct EchoBrick {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Brick for EchoBrick {
        fn definition(&self) -> BrickDefinition {
            BrickDefinition::new("@test/echo", "Echo", BrickKind::Transformer).with_schema(
                InputSchema::new()
                    .with_property("message", json!({"type": "string"}))
                    .with_required(["message"]),
            )
        }

        async fn run(&self, args: Value, _services: &ExecutionServices) -> RuntimeResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(args)
        }
    }

    struct FailBrick;

    #[async_trait]
    impl Brick for FailBrick {
        fn definition(&self) -> BrickDefinition {
            BrickDefinition::new("@test/fail", "Fail", BrickKind::Effect)
        }

        async fn run(&self, _args: Value, _services: &ExecutionServices) -> RuntimeResult<Value> {
            Err(RuntimeError::business("No element selected"))
        }
    }

    struct SlowBrick;

    #[async_trait]
    impl Brick for SlowBrick {
        fn definition(&self) -> BrickDefinition {
            BrickDefinition::new("@test/slow", "Slow", BrickKind::Effect)
        }

        async fn run(&self, _args: Value, _services: &ExecutionServices) -> RuntimeResult<Value> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Value::Null)
        }
    }

    struct RootBrick;

    #[async_trait]
    impl Brick for RootBrick {
        fn definition(&self) -> BrickDefinition {
            BrickDefinition::new("@test/root", "Root", BrickKind::Reader)
        }

        async fn run(&self, _args: Value, services: &ExecutionServices) -> RuntimeResult<Value> {
            Ok(services.root.clone().unwrap_or(Value::Null))
        }
    }

    fn setup() -> (PipelineReducer, Arc<EchoBrick>) {
        let echo = Arc::new(EchoBrick::default());
        let mut builder = BrickRegistryBuilder::new();
        builder
            .with_builtins()
            .register_boxed(echo.clone())
            .register(FailBrick)
            .register(SlowBrick)
            .register(RootBrick);
        let registry: InMemoryBrickRegistry = builder.build();
        (PipelineReducer::new(Arc::new(registry)), echo)
    }

    fn steps(value: Value) -> Vec<PipelineStep> {
        parse_pipeline(&value).unwrap()
    }

    #[tokio::test]
    async fn test_v1_implicit_data_flow_scenario() {
        let (reducer, _) = setup();
        let pipeline = steps(json!([
            {"id": "@test/echo", "outputKey": "foo", "config": {"message": "{{inputArg}}"}},
            {"id": "@test/echo", "config": {"message": "hello, {{@foo.message}}"}}
        ]));

        let result = reducer
            .reduce_pipeline(
                &pipeline,
                InitialValues::new(json!({"inputArg": "bar"})),
                ReduceOptions::new(ApiVersion::V1),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"message": "hello, bar"}));
    }

    #[tokio::test]
    async fn test_untagged_step_output_is_not_merged_with_input() {
        let (reducer, _) = setup();
        let pipeline = steps(json!([{"id": "@test/echo", "config": {"message": "x"}}]));

        let result = reducer
            .reduce_pipeline(&pipeline, InitialValues::new(json!({"other": 1})), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(result, json!({"message": "x"}));
    }

    #[tokio::test]
    async fn test_output_key_binds_without_touching_input() {
        let (reducer, _) = setup();
        let pipeline = steps(json!([
            {"id": "@test/echo", "outputKey": "first", "config": {"message": "one"}},
            {"id": "@pixiebrix/identity", "config": {
                "first": {"__type__": "var", "__value__": "@first"},
                "input": {"__type__": "var", "__value__": "@input"},
                "options": {"__type__": "var", "__value__": "@options"}
            }}
        ]));

        let result = reducer
            .reduce_pipeline(
                &pipeline,
                InitialValues::new(json!({"x": 1})).with_options(json!({"mode": "fast"})),
                ReduceOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            result,
            json!({"first": {"message": "one"}, "input": {"x": 1}, "options": {"mode": "fast"}})
        );
    }

    #[tokio::test]
    async fn test_empty_pipeline_returns_input() {
        let (reducer, _) = setup();
        let result = reducer
            .reduce_pipeline(&[], InitialValues::new(json!({"x": 1})), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_invalid_input_never_runs_brick() {
        let (reducer, echo) = setup();
        let pipeline = steps(json!([{"id": "@test/echo", "config": {"message": 42}}]));

        let err = reducer
            .reduce_pipeline(&pipeline, InitialValues::default(), ReduceOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
        assert!(err.to_string().contains("step 0 (@test/echo)"));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_can_be_disabled() {
        let (reducer, echo) = setup();
        let pipeline = steps(json!([{"id": "@test/echo", "config": {"message": 42}}]));
        let options = ReduceOptions {
            validate_input: false,
            ..ReduceOptions::default()
        };

        reducer
            .reduce_pipeline(&pipeline, InitialValues::default(), options)
            .await
            .unwrap();
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_legacy_condition_skips_rendered_false() {
        let (reducer, echo) = setup();
        let pipeline = steps(json!([
            {"id": "@test/echo", "if": "{{@input.enabled}}", "config": {"message": "ran"}}
        ]));

        let result = reducer
            .reduce_pipeline(
                &pipeline,
                InitialValues::new(json!({"enabled": false})),
                ReduceOptions::new(ApiVersion::V2),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"enabled": false}));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_strict_condition_policy() {
        let (reducer, echo) = setup();
        let pipeline = steps(json!([
            {"id": "@test/echo", "if": "false", "outputKey": "a", "config": {"message": "string"}},
            {"id": "@test/echo", "if": {"__type__": "var", "__value__": "@input.enabled"}, "config": {"message": "var"}}
        ]));

        reducer
            .reduce_pipeline(
                &pipeline,
                InitialValues::new(json!({"enabled": false})),
                ReduceOptions::new(ApiVersion::V3),
            )
            .await
            .unwrap();
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_brick_stops_pipeline() {
        let (reducer, echo) = setup();
        let pipeline = steps(json!([
            {"id": "@test/missing", "config": {}},
            {"id": "@test/echo", "config": {"message": "never"}}
        ]));

        let err = reducer
            .reduce_pipeline(&pipeline, InitialValues::default(), ReduceOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrickNotFound);
        assert!(err.to_string().contains("step 0 (@test/missing)"));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_brick_reports_step_location() {
        let (reducer, _) = setup();
        let pipeline = steps(json!([
            {"id": "@pixiebrix/identity", "config": {"a": 1}},
            {"id": "@test/missing", "outputKey": "x", "config": {}}
        ]));

        let err = reducer
            .reduce_pipeline(&pipeline, InitialValues::default(), ReduceOptions::default())
            .await
            .unwrap_err();

        match &err {
            RuntimeError::BrickNotFound { brick_id, step } => {
                assert_eq!(brick_id, "@test/missing");
                assert_eq!(
                    step.as_ref(),
                    Some(&StepLocation {
                        step_index: 1,
                        brick_id: "@test/missing".to_string(),
                    })
                );
            }
            other => panic!("expected BrickNotFound, got {other:?}"),
        }
        assert!(err.to_string().contains("step 1 (@test/missing)"));
    }

    #[tokio::test]
    async fn test_root_reaches_top_level_and_nested_bricks() {
        let (reducer, _) = setup();
        let pipeline = steps(json!([
            {"id": "@test/root", "outputKey": "top"},
            {"id": "@pixiebrix/for", "outputKey": "nested", "config": {
                "elements": [1],
                "body": {"__type__": "pipeline", "__value__": [{"id": "@test/root"}]}
            }},
            {"id": "@pixiebrix/identity", "config": {
                "top": {"__type__": "var", "__value__": "@top"},
                "nested": {"__type__": "var", "__value__": "@nested"}
            }}
        ]));

        let result = reducer
            .reduce_pipeline(
                &pipeline,
                InitialValues::default().with_root(json!({"selector": "#app"})),
                ReduceOptions::new(ApiVersion::V3),
            )
            .await
            .unwrap();
        assert_eq!(
            result,
            json!({"top": {"selector": "#app"}, "nested": {"selector": "#app"}})
        );
    }

    #[tokio::test]
    async fn test_input_schemas_compile_once_per_brick() {
        let (reducer, echo) = setup();
        let pipeline = steps(json!([
            {"id": "@test/echo", "config": {"message": "one"}},
            {"id": "@test/echo", "config": {"message": "two"}},
            {"id": "@pixiebrix/for", "config": {
                "elements": [1, 2],
                "body": {"__type__": "pipeline", "__value__": [
                    {"id": "@test/echo", "config": {"message": "nested"}}
                ]}
            }}
        ]));

        reducer
            .reduce_pipeline(&pipeline, InitialValues::default(), ReduceOptions::new(ApiVersion::V3))
            .await
            .unwrap();
        assert_eq!(echo.calls.load(Ordering::SeqCst), 4);
        assert_eq!(reducer.schemas.len(), 2);
    }

    #[tokio::test]
    async fn test_run_failure_is_wrapped() {
        let (reducer, _) = setup();
        let pipeline = steps(json!([{"id": "@test/fail", "outputKey": "result", "config": {}}]));

        let err = reducer
            .reduce_pipeline(&pipeline, InitialValues::new(json!({"x": 1})), ReduceOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrickInvocation);
        assert!(err.is_business());
        assert!(err.cause_chain().iter().any(|m| m == "No element selected"));
        match err {
            RuntimeError::BrickInvocation(wrapped) => {
                assert_eq!(wrapped.brick_id, "@test/fail");
                assert_eq!(wrapped.step_index, 0);
                assert_eq!(wrapped.output_key.as_deref(), Some("result"));
                assert_eq!(wrapped.context["@input"], json!({"x": 1}));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_template_error_names_field_and_step() {
        let (reducer, _) = setup();
        let pipeline = steps(json!([
            {"id": "@pixiebrix/identity", "config": {"greeting": {"__type__": "mustache", "__value__": "{{#open}}"}}}
        ]));

        let err = reducer
            .reduce_pipeline(&pipeline, InitialValues::default(), ReduceOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateRender);
        let message = err.to_string();
        assert!(message.contains("greeting"));
        assert!(message.contains("step 0"));
    }

    #[tokio::test]
    async fn test_alert_sent_for_deployment() {
        let (reducer, _) = setup();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut alerter = MockDeploymentAlerter::new();
        alerter.expect_alert().times(1).returning(move |alert| {
            let _ = tx.send(alert);
            Ok(())
        });
        let reducer = reducer.with_alerter(Arc::new(alerter));
        let pipeline = steps(json!([{"id": "@test/fail", "onError": {"alert": true}, "config": {}}]));
        let logger = Arc::new(MemoryLogger::new(MessageContext::for_deployment("dep-1")));

        let result = reducer
            .reduce_pipeline(
                &pipeline,
                InitialValues::default(),
                ReduceOptions::default().with_logger(logger.clone()),
            )
            .await;
        assert!(result.is_err());

        let alert = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.deployment_id, "dep-1");
        assert_eq!(alert.brick_id, "@test/fail");
        assert_eq!(alert.error.kind, ErrorKind::BrickInvocation);
        assert!(logger.records().iter().any(|r| r.level == crate::logging::LogLevel::Error));
    }

    #[tokio::test]
    async fn test_no_alert_without_deployment_or_flag() {
        let (reducer, _) = setup();
        let mut alerter = MockDeploymentAlerter::new();
        alerter.expect_alert().never();
        let reducer = reducer.with_alerter(Arc::new(alerter));

        let flagged = steps(json!([{"id": "@test/fail", "onError": {"alert": true}, "config": {}}]));
        assert!(reducer
            .reduce_pipeline(&flagged, InitialValues::default(), ReduceOptions::default())
            .await
            .is_err());

        let unflagged = steps(json!([{"id": "@test/fail", "config": {}}]));
        let logger = Arc::new(MemoryLogger::new(MessageContext::for_deployment("dep-1")));
        assert!(reducer
            .reduce_pipeline(
                &unflagged,
                InitialValues::default(),
                ReduceOptions::default().with_logger(logger),
            )
            .await
            .is_err());
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn test_headless_renderer_is_reported_not_run() {
        let (reducer, _) = setup();
        let pipeline = steps(json!([
            {"id": "@pixiebrix/html", "config": {"html": "<b>{{@input.name}}</b>"}}
        ]));

        let err = reducer
            .reduce_pipeline(
                &pipeline,
                InitialValues::new(json!({"name": "Ada"})),
                ReduceOptions::new(ApiVersion::V2).headless(),
            )
            .await
            .unwrap_err();
        match err {
            RuntimeError::HeadlessMode(headless) => {
                assert_eq!(headless.brick_id, "@pixiebrix/html");
                assert_eq!(headless.args, json!({"html": "<b>Ada</b>"}));
                assert_eq!(headless.logger_context.step_index, Some(0));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_trace_records_enter_and_exit() {
        let (reducer, _) = setup();
        let sink = Arc::new(MemoryTraceSink::new());
        let reducer = reducer.with_trace_sink(sink.clone());
        let pipeline = steps(json!([
            {"id": "@test/echo", "instanceId": "step-a", "config": {"message": "a"}},
            {"id": "@test/echo", "if": false, "config": {"message": "b"}}
        ]));
        let options = ReduceOptions {
            log_values: true,
            ..ReduceOptions::default()
        };
        let run_id = options.run_id;

        reducer
            .reduce_pipeline(&pipeline, InitialValues::default(), options)
            .await
            .unwrap();

        let records = sink.for_run(run_id);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].instance_id, "step-a");
        assert_eq!(
            records[0].phase,
            TracePhase::Enter {
                render_args: Some(json!({"message": "a"}))
            }
        );
        assert!(records[1].is_exit());
        assert!(!records[1].is_skipped());
        assert!(records[2].is_skipped());
        assert_eq!(records[2].step_index, 1);
    }

    #[tokio::test]
    async fn test_brick_timeout() {
        let (reducer, _) = setup();
        let reducer = reducer.with_brick_timeout(Duration::from_millis(5));
        let pipeline = steps(json!([{"id": "@test/slow", "config": {}}]));

        let err = reducer
            .reduce_pipeline(&pipeline, InitialValues::default(), ReduceOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrickInvocation);
        assert_eq!(err.root_cause().kind(), ErrorKind::Execution);
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_registry_lookup_is_consulted_per_step() {
        let echo: Arc<dyn Brick> = Arc::new(EchoBrick::default());
        let mut registry = MockBrickRegistry::new();
        registry
            .expect_lookup()
            .withf(|id| id == "@test/echo")
            .times(2)
            .returning(move |_| Ok(Arc::clone(&echo)));
        let reducer = PipelineReducer::new(Arc::new(registry));
        let pipeline = steps(json!([
            {"id": "@test/echo", "config": {"message": "a"}},
            {"id": "@test/echo", "config": {"message": "b"}}
        ]));

        let result = reducer
            .reduce_pipeline(&pipeline, InitialValues::default(), ReduceOptions::default())
            .await
            .unwrap();
        assert_eq!(result, json!({"message": "b"}));
    }
}
