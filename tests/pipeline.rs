// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end pipeline behavior through the public API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use serde_json::{json, Map, Value};

use brick_runtime::alerts::{AlertError, DeploymentAlert, DeploymentAlerter};
use brick_runtime::api_version::ApiVersion;
use brick_runtime::bricks::{Brick, BrickRegistryBuilder};
use brick_runtime::error::{ErrorKind, RuntimeResult};
use brick_runtime::evaluator::{map_args, RenderOptions};
use brick_runtime::expression::ArgNode;
use brick_runtime::integrations::{
    build_integration_context, IntegrationDependency, IntegrationLocator, SanitizedIntegrationConfig,
};
use brick_runtime::logging::{MemoryLogger, MessageContext};
use brick_runtime::pipeline::{parse_pipeline, OutputKey, PipelineStep};
use brick_runtime::runtime::{ExecutionServices, InitialValues, PipelineReducer, ReduceOptions};
use brick_runtime::types::{BrickDefinition, BrickKind, InputSchema};

mock! {
    pub SpyBrick {}

    #[async_trait]
    impl Brick for SpyBrick {
        fn definition(&self) -> BrickDefinition;
        async fn run(&self, args: Value, services: &ExecutionServices) -> RuntimeResult<Value>;
    }
}

mock! {
    pub Locator {}

    #[async_trait]
    impl IntegrationLocator for Locator {
        async fn locate(&self, integration_id: &str, config_id: &str) -> RuntimeResult<SanitizedIntegrationConfig>;
    }
}

mock! {
    pub Alerter {}

    #[async_trait]
    impl DeploymentAlerter for Alerter {
        async fn alert(&self, alert: DeploymentAlert) -> Result<(), AlertError>;
    }
}

fn echo_definition() -> BrickDefinition {
    BrickDefinition::new("@test/echo", "Echo", BrickKind::Transformer).with_schema(
        InputSchema::new()
            .with_property("message", json!({"type": "string"}))
            .with_required(["message"]),
    )
}

/// A spy echo brick expected to run exactly `calls` times.
fn spy_echo(calls: usize) -> MockSpyBrick {
    let mut spy = MockSpyBrick::new();
    spy.expect_definition().returning(echo_definition);
    spy.expect_run().times(calls).returning(|args, _| Ok(args));
    spy
}

fn reducer_with(brick: MockSpyBrick) -> PipelineReducer {
    let mut builder = BrickRegistryBuilder::new();
    builder.with_builtins().register(brick);
    PipelineReducer::new(Arc::new(builder.build()))
}

fn steps(value: Value) -> Vec<PipelineStep> {
    parse_pipeline(&value).unwrap()
}

#[tokio::test]
async fn v1_scenario_threads_output_keys_and_implicit_input() {
    let reducer = reducer_with(spy_echo(2));
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
async fn bare_strings_render_only_before_v3() {
    let data = json!({"@input": {"x": "a & b"}});
    let node = ArgNode::parse(&json!({"value": "{{ @input.x }}"})).unwrap();

    for version in [ApiVersion::V1, ApiVersion::V2] {
        let value = map_args(&node, &data, &RenderOptions::for_version(version)).unwrap();
        assert_eq!(value, json!({"value": "a &amp; b"}), "{version}");
    }

    let value = map_args(&node, &data, &RenderOptions::for_version(ApiVersion::V3)).unwrap();
    assert_eq!(value, json!({"value": "{{ @input.x }}"}));

    let explicit = ArgNode::parse(&json!({
        "value": {"__type__": "mustache", "__value__": "{{ @input.x }}"}
    }))
    .unwrap();
    let value = map_args(&explicit, &data, &RenderOptions::for_version(ApiVersion::V3)).unwrap();
    assert_eq!(value, json!({"value": "a & b"}));
}

#[tokio::test]
async fn resolved_values_are_returned_unchanged() {
    let plain = json!({"a": [1, {"b": null}], "c": true, "d": "text"});
    let node = ArgNode::parse(&plain).unwrap();
    for version in ApiVersion::ALL {
        let value = map_args(&node, &json!({}), &RenderOptions::for_version(version)).unwrap();
        assert_eq!(value, plain);
    }
}

#[tokio::test]
async fn untagged_last_step_returns_its_raw_output() {
    let reducer = reducer_with(spy_echo(1));
    let pipeline = steps(json!([{"id": "@test/echo", "config": {"message": "only"}}]));

    let result = reducer
        .reduce_pipeline(
            &pipeline,
            InitialValues::new(json!({"unrelated": 1})),
            ReduceOptions::new(ApiVersion::V3),
        )
        .await
        .unwrap();

    assert_eq!(result, json!({"message": "only"}));
}

#[tokio::test]
async fn output_key_binding_leaves_input_and_options_untouched() {
    let mut spy = MockSpyBrick::new();
    spy.expect_definition()
        .returning(|| BrickDefinition::new("@test/context", "Context", BrickKind::Reader));
    spy.expect_run()
        .times(1)
        .returning(|_, services| Ok(services.ctxt.to_value()));
    let reducer = reducer_with(spy);

    let pipeline = steps(json!([
        {"id": "@pixiebrix/identity", "outputKey": "first", "config": {"n": 1}},
        {"id": "@test/context", "config": {}}
    ]));
    let context = reducer
        .reduce_pipeline(
            &pipeline,
            InitialValues::new(json!({"x": 1})).with_options(json!({"mode": "fast"})),
            ReduceOptions::new(ApiVersion::V3),
        )
        .await
        .unwrap();

    assert_eq!(context["@first"], json!({"n": 1}));
    assert_eq!(context["@input"], json!({"x": 1}));
    assert_eq!(context["@options"], json!({"mode": "fast"}));
}

#[tokio::test]
async fn integration_config_properties_are_hoisted() {
    let mut locator = MockLocator::new();
    locator
        .expect_locate()
        .withf(|id, config| id == "@acme/api" && config == "cfg-1")
        .times(1)
        .returning(|id, config| {
            let mut values = Map::new();
            values.insert("prop".to_string(), json!("abc123"));
            Ok(SanitizedIntegrationConfig::new(id, config, values))
        });

    let dependencies = vec![
        IntegrationDependency::new("@acme/api", OutputKey::new("service").unwrap()).with_config_id("cfg-1"),
    ];
    let service_context = build_integration_context(&dependencies, &locator).await.unwrap();

    let reducer = reducer_with(spy_echo(0));
    let pipeline = steps(json!([{
        "id": "@pixiebrix/identity",
        "config": {
            "prop": {"__type__": "var", "__value__": "@service.prop"},
            "integration": {"__type__": "var", "__value__": "@service.__service.integrationId"}
        }
    }]));
    let result = reducer
        .reduce_pipeline(
            &pipeline,
            InitialValues::default().with_service_context(service_context),
            ReduceOptions::new(ApiVersion::V3),
        )
        .await
        .unwrap();

    assert_eq!(result, json!({"prop": "abc123", "integration": "@acme/api"}));
}

#[tokio::test]
async fn missing_integration_config_fails_before_running() {
    let mut locator = MockLocator::new();
    locator.expect_locate().returning(|id, config| {
        Err(brick_runtime::RuntimeError::IntegrationNotFound {
            integration_id: id.to_string(),
            config_id: config.to_string(),
        })
    });

    let dependencies = vec![
        IntegrationDependency::new("@acme/api", OutputKey::new("service").unwrap()).with_config_id("gone"),
    ];
    let err = build_integration_context(&dependencies, &locator).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrationNotFound);
}

#[tokio::test]
async fn business_error_is_wrapped_and_not_alerted_by_default() {
    let mut alerter = MockAlerter::new();
    alerter.expect_alert().never();
    let reducer = reducer_with(spy_echo(0)).with_alerter(Arc::new(alerter));

    let pipeline = steps(json!([
        {"id": "@pixiebrix/error", "config": {"message": "No element selected"}}
    ]));
    let logger = Arc::new(MemoryLogger::new(MessageContext::for_deployment("dep-1")));
    let err = reducer
        .reduce_pipeline(
            &pipeline,
            InitialValues::default(),
            ReduceOptions::new(ApiVersion::V3).with_logger(logger),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BrickInvocation);
    assert!(err.root_cause().is_business());
    assert!(err
        .cause_chain()
        .iter()
        .any(|message| message.contains("No element selected")));
    tokio::task::yield_now().await;
}

#[tokio::test]
async fn flagged_failure_alerts_the_deployment() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut alerter = MockAlerter::new();
    alerter.expect_alert().times(1).returning(move |alert| {
        let _ = tx.send(alert);
        Err(AlertError("alert endpoint unavailable".to_string()))
    });
    let reducer = reducer_with(spy_echo(0)).with_alerter(Arc::new(alerter));

    let pipeline = steps(json!([{
        "id": "@pixiebrix/error",
        "onError": {"alert": true},
        "config": {"message": "No element selected"}
    }]));
    let logger = Arc::new(MemoryLogger::new(MessageContext::for_deployment("dep-7")));
    let err = reducer
        .reduce_pipeline(
            &pipeline,
            InitialValues::default(),
            ReduceOptions::new(ApiVersion::V3).with_logger(logger),
        )
        .await
        .unwrap_err();

    // The failed alert never replaces the brick's error.
    assert_eq!(err.kind(), ErrorKind::BrickInvocation);
    let alert = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alert.deployment_id, "dep-7");
    assert_eq!(alert.step_index, 0);
}

#[tokio::test]
async fn schema_violation_prevents_invocation() {
    let reducer = reducer_with(spy_echo(0));
    let pipeline = steps(json!([{
        "id": "@test/echo",
        "config": {"message": {"__type__": "var", "__value__": "@input.count"}}
    }]));

    let err = reducer
        .reduce_pipeline(
            &pipeline,
            InitialValues::new(json!({"count": 42})),
            ReduceOptions::new(ApiVersion::V3),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InputValidation);
}

#[tokio::test]
async fn unknown_brick_stops_before_later_steps() {
    let reducer = reducer_with(spy_echo(0));
    let pipeline = steps(json!([
        {"id": "@pixiebrix/identity", "config": {}},
        {"id": "@acme/missing", "outputKey": "x", "config": {}},
        {"id": "@test/echo", "config": {"message": "never"}}
    ]));

    let err = reducer
        .reduce_pipeline(&pipeline, InitialValues::default(), ReduceOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrickNotFound);

    let message = err.to_string();
    assert!(message.contains("@acme/missing"), "{message}");
    assert!(message.contains("step 1"), "{message}");
}

#[tokio::test]
async fn condition_policies_differ_between_versions() {
    let pipeline = |condition: Value| {
        steps(json!([
            {"id": "@pixiebrix/identity", "outputKey": "ran", "if": condition, "config": {"yes": true}},
            {"id": "@pixiebrix/identity", "config": {
                "ran": {"__type__": "var", "__value__": "@ran"}
            }}
        ]))
    };
    let reducer = reducer_with(spy_echo(0));

    let legacy = reducer
        .reduce_pipeline(
            &pipeline(json!("{{ @input.flag }}")),
            InitialValues::new(json!({"flag": false})),
            ReduceOptions::new(ApiVersion::V2),
        )
        .await
        .unwrap();
    assert_eq!(legacy, json!({}));

    let strict_string = reducer
        .reduce_pipeline(
            &pipeline(json!("false")),
            InitialValues::default(),
            ReduceOptions::new(ApiVersion::V3),
        )
        .await
        .unwrap();
    assert_eq!(strict_string, json!({"ran": {"yes": true}}));

    let strict_var = reducer
        .reduce_pipeline(
            &pipeline(json!({"__type__": "var", "__value__": "@input.flag"})),
            InitialValues::new(json!({"flag": false})),
            ReduceOptions::new(ApiVersion::V3),
        )
        .await
        .unwrap();
    assert_eq!(strict_var, json!({}));
}

#[tokio::test]
async fn try_except_recovers_from_raised_error() {
    let reducer = reducer_with(spy_echo(0));
    let pipeline = steps(json!([{
        "id": "@pixiebrix/try-except",
        "config": {
            "try": {"__type__": "pipeline", "__value__": [
                {"id": "@pixiebrix/error", "config": {"message": "boom"}}
            ]},
            "except": {"__type__": "pipeline", "__value__": [
                {"id": "@pixiebrix/identity", "config": {
                    "recovered": {"__type__": "var", "__value__": "@error.message"}
                }}
            ]}
        }
    }]));

    let result = reducer
        .reduce_pipeline(&pipeline, InitialValues::default(), ReduceOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!({"recovered": "boom"}));
}

#[tokio::test]
async fn for_loop_binds_each_element() {
    let mut spy = MockSpyBrick::new();
    spy.expect_definition().returning(echo_definition);
    let mut sequence = mockall::Sequence::new();
    for expected in ["a", "b", "c"] {
        spy.expect_run()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(move |args, services| {
                args["message"] == json!(expected) && services.ctxt.get("@element") == Some(&json!(expected))
            })
            .returning(|args, _| Ok(args));
    }
    let reducer = reducer_with(spy);

    let pipeline = steps(json!([{
        "id": "@pixiebrix/for",
        "config": {
            "elements": {"__type__": "var", "__value__": "@input.items"},
            "body": {"__type__": "pipeline", "__value__": [
                {"id": "@test/echo", "config": {
                    "message": {"__type__": "var", "__value__": "@element"}
                }}
            ]}
        }
    }]));

    let result = reducer
        .reduce_pipeline(
            &pipeline,
            InitialValues::new(json!({"items": ["a", "b", "c"]})),
            ReduceOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({"message": "c"}));
}
