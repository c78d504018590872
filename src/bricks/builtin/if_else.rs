// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::bricks::{optional_pipeline, parse_args, Brick};
use crate::error::RuntimeResult;
use crate::runtime::ExecutionServices;
use crate::trace::Branch;
use crate::types::{BrickDefinition, BrickKind, InputSchema};

/// Runs the `if` pipeline when the condition holds, otherwise `else`.
pub struct IfElseBrick;

#[derive(Debug, Deserialize)]
struct IfElseArgs {
    #[serde(default)]
    condition: Value,
    #[serde(rename = "if", default)]
    if_pipeline: Option<Value>,
    #[serde(rename = "else", default)]
    else_pipeline: Option<Value>,
}

#[async_trait]
impl Brick for IfElseBrick {
    fn definition(&self) -> BrickDefinition {
        BrickDefinition::new("@pixiebrix/if-else", "If-Else", BrickKind::Transformer)
            .with_description("Run one of two pipelines depending on a condition")
            .with_schema(
                InputSchema::new()
                    .with_property("condition", json!({
                        "description": "Condition; truthiness follows the API version"
                    }))
                    .with_property("if", json!({"type": "object"}))
                    .with_property("else", json!({"type": ["object", "null"]}))
                    .with_required(["condition", "if"]),
            )
    }

    async fn run(&self, args: Value, services: &ExecutionServices) -> RuntimeResult<Value> {
        let args: IfElseArgs = parse_args(&args)?;

        let (key, pipeline) = if services.is_truthy(&args.condition) {
            ("if", optional_pipeline(args.if_pipeline))
        } else {
            ("else", optional_pipeline(args.else_pipeline))
        };

        match pipeline {
            Some(pipeline) => {
                services
                    .run_pipeline(&pipeline, Branch::new(key, 0), &Map::new())
                    .await
            }
            None => Ok(Value::Null),
        }
    }
}
