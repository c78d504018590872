// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::bricks::{optional_pipeline, parse_args, Brick};
use crate::error::{RuntimeError, RuntimeResult, SerializedError};
use crate::pipeline::OutputKey;
use crate::runtime::ExecutionServices;
use crate::trace::Branch;
use crate::types::{BrickDefinition, BrickKind, InputSchema};

/// Runs `try`; on failure runs `except` with the error bound.
pub struct TryExceptBrick;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TryExceptArgs {
    #[serde(rename = "try")]
    try_pipeline: Value,
    #[serde(rename = "except", default)]
    except_pipeline: Option<Value>,
    #[serde(default = "default_error_key")]
    error_key: String,
}

fn default_error_key() -> String {
    "error".to_string()
}

#[async_trait]
impl Brick for TryExceptBrick {
    fn definition(&self) -> BrickDefinition {
        BrickDefinition::new("@pixiebrix/try-except", "Try-Except", BrickKind::Transformer)
            .with_description("Try running a pipeline, and run another pipeline if it fails")
            .with_schema(
                InputSchema::new()
                    .with_property("try", json!({"type": "object"}))
                    .with_property("except", json!({"type": ["object", "null"]}))
                    .with_property("errorKey", json!({"type": "string"}))
                    .with_required(["try"]),
            )
    }

    async fn run(&self, args: Value, services: &ExecutionServices) -> RuntimeResult<Value> {
        let args: TryExceptArgs = parse_args(&args)?;
        let key = OutputKey::new(&args.error_key)?.context_key();

        let err = match services
            .run_pipeline(&args.try_pipeline, Branch::new("try", 0), &Map::new())
            .await
        {
            Ok(output) => return Ok(output),
            Err(err @ RuntimeError::HeadlessMode(_)) => return Err(err),
            Err(err) => err,
        };

        services.logger.info(&format!("Recovering from error: {err}"));
        let Some(except) = optional_pipeline(args.except_pipeline) else {
            return Ok(Value::Null);
        };

        let mut extra = Map::new();
        extra.insert(key, SerializedError::from(err.root_cause()).to_value());
        services
            .run_pipeline(&except, Branch::new("except", 0), &extra)
            .await
    }
}
