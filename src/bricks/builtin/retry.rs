// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::bricks::{parse_args, Brick};
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::ExecutionServices;
use crate::trace::Branch;
use crate::types::{BrickDefinition, BrickKind, InputSchema};

/// Re-runs the body until it succeeds or the attempts run out.
pub struct RetryBrick;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryArgs {
    body: Value,
    /// Total attempts, including the first.
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default)]
    interval_millis: u64,
}

fn default_max_retries() -> u32 {
    3
}

#[async_trait]
impl Brick for RetryBrick {
    fn definition(&self) -> BrickDefinition {
        BrickDefinition::new("@pixiebrix/retry", "Retry", BrickKind::Transformer)
            .with_description("Retry a pipeline until it succeeds")
            .with_schema(
                InputSchema::new()
                    .with_property("body", json!({"type": "object"}))
                    .with_property("maxRetries", json!({"type": "integer", "minimum": 1}))
                    .with_property("intervalMillis", json!({"type": "integer", "minimum": 0}))
                    .with_required(["body"]),
            )
    }

    async fn run(&self, args: Value, services: &ExecutionServices) -> RuntimeResult<Value> {
        let args: RetryArgs = parse_args(&args)?;
        let attempts = args.max_retries.max(1) as usize;

        let mut attempt = 0;
        loop {
            match services
                .run_pipeline(&args.body, Branch::new("body", attempt), &Map::new())
                .await
            {
                Ok(output) => return Ok(output),
                Err(err @ RuntimeError::HeadlessMode(_)) => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(err);
                    }
                    services.logger.warn(&format!("Attempt {attempt} failed, retrying: {err}"));
                    if args.interval_millis > 0 {
                        tokio::time::sleep(Duration::from_millis(args.interval_millis)).await;
                    }
                }
            }
        }
    }
}
