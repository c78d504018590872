// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::bricks::{parse_args, Brick};
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::ExecutionServices;
use crate::types::{BrickDefinition, BrickKind, InputSchema};

/// Raises a business error with the given message.
pub struct ErrorBrick;

#[derive(Debug, Deserialize)]
struct ErrorArgs {
    message: String,
}

#[async_trait]
impl Brick for ErrorBrick {
    fn definition(&self) -> BrickDefinition {
        BrickDefinition::new("@pixiebrix/error", "Raise business error", BrickKind::Effect)
            .with_schema(
                InputSchema::new()
                    .with_property("message", json!({"type": "string"}))
                    .with_required(["message"]),
            )
    }

    async fn run(&self, args: Value, _services: &ExecutionServices) -> RuntimeResult<Value> {
        let args: ErrorArgs = parse_args(&args)?;
        Err(RuntimeError::business(args.message))
    }
}
