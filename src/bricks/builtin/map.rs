// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::bricks::{parse_args, Brick};
use crate::error::RuntimeResult;
use crate::runtime::ExecutionServices;
use crate::types::{BrickDefinition, BrickKind, InputSchema};

/// Evaluates a deferred expression once per element, with `@element` bound.
pub struct MapBrick;

#[derive(Debug, Deserialize)]
struct MapArgs {
    elements: Vec<Value>,
    expression: Value,
}

#[async_trait]
impl Brick for MapBrick {
    fn definition(&self) -> BrickDefinition {
        BrickDefinition::new("@pixiebrix/map", "Map", BrickKind::Transformer)
            .with_description("Apply a deferred expression to each element")
            .with_schema(
                InputSchema::new()
                    .with_property("elements", json!({"type": "array"}))
                    .with_property("expression", json!({
                        "description": "A defer expression evaluated per element"
                    }))
                    .with_required(["elements", "expression"]),
            )
    }

    async fn run(&self, args: Value, services: &ExecutionServices) -> RuntimeResult<Value> {
        let args: MapArgs = parse_args(&args)?;

        let mut results = Vec::with_capacity(args.elements.len());
        for element in args.elements {
            let mut extra = Map::new();
            extra.insert("@element".to_string(), element);
            results.push(services.evaluate_deferred(&args.expression, &extra)?);
        }
        Ok(Value::Array(results))
    }
}
