// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::bricks::{parse_args, Brick};
use crate::error::RuntimeResult;
use crate::pipeline::OutputKey;
use crate::runtime::ExecutionServices;
use crate::trace::Branch;
use crate::types::{BrickDefinition, BrickKind, InputSchema};

/// Runs the body pipeline once per element.
pub struct ForEachBrick;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForEachArgs {
    elements: Vec<Value>,
    body: Value,
    #[serde(default = "default_element_key")]
    element_key: String,
}

fn default_element_key() -> String {
    "element".to_string()
}

#[async_trait]
impl Brick for ForEachBrick {
    fn definition(&self) -> BrickDefinition {
        BrickDefinition::new("@pixiebrix/for", "For-Each Loop", BrickKind::Transformer)
            .with_description("Loop over elements, running the body for each one")
            .with_schema(
                InputSchema::new()
                    .with_property("elements", json!({"type": "array"}))
                    .with_property("body", json!({"type": "object"}))
                    .with_property("elementKey", json!({
                        "type": "string",
                        "description": "Variable name for the element (default: element)"
                    }))
                    .with_required(["elements", "body"]),
            )
    }

    async fn run(&self, args: Value, services: &ExecutionServices) -> RuntimeResult<Value> {
        let args: ForEachArgs = parse_args(&args)?;
        let key = OutputKey::new(&args.element_key)?.context_key();

        let mut last = Value::Null;
        for (index, element) in args.elements.into_iter().enumerate() {
            let mut extra = Map::new();
            extra.insert(key.clone(), element);
            last = services
                .run_pipeline(&args.body, Branch::new("body", index), &extra)
                .await?;
        }
        Ok(last)
    }
}
