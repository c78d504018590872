// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::bricks::{parse_args, Brick};
use crate::error::RuntimeResult;
use crate::runtime::ExecutionServices;
use crate::types::{BrickDefinition, BrickKind, InputSchema};

/// Renders an HTML panel.
pub struct HtmlBrick;

#[derive(Debug, Deserialize)]
struct HtmlArgs {
    html: String,
}

#[async_trait]
impl Brick for HtmlBrick {
    fn definition(&self) -> BrickDefinition {
        BrickDefinition::new("@pixiebrix/html", "HTML Renderer", BrickKind::Renderer)
            .with_schema(
                InputSchema::new()
                    .with_property("html", json!({"type": "string"}))
                    .with_required(["html"]),
            )
    }

    async fn run(&self, args: Value, _services: &ExecutionServices) -> RuntimeResult<Value> {
        let args: HtmlArgs = parse_args(&args)?;
        Ok(json!({ "html": args.html }))
    }
}
