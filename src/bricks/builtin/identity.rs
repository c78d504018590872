// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use serde_json::Value;

use crate::bricks::Brick;
use crate::error::RuntimeResult;
use crate::runtime::ExecutionServices;
use crate::types::{BrickDefinition, BrickKind};

/// Returns its arguments unchanged.
pub struct IdentityBrick;

#[async_trait]
impl Brick for IdentityBrick {
    fn definition(&self) -> BrickDefinition {
        BrickDefinition::new("@pixiebrix/identity", "Identity function", BrickKind::Transformer)
            .with_description("Returns the object passed into it")
    }

    async fn run(&self, args: Value, _services: &ExecutionServices) -> RuntimeResult<Value> {
        Ok(args)
    }
}
