// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bricks and the registry the reducer resolves them through.
//!
//! # Built-in bricks
//!
//! Control flow:
//! - `@pixiebrix/if-else` - Run one of two pipelines
//! - `@pixiebrix/for` - Run a pipeline per element
//! - `@pixiebrix/try-except` - Recover from a failing pipeline
//! - `@pixiebrix/retry` - Re-run a failing pipeline
//!
//! Data:
//! - `@pixiebrix/identity` - Return the arguments
//! - `@pixiebrix/map` - Evaluate a deferred expression per element
//! - `@pixiebrix/error` - Raise a business error
//!
//! Rendering:
//! - `@pixiebrix/html` - Render an HTML panel

pub mod builtin;
mod registry;

pub use registry::{Brick, BrickRegistry, BrickRegistryBuilder, InMemoryBrickRegistry};

#[cfg(test)]
pub use registry::MockBrickRegistry;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{RuntimeError, RuntimeResult};

/// Parse a brick's resolved arguments into its argument struct.
pub fn parse_args<T>(args: &Value) -> RuntimeResult<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(args.clone())
        .map_err(|err| RuntimeError::execution(format!("Failed to parse arguments: {err}")))
}

/// Take an optional pipeline argument, treating `null` as absent.
pub(crate) fn optional_pipeline(value: Option<Value>) -> Option<Value> {
    value.filter(|pipeline| !pipeline.is_null())
}
