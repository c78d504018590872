// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Input validation against a brick's JSON Schema.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jsonschema::Validator;
use serde_json::Value;

use crate::error::{RuntimeError, RuntimeResult, SchemaViolation};
use crate::types::BrickDefinition;

/// Compiled input schemas, keyed by brick id.
///
/// Registries are immutable once built, so a brick id always maps to the
/// same schema for the lifetime of a reducer.
#[derive(Default)]
pub struct SchemaCache {
    validators: RwLock<HashMap<String, Arc<Validator>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `args`, compiling the brick's schema on first use.
    pub fn validate(&self, definition: &BrickDefinition, args: &Value) -> RuntimeResult<()> {
        let validator = self.validator(definition)?;
        check(&validator, definition, args)
    }

    /// Number of compiled schemas held.
    pub fn len(&self) -> usize {
        self.validators
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validator(&self, definition: &BrickDefinition) -> RuntimeResult<Arc<Validator>> {
        let cached = self
            .validators
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&definition.id)
            .cloned();
        if let Some(validator) = cached {
            return Ok(validator);
        }

        let validator = Arc::new(compile(definition)?);
        self.validators
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(definition.id.clone(), Arc::clone(&validator));
        Ok(validator)
    }
}

fn compile(definition: &BrickDefinition) -> RuntimeResult<Validator> {
    let schema = definition.input_schema.to_value();
    jsonschema::validator_for(&schema).map_err(|err| {
        RuntimeError::configuration(format!(
            "Invalid input schema for brick {}: {err}",
            definition.id
        ))
    })
}

/// Validate resolved arguments; every violation is reported, not just the first.
///
/// Compiles the schema on every call; the reducer goes through a [`SchemaCache`].
pub fn validate_input(definition: &BrickDefinition, args: &Value) -> RuntimeResult<()> {
    check(&compile(definition)?, definition, args)
}

fn check(validator: &Validator, definition: &BrickDefinition, args: &Value) -> RuntimeResult<()> {
    if validator.is_valid(args) {
        return Ok(());
    }

    let violations: Vec<SchemaViolation> = validator
        .iter_errors(args)
        .map(|err| {
            let schema_path = err.schema_path.to_string();
            SchemaViolation {
                instance_location: err.instance_path.to_string(),
                keyword: schema_path
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                message: err.to_string(),
            }
        })
        .collect();

    Err(RuntimeError::InputValidation {
        brick_id: definition.id.clone(),
        step: None,
        violations,
    })
}
