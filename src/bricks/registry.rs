// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Brick trait and registry.
//!
//! This module defines the core abstractions for invoking bricks:
//! - [`Brick`] trait that every brick implements
//! - [`BrickRegistry`] trait the reducer resolves brick ids through
//! - [`InMemoryBrickRegistry`] for a fixed set of bricks

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::ExecutionServices;
use crate::types::BrickDefinition;

/// Trait that all bricks must implement.
///
/// # Example
///
/// ```rust,ignore
/// use brick_runtime::bricks::Brick;
/// use brick_runtime::types::{BrickDefinition, BrickKind};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Brick for Echo {
///     fn definition(&self) -> BrickDefinition {
///         BrickDefinition::new("@acme/echo", "Echo", BrickKind::Transformer)
///     }
///
///     async fn run(&self, args: Value, _services: &ExecutionServices) -> RuntimeResult<Value> {
///         Ok(args)
///     }
/// }
/// ```
#[async_trait]
pub trait Brick: Send + Sync {
    /// Get the brick definition (id, kind, input schema).
    fn definition(&self) -> BrickDefinition;

    /// Run the brick with its resolved arguments.
    async fn run(&self, args: Value, services: &ExecutionServices) -> RuntimeResult<Value>;
}

/// Lookup-by-id capability consumed by the reducer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrickRegistry: Send + Sync {
    /// Resolve a brick; unknown ids fail with `BrickNotFoundError`.
    async fn lookup(&self, id: &str) -> RuntimeResult<Arc<dyn Brick>>;
}

/// Registry of bricks held in memory, maps ids to bricks.
#[derive(Clone, Default)]
pub struct InMemoryBrickRegistry {
    bricks: HashMap<String, Arc<dyn Brick>>,
}

impl InMemoryBrickRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in bricks.
    pub fn with_builtins() -> Self {
        let mut builder = BrickRegistryBuilder::new();
        builder.with_builtins();
        builder.build()
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Brick>> {
        self.bricks.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bricks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.bricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bricks.is_empty()
    }

    /// All brick definitions, ordered by id.
    pub fn definitions(&self) -> Vec<BrickDefinition> {
        let mut definitions: Vec<_> = self.bricks.values().map(|b| b.definition()).collect();
        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        definitions
    }
}

#[async_trait]
impl BrickRegistry for InMemoryBrickRegistry {
    async fn lookup(&self, id: &str) -> RuntimeResult<Arc<dyn Brick>> {
        self.get(id).ok_or_else(|| RuntimeError::brick_not_found(id))
    }
}

/// Builder for constructing an [`InMemoryBrickRegistry`].
#[derive(Default)]
pub struct BrickRegistryBuilder {
    bricks: HashMap<String, Arc<dyn Brick>>,
}

impl BrickRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a brick under its definition's id.
    pub fn register<B: Brick + 'static>(&mut self, brick: B) -> &mut Self {
        self.register_boxed(Arc::new(brick))
    }

    /// Register a shared brick (for bricks also held elsewhere, e.g. spies).
    pub fn register_boxed(&mut self, brick: Arc<dyn Brick>) -> &mut Self {
        let def = brick.definition();
        self.bricks.insert(def.id, brick);
        self
    }

    /// Register every built-in brick.
    pub fn with_builtins(&mut self) -> &mut Self {
        use super::builtin::*;

        self.register(IdentityBrick);
        self.register(IfElseBrick);
        self.register(ForEachBrick);
        self.register(MapBrick);
        self.register(TryExceptBrick);
        self.register(RetryBrick);
        self.register(ErrorBrick);
        self.register(HtmlBrick);
        self
    }

    /// Build the final registry.
    pub fn build(self) -> InMemoryBrickRegistry {
        InMemoryBrickRegistry {
            bricks: self.bricks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::BrickKind;

    struct NamedBrick(&'static str);

    #[async_trait]
    impl Brick for NamedBrick {
        fn definition(&self) -> BrickDefinition {
            BrickDefinition::new(self.0, "Named", BrickKind::Transformer)
        }

        async fn run(&self, args: Value, _services: &ExecutionServices) -> RuntimeResult<Value> {
            Ok(args)
        }
    }

    #[test]
    fn test_registry_builder() {
        let mut builder = BrickRegistryBuilder::new();
        builder.register(NamedBrick("@test/b"));
        builder.register(NamedBrick("@test/a"));

        let registry = builder.build();
        assert!(registry.contains("@test/a"));
        assert!(!registry.contains("@test/c"));
        let ids: Vec<_> = registry.definitions().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["@test/a", "@test/b"]);
    }

    #[test]
    fn test_builtins_registered() {
        let registry = InMemoryBrickRegistry::with_builtins();
        for id in [
            "@pixiebrix/identity",
            "@pixiebrix/if-else",
            "@pixiebrix/for",
            "@pixiebrix/map",
            "@pixiebrix/try-except",
            "@pixiebrix/retry",
            "@pixiebrix/error",
            "@pixiebrix/html",
        ] {
            assert!(registry.contains(id), "missing {id}");
        }
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let registry = InMemoryBrickRegistry::new();
        let err = registry.lookup("@test/missing").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::BrickNotFound);
    }
}
