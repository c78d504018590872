// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Brick runtime - executes PixieBrix brick pipelines.
//!
//! A pipeline is a list of brick invocations. Each step's arguments are
//! expressions (`var`, `mustache`, `nunjucks`, `handlebars`, `pipeline`,
//! `defer`) resolved against an execution context of `@`-prefixed bindings,
//! and the result of one step feeds the next.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Brick definitions and input schemas
//! - [`error`] - Error taxonomy and result aliases
//! - [`api_version`] - Per-version evaluation semantics (`v1`, `v2`, `v3`)
//! - [`expression`] - Typed argument expressions and their wire format
//! - [`template`] - Mustache, nunjucks and handlebars rendering
//! - [`evaluator`] - `mapArgs`: resolving a step's arguments
//! - [`context`] - The execution context of `@`-bindings
//! - [`pipeline`] - Pipeline steps and pipeline files
//! - [`runtime`] - The pipeline reducer and the services bricks run with
//! - [`bricks`] - The brick trait, registries and built-in bricks
//! - [`integrations`] - Integration dependencies and their context bindings
//! - [`alerts`] - Deployment alerts for failing steps
//! - [`logging`] - Contextual loggers handed to bricks
//! - [`trace`] - Per-step trace records
//! - [`config`] - Configuration loading and merging
//! - [`telemetry`] - Tracing, metrics, and observability infrastructure
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use brick_runtime::bricks::InMemoryBrickRegistry;
//! use brick_runtime::pipeline::parse_pipeline;
//! use brick_runtime::runtime::{InitialValues, PipelineReducer, ReduceOptions};
//!
//! let steps = parse_pipeline(&serde_json::json!([
//!     {"id": "@pixiebrix/identity", "config": {"greeting": "Hello, {{ @input.name }}"}}
//! ]))?;
//! let reducer = PipelineReducer::new(Arc::new(InMemoryBrickRegistry::with_builtins()));
//! let output = reducer
//!     .reduce_pipeline(&steps, InitialValues::new(json!({"name": "Ada"})), ReduceOptions::default())
//!     .await?;
//! ```

pub mod alerts;
pub mod api_version;
pub mod bricks;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod integrations;
pub mod logging;
pub mod pipeline;
pub mod runtime;
pub mod telemetry;
pub mod template;
pub mod trace;
pub mod types;

// Re-export commonly used types at crate root
pub use api_version::ApiVersion;
pub use bricks::{Brick, BrickRegistry, InMemoryBrickRegistry};
pub use context::ExecutionContext;
pub use error::{ConfigError, ErrorKind, Result, RuntimeError, RuntimeResult, SerializedError};
pub use expression::{ArgNode, Expression, TemplateEngine};
pub use pipeline::{OutputKey, PipelineDefinition, PipelineStep};
pub use runtime::{ExecutionServices, InitialValues, PipelineReducer, ReduceOptions};
pub use types::{BrickDefinition, BrickKind, InputSchema};

/// Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
