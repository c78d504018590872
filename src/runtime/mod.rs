// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline execution.
//!
//! - [`PipelineReducer`] runs pipelines step by step
//! - [`ExecutionServices`] is what a running brick gets to work with
//! - [`SchemaCache`] checks resolved arguments against a brick's schema

mod options;
mod reducer;
mod services;
mod validation;

pub use options::{InitialValues, ReduceOptions};
pub use reducer::PipelineReducer;
pub use services::{pipeline_steps, ExecutionServices, NestedRun, PipelineRunner, RendererPayload};
pub use validation::{validate_input, SchemaCache};
