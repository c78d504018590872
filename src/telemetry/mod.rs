// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry, tracing, and metrics infrastructure.
//!
//! - **Tracing**: every step runs inside a `brick` span carrying `brick_id`,
//!   `step_index` and `run_id`
//! - **Metrics**: per-brick invocation counters and per-operation timings
//! - **Run ids**: correlate spans and trace records of one top-level run
//!
//! Initialize once at startup:
//!
//! ```rust,ignore
//! use brick_runtime::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```
//!
//! Span and metric recording in the reducer is compiled in with the
//! `telemetry` feature (on by default).

mod correlation;
mod init;
pub mod metrics;
mod spans;

pub use correlation::RunId;
pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{BrickMetrics, Histogram, Metrics, MetricsSnapshot, OperationMetrics, GLOBAL_METRICS};
pub use spans::{BrickSpan, TimedOperation};
