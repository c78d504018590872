// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span helpers for pipeline steps.

use std::time::Instant;

use tracing::{info_span, Span};

use super::correlation::RunId;

/// Timing guard for one brick invocation.
///
/// Records duration and outcome on the `brick` span and in
/// [`GLOBAL_METRICS`](super::metrics::GLOBAL_METRICS).
pub struct BrickSpan {
    brick_id: String,
    start: Instant,
    span: Span,
}

impl BrickSpan {
    /// Start a span for the step at `step_index`.
    pub fn start(brick_id: &str, step_index: usize, run_id: RunId) -> Self {
        let span = info_span!(
            "brick",
            brick_id = %brick_id,
            step_index = step_index,
            run_id = %run_id,
            duration_ms = tracing::field::Empty,
            success = tracing::field::Empty,
        );

        Self {
            brick_id: brick_id.to_string(),
            start: Instant::now(),
            span,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Finish the span, recording duration and success.
    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed();
        self.span.record("duration_ms", duration.as_secs_f64() * 1000.0);
        self.span.record("success", success);

        super::metrics::GLOBAL_METRICS.record_brick(&self.brick_id, duration, success);

        tracing::debug!(parent: &self.span, "Brick execution complete");
    }

    /// Finish with a result, automatically determining success.
    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) {
        self.finish(result.is_ok());
    }
}

/// Timing guard for any named operation.
pub struct TimedOperation {
    name: &'static str,
    start: Instant,
}

impl TimedOperation {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    /// Record the elapsed time under this operation's name.
    pub fn finish(self) {
        super::metrics::GLOBAL_METRICS.record_operation(self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::super::metrics::GLOBAL_METRICS;
    use super::*;

    #[test]
    fn test_brick_span_records_metrics() {
        let span = BrickSpan::start("@test/span-brick", 0, RunId::new());
        let result: Result<(), &str> = Err("boom");
        span.finish_with_result(&result);

        let metrics = GLOBAL_METRICS.brick_metrics("@test/span-brick").unwrap();
        assert!(metrics.failures >= 1);
    }

    #[test]
    fn test_timed_operation() {
        let op = TimedOperation::start("test_timed_operation");
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(op.elapsed().as_micros() > 0);
        op.finish();
        assert!(GLOBAL_METRICS.operation_metrics("test_timed_operation").is_some());
    }
}
