// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Step-level execution traces.
//!
//! The reducer appends an `enter` record before running a step and an `exit`
//! record after it settles. Records of nested pipelines carry the branch path
//! that led to them, so a viewer can rebuild the call tree of a run.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SerializedError;
use crate::telemetry::RunId;

/// One hop into a nested pipeline: the brick argument that held the pipeline
/// and the iteration counter for bricks that run it repeatedly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Branch {
    pub key: String,
    pub counter: usize,
}

impl Branch {
    pub fn new(key: impl Into<String>, counter: usize) -> Self {
        Self {
            key: key.into(),
            counter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum TracePhase {
    #[serde(rename_all = "camelCase")]
    Enter {
        /// Rendered arguments, present only when value logging is enabled.
        #[serde(skip_serializing_if = "Option::is_none")]
        render_args: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Exit {
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<SerializedError>,
        /// The step's condition was falsy.
        skipped_run: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub run_id: RunId,
    pub instance_id: String,
    pub brick_id: String,
    pub step_index: usize,
    pub branches: Vec<Branch>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub phase: TracePhase,
}

impl TraceRecord {
    pub fn is_exit(&self) -> bool {
        matches!(self.phase, TracePhase::Exit { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.phase, TracePhase::Exit { skipped_run: true, .. })
    }
}

/// Append-only destination for trace records.
pub trait TraceSink: Send + Sync {
    fn record(&self, record: TraceRecord);
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn record(&self, _record: TraceRecord) {}
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    records: Mutex<Vec<TraceRecord>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Records of one run, in the order they were appended.
    pub fn for_run(&self, run_id: RunId) -> Vec<TraceRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.run_id == run_id)
            .collect()
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, record: TraceRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(run_id: RunId, phase: TracePhase) -> TraceRecord {
        TraceRecord {
            run_id,
            instance_id: "step-0".to_string(),
            brick_id: "@test/echo".to_string(),
            step_index: 0,
            branches: vec![Branch::new("body", 1)],
            timestamp: Utc::now(),
            phase,
        }
    }

    #[test]
    fn test_memory_sink_filters_by_run() {
        let sink = MemoryTraceSink::new();
        let run = RunId::new();
        sink.record(record(run, TracePhase::Enter { render_args: None }));
        sink.record(record(RunId::new(), TracePhase::Enter { render_args: None }));
        sink.record(record(
            run,
            TracePhase::Exit {
                output: None,
                error: None,
                skipped_run: true,
            },
        ));

        let records = sink.for_run(run);
        assert_eq!(records.len(), 2);
        assert!(records[1].is_exit());
        assert!(records[1].is_skipped());
    }

    #[test]
    fn test_record_serialization() {
        let run = RunId::new();
        let value = serde_json::to_value(record(
            run,
            TracePhase::Exit {
                output: Some(json!({"ok": true})),
                error: None,
                skipped_run: false,
            },
        ))
        .unwrap();

        assert_eq!(value["phase"], json!("exit"));
        assert_eq!(value["output"], json!({"ok": true}));
        assert_eq!(value["skippedRun"], json!(false));
        assert_eq!(value["branches"], json!([{"key": "body", "counter": 1}]));
        assert_eq!(value["runId"], json!(run.to_string()));
    }
}
