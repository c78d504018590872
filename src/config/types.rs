// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of workspace and resolved configuration,
//! supporting JSON and YAML formats.

use serde::{Deserialize, Serialize};

use crate::api_version::ApiVersion;

/// Runtime configuration as written in a config file.
/// Can be defined in brickrun.json, brickrun.yaml or .brickrun/config.json.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// API version for pipelines that do not declare one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<ApiVersion>,

    /// Validate brick arguments against their input schemas
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_input: Option<bool>,

    /// Include argument and output values in traces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_values: Option<bool>,

    /// Log filter level (trace, debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Send deployment alerts for steps with `onError.alert`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<bool>,

    /// Abort a brick that runs longer than this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brick_timeout_ms: Option<u64>,
}

/// Fully resolved configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub api_version: ApiVersion,
    pub validate_input: bool,
    pub log_values: bool,
    pub log_level: String,
    pub alerts: bool,
    pub brick_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_version: ApiVersion::default(),
            validate_input: true,
            log_values: false,
            log_level: "info".to_string(),
            alerts: true,
            brick_timeout_ms: None,
        }
    }
}
