// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use crate::api_version::ApiVersion;

use super::types::{RuntimeConfig, WorkspaceConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub api_version: Option<ApiVersion>,
    pub validate_input: Option<bool>,
    pub log_values: Option<bool>,
    pub log_level: Option<String>,
    pub alerts: Option<bool>,
    pub brick_timeout_ms: Option<u64>,
}

/// Default configuration values.
pub fn default_config() -> RuntimeConfig {
    RuntimeConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Workspace config (brickrun.json)
/// 3. Global config (~/.brickrun/config.json)
/// 4. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> RuntimeConfig {
    let mut result = default_config();

    if let Some(config) = global {
        apply_workspace_config(&mut result, &config);
    }

    if let Some(config) = workspace {
        apply_workspace_config(&mut result, &config);
    }

    apply_cli_options(&mut result, &cli);

    result
}

fn apply_workspace_config(result: &mut RuntimeConfig, config: &WorkspaceConfig) {
    if let Some(api_version) = config.api_version {
        result.api_version = api_version;
    }

    if let Some(validate_input) = config.validate_input {
        result.validate_input = validate_input;
    }

    if let Some(log_values) = config.log_values {
        result.log_values = log_values;
    }

    if let Some(ref log_level) = config.log_level {
        result.log_level = log_level.clone();
    }

    if let Some(alerts) = config.alerts {
        result.alerts = alerts;
    }

    if config.brick_timeout_ms.is_some() {
        result.brick_timeout_ms = config.brick_timeout_ms;
    }
}

fn apply_cli_options(result: &mut RuntimeConfig, cli: &CliOptions) {
    if let Some(api_version) = cli.api_version {
        result.api_version = api_version;
    }

    if let Some(validate_input) = cli.validate_input {
        result.validate_input = validate_input;
    }

    if let Some(log_values) = cli.log_values {
        result.log_values = log_values;
    }

    if let Some(ref log_level) = cli.log_level {
        result.log_level = log_level.clone();
    }

    if let Some(alerts) = cli.alerts {
        result.alerts = alerts;
    }

    if cli.brick_timeout_ms.is_some() {
        result.brick_timeout_ms = cli.brick_timeout_ms;
    }
}
