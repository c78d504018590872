// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for brickrun.
//!
//! Handles loading and merging of runtime configuration from multiple sources:
//! - Global config: ~/.brickrun/config.json
//! - Workspace config: brickrun.json, brickrun.yaml, or .brickrun/config.json
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    find_workspace_root, get_global_config_dir, get_global_config_path, load_config_file,
    load_global_config, load_pipeline_definition, load_workspace_config, CONFIG_FILES,
    GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{RuntimeConfig, WorkspaceConfig};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a workspace.
///
/// This is the main entry point for configuration loading.
pub fn load_config(workspace_root: &Path, cli_options: CliOptions) -> Result<RuntimeConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;

    Ok(merge_config(global, workspace, cli_options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_version::ApiVersion;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_cli_override() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("brickrun.json"),
            r#"{"apiVersion": "v1", "brickTimeoutMs": 250}"#,
        )
        .unwrap();

        let cli = CliOptions {
            api_version: Some(ApiVersion::V2),
            ..Default::default()
        };
        let config = load_config(temp.path(), cli).unwrap();
        assert_eq!(config.api_version, ApiVersion::V2);
        assert_eq!(config.brick_timeout_ms, Some(250));
    }
}
