// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Integration dependencies and the bindings built from them.
//!
//! A mod declares the integrations it needs together with the output key each
//! one is bound to. Before the pipeline starts, every dependency is resolved
//! through an [`IntegrationLocator`] and bound as `@<outputKey>`:
//!
//! ```json
//! { "__service": { "integrationId": "...", "configId": "...", "config": {...} },
//!   "apiKey": "...", "baseUrl": "..." }
//! ```
//!
//! The configuration's own properties are hoisted next to `__service` so
//! legacy pipelines can write `@service.apiKey`.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::context::RESERVED_KEYS;
use crate::error::{ConfigError, RuntimeError, RuntimeResult};
use crate::evaluator::SERVICE_KEY;
use crate::pipeline::OutputKey;

/// An integration a mod needs, and where to bind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationDependency {
    pub integration_id: String,
    pub output_key: OutputKey,
    /// `None` for integrations that take no configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
}

impl IntegrationDependency {
    pub fn new(integration_id: impl Into<String>, output_key: OutputKey) -> Self {
        Self {
            integration_id: integration_id.into(),
            output_key,
            config_id: None,
        }
    }

    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }
}

/// Integration configuration with secrets removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedIntegrationConfig {
    pub integration_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl SanitizedIntegrationConfig {
    pub fn new(integration_id: impl Into<String>, config_id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            integration_id: integration_id.into(),
            config_id: Some(config_id.into()),
            config,
        }
    }

    /// Configuration of an integration that needs none.
    pub fn empty(integration_id: impl Into<String>) -> Self {
        Self {
            integration_id: integration_id.into(),
            config_id: None,
            config: Map::new(),
        }
    }

    /// The context binding for this configuration.
    pub fn to_binding(&self) -> Value {
        let mut binding = Map::with_capacity(self.config.len() + 1);
        binding.insert(
            SERVICE_KEY.to_string(),
            serde_json::to_value(self).unwrap_or(Value::Null),
        );
        for (key, value) in &self.config {
            if key != SERVICE_KEY {
                binding.insert(key.clone(), value.clone());
            }
        }
        Value::Object(binding)
    }
}

/// Resolves integration configurations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IntegrationLocator: Send + Sync {
    /// Fails with `IntegrationConfigNotFoundError` when no such configuration exists.
    async fn locate(
        &self,
        integration_id: &str,
        config_id: &str,
    ) -> RuntimeResult<SanitizedIntegrationConfig>;
}

/// Locator over a fixed set of configurations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIntegrationLocator {
    configs: HashMap<(String, String), SanitizedIntegrationConfig>,
}

impl InMemoryIntegrationLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration; configurations without a config id are ignored.
    pub fn insert(&mut self, config: SanitizedIntegrationConfig) -> &mut Self {
        if let Some(config_id) = config.config_id.clone() {
            self.configs
                .insert((config.integration_id.clone(), config_id), config);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Load a list of configurations from a JSON or YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let configs: Vec<SanitizedIntegrationConfig> = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        let mut locator = Self::new();
        for config in configs {
            if config.config_id.is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "configId".to_string(),
                    message: format!("missing for integration {}", config.integration_id),
                });
            }
            locator.insert(config);
        }
        Ok(locator)
    }
}

impl FromIterator<SanitizedIntegrationConfig> for InMemoryIntegrationLocator {
    fn from_iter<I: IntoIterator<Item = SanitizedIntegrationConfig>>(iter: I) -> Self {
        let mut locator = Self::new();
        for config in iter {
            locator.insert(config);
        }
        locator
    }
}

#[async_trait]
impl IntegrationLocator for InMemoryIntegrationLocator {
    async fn locate(
        &self,
        integration_id: &str,
        config_id: &str,
    ) -> RuntimeResult<SanitizedIntegrationConfig> {
        self.configs
            .get(&(integration_id.to_string(), config_id.to_string()))
            .cloned()
            .ok_or_else(|| RuntimeError::IntegrationNotFound {
                integration_id: integration_id.to_string(),
                config_id: config_id.to_string(),
            })
    }
}

/// Resolve every dependency and build the `@<outputKey>` bindings.
///
/// Dependencies are resolved in order; the first failure is returned.
pub async fn build_integration_context(
    dependencies: &[IntegrationDependency],
    locator: &dyn IntegrationLocator,
) -> RuntimeResult<Map<String, Value>> {
    let mut seen = HashSet::new();
    for dependency in dependencies {
        let key = dependency.output_key.context_key();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(RuntimeError::configuration(format!(
                "Integration {} cannot be bound to reserved key {key}",
                dependency.integration_id
            )));
        }
        if !seen.insert(key.clone()) {
            return Err(RuntimeError::configuration(format!(
                "Duplicate integration output key {key}"
            )));
        }
    }

    let mut context = Map::with_capacity(dependencies.len());
    for dependency in dependencies {
        let config = match &dependency.config_id {
            Some(config_id) => locator.locate(&dependency.integration_id, config_id).await?,
            None => SanitizedIntegrationConfig::empty(&dependency.integration_id),
        };
        debug!(
            integration_id = %dependency.integration_id,
            output_key = %dependency.output_key,
            "Bound integration"
        );
        context.insert(dependency.output_key.context_key(), config.to_binding());
    }
    Ok(context)
}
