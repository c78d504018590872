// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime API versions and the options each one implies.
//!
//! Every version-dependent behavior of the runtime is decided here and threaded
//! explicitly through the evaluator and reducer as an [`ApiVersionOptions`]
//! record. Nothing else in the crate checks the version tag directly.
//!
//! | version | explicit data flow | autoescape | implicit template engine | conditions |
//! |---------|--------------------|------------|--------------------------|------------|
//! | v1      | no                 | yes        | mustache                 | legacy     |
//! | v2      | yes                | yes        | mustache                 | legacy     |
//! | v3      | yes                | no         | none                     | strict     |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RuntimeError;
use crate::expression::TemplateEngine;

/// A runtime API version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ApiVersion {
    V1,
    V2,
    V3,
}

impl ApiVersion {
    /// All supported versions, oldest first.
    pub const ALL: [ApiVersion; 3] = [ApiVersion::V1, ApiVersion::V2, ApiVersion::V3];

    /// The version tag as written in mod definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
        }
    }

    /// Options implied by this version.
    pub fn options(&self) -> &'static ApiVersionOptions {
        match self {
            Self::V1 => &V1_OPTIONS,
            Self::V2 => &V2_OPTIONS,
            Self::V3 => &V3_OPTIONS,
        }
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::V3
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            "v3" => Ok(Self::V3),
            other => Err(RuntimeError::configuration(format!(
                "Unknown apiVersion: {other:?} (expected v1, v2 or v3)"
            ))),
        }
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = RuntimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(version: ApiVersion) -> Self {
        version.as_str().to_string()
    }
}

/// How a rendered `if` condition is reduced to a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionPolicy {
    /// v1/v2: rendered strings such as `""`, `"false"`, `"no"` and `"0"` are falsy.
    Legacy,
    /// v3: JavaScript falsiness only; the string `"false"` is truthy.
    Strict,
}

impl ConditionPolicy {
    /// Decide whether an evaluated condition lets the step run.
    pub fn is_truthy(&self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Number(num) => num.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
            Value::String(text) => match self {
                Self::Strict => !text.is_empty(),
                Self::Legacy => !LEGACY_FALSY_STRINGS.contains(&text.trim().to_lowercase().as_str()),
            },
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

const LEGACY_FALSY_STRINGS: &[&str] = &["", "false", "f", "no", "n", "off", "0", "null", "undefined"];

/// Options record derived from an [`ApiVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersionOptions {
    /// Step outputs are only visible through `@outputKey` bindings.
    pub explicit_data_flow: bool,
    /// HTML-escape values interpolated by template engines.
    pub autoescape: bool,
    /// Engine used to render bare strings; `None` leaves them verbatim.
    pub implicit_template_engine: Option<TemplateEngine>,
    pub condition_policy: ConditionPolicy,
}

static V1_OPTIONS: ApiVersionOptions = ApiVersionOptions {
    explicit_data_flow: false,
    autoescape: true,
    implicit_template_engine: Some(TemplateEngine::Mustache),
    condition_policy: ConditionPolicy::Legacy,
};

static V2_OPTIONS: ApiVersionOptions = ApiVersionOptions {
    explicit_data_flow: true,
    autoescape: true,
    implicit_template_engine: Some(TemplateEngine::Mustache),
    condition_policy: ConditionPolicy::Legacy,
};

static V3_OPTIONS: ApiVersionOptions = ApiVersionOptions {
    explicit_data_flow: true,
    autoescape: false,
    implicit_template_engine: None,
    condition_policy: ConditionPolicy::Strict,
};

/// Resolve a version tag to its options, failing fast on unknown tags.
pub fn api_version_options(version: &str) -> Result<ApiVersionOptions, RuntimeError> {
    let version: ApiVersion = version.parse()?;
    Ok(*version.options())
}
