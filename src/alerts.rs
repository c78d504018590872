// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Best-effort deployment alerts.
//!
//! When a step configured with `onError.alert` fails inside a deployed mod,
//! the reducer hands a [`DeploymentAlert`] to a [`DeploymentAlerter`] on a
//! background task. The reducer never awaits the task and a failed alert is
//! only logged, so it cannot mask the step's error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::error::SerializedError;
use crate::logging::MessageContext;

#[derive(Error, Debug)]
#[error("Failed to send deployment alert: {0}")]
pub struct AlertError(pub String);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentAlert {
    pub deployment_id: String,
    pub brick_id: String,
    pub step_index: usize,
    pub error: SerializedError,
    pub message_context: MessageContext,
    pub timestamp: DateTime<Utc>,
}

/// Delivers alerts to whoever watches a deployment.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentAlerter: Send + Sync {
    async fn alert(&self, alert: DeploymentAlert) -> Result<(), AlertError>;
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

#[async_trait]
impl DeploymentAlerter for LogAlerter {
    async fn alert(&self, alert: DeploymentAlert) -> Result<(), AlertError> {
        warn!(
            deployment_id = %alert.deployment_id,
            brick_id = %alert.brick_id,
            step_index = alert.step_index,
            error = %alert.error.message,
            "Deployment alert"
        );
        Ok(())
    }
}

/// Send `alert` on a background task.
///
/// Returns `None` when called outside a tokio runtime; the alert is dropped.
pub fn dispatch_alert(
    alerter: Arc<dyn DeploymentAlerter>,
    alert: DeploymentAlert,
) -> Option<JoinHandle<()>> {
    let Ok(handle) = Handle::try_current() else {
        warn!(deployment_id = %alert.deployment_id, "No runtime available, dropping deployment alert");
        return None;
    };

    Some(handle.spawn(async move {
        let deployment_id = alert.deployment_id.clone();
        match alerter.alert(alert).await {
            Ok(()) => debug!(deployment_id = %deployment_id, "Deployment alert sent"),
            Err(err) => warn!(deployment_id = %deployment_id, error = %err, "Deployment alert failed"),
        }
    }))
}
