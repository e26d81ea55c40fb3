//! Vendor call control: dialing the operator's video endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use stopguard_core::errors::{truncate_body, BrokerError};
use stopguard_settings::CallControlSettings;

/// Result of a successful dial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialOutcome {
    pub target: String,
    pub detail: String,
}

#[async_trait]
pub trait CallControl: Send + Sync {
    /// Whether dials are possible at all.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn dial(&self, target: &str) -> Result<DialOutcome, BrokerError>;
}

/// Used when no call-control endpoint is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledCallControl;

#[async_trait]
impl CallControl for DisabledCallControl {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn dial(&self, _target: &str) -> Result<DialOutcome, BrokerError> {
        Err(BrokerError::CallControl("call control is not configured".into()))
    }
}

/// POSTs `{"target": ...}` to a call-control endpoint; any 2xx is success.
pub struct HttpCallControl {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCallControl {
    pub fn new(
        endpoint: impl Into<String>,
        settings: &CallControlSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl CallControl for HttpCallControl {
    async fn dial(&self, target: &str) -> Result<DialOutcome, BrokerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "target": target }))
            .send()
            .await
            .map_err(|e| BrokerError::CallControl(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BrokerError::CallControl(format!(
                "dial rejected with status {}: {}",
                status.as_u16(),
                truncate_body(&text, 200)
            )));
        }
        Ok(DialOutcome {
            target: target.to_string(),
            detail: format!("dialed ({})", status.as_u16()),
        })
    }
}

/// Build the configured call control.
pub fn from_settings(settings: &CallControlSettings) -> Result<Arc<dyn CallControl>, reqwest::Error> {
    Ok(match settings.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => Arc::new(HttpCallControl::new(endpoint, settings)?),
        _ => Arc::new(DisabledCallControl),
    })
}
