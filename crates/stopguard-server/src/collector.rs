//! Outbound forward of emergencies to the central collector.

use async_trait::async_trait;
use serde_json::Value;
use stopguard_core::emergency::EmergencyEvent;
use stopguard_core::errors::{truncate_body, BrokerError};
use stopguard_settings::CollectorSettings;

/// Longest response body excerpt kept in a rejection.
const MAX_BODY_CHARS: usize = 200;

/// Successful collector response.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardReceipt {
    pub url: String,
    pub status: u16,
    /// Response body, when it was JSON.
    pub body: Option<Value>,
}

/// Sends one emergency to the collector. A single attempt, no retries.
#[async_trait]
pub trait CollectorClient: Send + Sync {
    async fn forward(&self, event: &EmergencyEvent) -> Result<ForwardReceipt, BrokerError>;
}

/// Collector endpoint for a stop.
pub fn collector_url(base_url: &str, bus_stop_id: u32) -> String {
    format!(
        "{}/api/simulate-emergency/{bus_stop_id}",
        base_url.trim_end_matches('/')
    )
}

/// HTTP collector client.
pub struct HttpCollector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCollector {
    /// Fails when the client cannot be built, e.g. a user agent that is not
    /// a valid header value.
    pub fn new(settings: &CollectorSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CollectorClient for HttpCollector {
    async fn forward(&self, event: &EmergencyEvent) -> Result<ForwardReceipt, BrokerError> {
        let url = collector_url(&self.base_url, event.bus_stop_id);
        let response = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|e| BrokerError::CollectorUnreachable {
                url: url.clone(),
                cause: if e.is_timeout() {
                    format!("timed out: {e}")
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        if status != 200 {
            return Err(BrokerError::CollectorRejected {
                url,
                status,
                body: truncate_body(&text, MAX_BODY_CHARS),
            });
        }
        Ok(ForwardReceipt {
            url,
            status,
            body: serde_json::from_str(&text).ok(),
        })
    }
}
