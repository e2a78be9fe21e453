use crate::bus::{LogEntry, MessagePublisher};
use crate::clock::Timestamper;
use crate::error::{BusError, PeerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Status reported when the request never produced a response
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// JSON body sent to the peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerMessage {
    pub message: String,
}

/// Raw request transport: one POST, reduced to the response status
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn post_message(&self, url: &str, body: &PeerMessage) -> Result<u16, PeerError>;
}

/// `reqwest`-backed peer client with a per-request deadline
pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(request_timeout: Duration) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PeerError::Client {
                details: e.to_string(),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn post_message(&self, url: &str, body: &PeerMessage) -> Result<u16, PeerError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PeerError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    PeerError::Transport {
                        url: url.to_string(),
                        details: e.to_string(),
                    }
                }
            })?;

        // Only the status matters; the body is never read
        Ok(response.status().as_u16())
    }
}

/// Result of one peer invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Response status, or `TRANSPORT_FAILURE_STATUS` when the call never completed
    pub status_code: u16,
    /// Set when the request failed locally
    pub transport_error: Option<PeerError>,
    /// Set when the status report could not be published
    pub report_error: Option<BusError>,
}

/// Calls the designated peer and reports every outcome on the log topic
pub struct PeerInvoker {
    client: Arc<dyn PeerClient>,
    publisher: Arc<dyn MessagePublisher>,
    url: String,
    log_topic: String,
    timestamper: Timestamper,
}

impl PeerInvoker {
    pub fn new(
        client: Arc<dyn PeerClient>,
        publisher: Arc<dyn MessagePublisher>,
        url: String,
        log_topic: String,
        timestamper: Timestamper,
    ) -> Self {
        Self {
            client,
            publisher,
            url,
            log_topic,
            timestamper,
        }
    }

    /// Send `message` to the peer.
    ///
    /// Never fails outright: transport errors become a synthetic 500 and are
    /// pushed to the log topic as text. A `"<status> <time>"` line follows on
    /// the log topic in every case.
    pub async fn invoke(&self, message: &str) -> Invocation {
        let body = PeerMessage {
            message: message.to_string(),
        };

        let (status_code, transport_error) = match self.client.post_message(&self.url, &body).await
        {
            Ok(code) => {
                debug!("Peer {} answered {}", self.url, code);
                (code, None)
            }
            Err(error) => {
                warn!("Peer call to {} failed: {}", self.url, error);
                let entry = LogEntry::TransportError {
                    message: error.to_string(),
                    time: self.timestamper.now(),
                };
                if let Err(e) = self.publisher.publish(&self.log_topic, &entry.payload()).await {
                    warn!("Could not report peer transport error: {}", e);
                }
                (TRANSPORT_FAILURE_STATUS, Some(error))
            }
        };

        let report = LogEntry::StatusReport {
            code: status_code,
            time: self.timestamper.now(),
        };
        let report_error = self
            .publisher
            .publish(&self.log_topic, &report.payload())
            .await
            .err();

        Invocation {
            status_code,
            transport_error,
            report_error,
        }
    }
}
