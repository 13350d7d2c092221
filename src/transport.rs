//! HTTP transport for the robot relay backend.
//!
//! Owns base-URL and bearer-token injection and validates response shapes at
//! the boundary: an envelope that does not match a known variant is rejected
//! as [`RelayError::Malformed`] instead of being duck-typed downstream.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::Config;
use crate::error::RelayError;
use crate::fleet::models::{CommandAck, CommandEnvelope, RobotInfo};

/// Client-side slack on top of the server-side status timeout, so the server
/// gets a chance to answer before the local bound fires.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(2);

/// Seam between the poller/dispatcher and the network. Tests substitute
/// scripted implementations; production wires in [`HttpRelayTransport`].
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// `GET /robot/info/{serial}?timeout={seconds}`
    async fn robot_info(&self, serial: &str, timeout: Duration) -> Result<RobotInfo, RelayError>;

    /// `POST /websocket/command/{serial}`
    async fn send_command(
        &self,
        serial: &str,
        envelope: &CommandEnvelope,
    ) -> Result<CommandAck, RelayError>;
}

/// Wire envelope around telemetry data.
#[derive(Debug, Deserialize)]
struct InfoEnvelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<RobotInfo>,
}

pub struct HttpRelayTransport {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpRelayTransport {
    pub fn new(config: &Config) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.status_timeout_secs) + CLIENT_TIMEOUT_SLACK)
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(HttpRelayTransport {
            client,
            base_url: config.relay_base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RelayTransport for HttpRelayTransport {
    async fn robot_info(&self, serial: &str, timeout: Duration) -> Result<RobotInfo, RelayError> {
        let url = format!("{}/robot/info/{}", self.base_url, serial);
        let request = self
            .client
            .get(&url)
            .query(&[("timeout", timeout.as_secs())])
            .timeout(timeout + CLIENT_TIMEOUT_SLACK);

        let response = self.apply_auth(request).send().await?;
        let response = check_status(response)?;

        let envelope: InfoEnvelope = response
            .json()
            .await
            .map_err(|err| RelayError::Malformed(err.to_string()))?;
        let info = envelope.data.ok_or_else(|| {
            RelayError::Malformed(
                envelope
                    .message
                    .unwrap_or_else(|| "missing telemetry data".to_string()),
            )
        })?;

        // A response is only usable if it echoes the serial it was asked for.
        if info.serial_number != serial {
            return Err(RelayError::Malformed(format!(
                "telemetry for {} arrived on a request for {}",
                info.serial_number, serial
            )));
        }

        Ok(info)
    }

    async fn send_command(
        &self,
        serial: &str,
        envelope: &CommandEnvelope,
    ) -> Result<CommandAck, RelayError> {
        let url = format!("{}/websocket/command/{}", self.base_url, serial);
        let request = self.client.post(&url).json(envelope);

        let response = self.apply_auth(request).send().await?;
        let response = check_status(response)?;

        response
            .json::<CommandAck>()
            .await
            .map_err(|err| RelayError::Malformed(err.to_string()))
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Err(RelayError::RateLimited)
    } else {
        Err(RelayError::Status {
            code: status.as_u16(),
        })
    }
}
