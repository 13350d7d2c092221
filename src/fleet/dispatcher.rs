use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use crate::coalesce::{with_rate_limit_backoff, RATE_LIMIT_MAX_ATTEMPTS};
use crate::config::Config;
use crate::error::RelayError;
use crate::fleet::models::{
    AckStatus, CommandEnvelope, CommandKind, CommandOutcome, OutcomeStatus,
};
use crate::transport::RelayTransport;

/// Delivery hook for per-outcome notifications (a toast, a log line, a test
/// recorder). Dispatch is fully functional without one.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, outcome: &CommandOutcome);
}

/// Delivers a logical command to one or many robots via the relay.
///
/// Targets are dispatched concurrently and independently: an error for one
/// serial is folded into that serial's outcome and never blocks, cancels, or
/// rolls back the others.
pub struct CommandDispatcher {
    transport: Arc<dyn RelayTransport>,
    notifier: Option<Arc<dyn Notifier>>,
    max_rate_limit_attempts: u32,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
        CommandDispatcher {
            transport,
            notifier: None,
            max_rate_limit_attempts: RATE_LIMIT_MAX_ATTEMPTS,
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn RelayTransport>) -> Self {
        CommandDispatcher {
            transport,
            notifier: None,
            max_rate_limit_attempts: config.max_rate_limit_attempts,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Relay `kind` with `payload` to every serial in `serials`.
    ///
    /// Outcomes come back in target order. The only error returned from the
    /// call itself is an empty target list; everything per-target is reported
    /// inside the outcomes.
    pub async fn dispatch(
        &self,
        serials: &[String],
        kind: CommandKind,
        payload: Value,
    ) -> Result<Vec<CommandOutcome>, RelayError> {
        let targets = normalize_targets(serials)?;
        let envelope = CommandEnvelope::new(kind, payload);

        let outcomes = join_all(
            targets
                .iter()
                .map(|serial| self.dispatch_one(serial, kind, &envelope)),
        )
        .await;

        if let Some(notifier) = &self.notifier {
            for outcome in &outcomes {
                notifier.notify(outcome).await;
            }
        }

        Ok(outcomes)
    }

    /// Start a WebRTC control session on the given robots.
    pub async fn start_session(&self, serials: &[String]) -> Result<Vec<CommandOutcome>, RelayError> {
        self.dispatch(serials, CommandKind::WebrtcStart, Value::Object(Default::default()))
            .await
    }

    /// Stop a WebRTC control session on the given robots.
    pub async fn stop_session(&self, serials: &[String]) -> Result<Vec<CommandOutcome>, RelayError> {
        self.dispatch(serials, CommandKind::WebrtcStop, Value::Object(Default::default()))
            .await
    }

    async fn dispatch_one(
        &self,
        serial: &str,
        kind: CommandKind,
        envelope: &CommandEnvelope,
    ) -> CommandOutcome {
        let result = with_rate_limit_backoff(
            || async move { self.transport.send_command(serial, envelope).await },
            self.max_rate_limit_attempts,
        )
        .await;

        match result {
            Ok(ack) if ack.status == AckStatus::Sent => {
                tracing::info!(
                    serial = %serial,
                    kind = kind.wire_name(),
                    active_clients = ack.active_clients,
                    "command relayed"
                );
                CommandOutcome {
                    target_serial: serial.to_string(),
                    status: OutcomeStatus::Sent,
                    message: success_message(kind, serial),
                    raw_response: serde_json::to_value(&ack).ok(),
                }
            }
            Ok(ack) => CommandOutcome {
                target_serial: serial.to_string(),
                status: OutcomeStatus::Failed,
                message: failure_message(kind, serial, "relay reported failure"),
                raw_response: serde_json::to_value(&ack).ok(),
            },
            Err(err) => {
                tracing::warn!(serial = %serial, kind = kind.wire_name(), error = %err, "command dispatch failed");
                CommandOutcome {
                    target_serial: serial.to_string(),
                    status: OutcomeStatus::Failed,
                    message: failure_message(kind, serial, &err.to_string()),
                    raw_response: None,
                }
            }
        }
    }
}

fn normalize_targets(serials: &[String]) -> Result<Vec<String>, RelayError> {
    let mut seen = HashSet::new();
    let targets: Vec<String> = serials
        .iter()
        .map(|serial| serial.trim())
        .filter(|serial| !serial.is_empty() && seen.insert(serial.to_string()))
        .map(str::to_string)
        .collect();

    if targets.is_empty() {
        return Err(RelayError::NoTargets);
    }
    Ok(targets)
}

pub fn success_message(kind: CommandKind, serial: &str) -> String {
    match kind {
        CommandKind::WebrtcStart => format!("Đã bắt đầu phiên điều khiển robot {serial}"),
        CommandKind::WebrtcStop => format!("Đã dừng phiên điều khiển robot {serial}"),
        other => format!("Đã gửi lệnh {} tới robot {serial}", other.wire_name()),
    }
}

pub fn failure_message(kind: CommandKind, serial: &str, reason: &str) -> String {
    format!(
        "Gửi lệnh {} tới robot {serial} thất bại: {reason}",
        kind.wire_name()
    )
}
