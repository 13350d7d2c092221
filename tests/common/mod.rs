#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fleetlink::fleet::models::{AckStatus, CommandAck, CommandEnvelope, RobotInfo};
use fleetlink::{RelayError, RelayTransport};

/// Transport double with per-serial scripted behavior. Tracks every call and
/// the peak number of concurrently outstanding requests per serial, so tests
/// can assert the no-overlap and isolation guarantees.
pub struct ScriptedTransport {
    delay: Duration,
    failing: HashSet<String>,
    charging: HashSet<String>,
    calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, serde_json::Value)>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        ScriptedTransport {
            delay: Duration::ZERO,
            failing: HashSet::new(),
            charging: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Every request takes this long before resolving.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests for this serial always fail with a transport error.
    pub fn fail_for(mut self, serial: &str) -> Self {
        self.failing.insert(serial.to_string());
        self
    }

    /// Telemetry for this serial reports the robot as charging.
    pub fn charging_for(mut self, serial: &str) -> Self {
        self.charging.insert(serial.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, serial: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == serial)
            .count()
    }

    pub fn max_in_flight(&self, serial: &str) -> usize {
        self.max_in_flight
            .lock()
            .unwrap()
            .get(serial)
            .copied()
            .unwrap_or(0)
    }

    /// Every command envelope posted, as (serial, body) pairs.
    pub fn sent_envelopes(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().unwrap().clone()
    }

    fn begin(&self, serial: &str) {
        self.calls.lock().unwrap().push(serial.to_string());
        let mut in_flight = self.in_flight.lock().unwrap();
        let count = in_flight.entry(serial.to_string()).or_insert(0);
        *count += 1;
        let mut max = self.max_in_flight.lock().unwrap();
        let peak = max.entry(serial.to_string()).or_insert(0);
        *peak = (*peak).max(*count);
    }

    fn end(&self, serial: &str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(count) = in_flight.get_mut(serial) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl RelayTransport for ScriptedTransport {
    async fn robot_info(&self, serial: &str, _timeout: Duration) -> Result<RobotInfo, RelayError> {
        self.begin(serial);
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        let result = if self.failing.contains(serial) {
            Err(RelayError::Transport("injected failure".to_string()))
        } else {
            Ok(RobotInfo {
                serial_number: serial.to_string(),
                firmware_version: Some("1.2.0".to_string()),
                ctrl_version: Some("0.4.2".to_string()),
                battery_level: Some(80),
                is_charging: Some(self.charging.contains(serial)),
            })
        };
        self.end(serial);
        result
    }

    async fn send_command(
        &self,
        serial: &str,
        envelope: &CommandEnvelope,
    ) -> Result<CommandAck, RelayError> {
        self.begin(serial);
        let body = serde_json::to_value(envelope).unwrap();
        self.sent
            .lock()
            .unwrap()
            .push((serial.to_string(), body.clone()));
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        let result = if self.failing.contains(serial) {
            Err(RelayError::Transport("injected failure".to_string()))
        } else {
            Ok(CommandAck {
                status: AckStatus::Sent,
                to: serial.to_string(),
                command: body,
                active_clients: 1,
            })
        };
        self.end(serial);
        result
    }
}
