use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;

use crate::coalesce::{request_key, with_rate_limit_backoff, Coalescer, RATE_LIMIT_MAX_ATTEMPTS};
use crate::config::Config;
use crate::fleet::board::FleetBoard;
use crate::fleet::models::RobotInfo;
use crate::transport::RelayTransport;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Periodic status fetcher for one or many robots.
///
/// Each serial gets its own polling task. A task fetches, records the result
/// on the board, and only then sleeps for the interval — the loop reschedules
/// after settlement, so two requests for the same serial are never in flight
/// at once. Fetches are coalesced per (serial, timeout) and ride the shared
/// rate-limit backoff; any other failure simply waits for the next tick.
pub struct StatusPoller {
    transport: Arc<dyn RelayTransport>,
    coalescer: Arc<Coalescer<RobotInfo>>,
    board: FleetBoard,
    status_timeout: Duration,
    max_rate_limit_attempts: u32,
}

impl StatusPoller {
    pub fn new(transport: Arc<dyn RelayTransport>, board: FleetBoard) -> Self {
        StatusPoller {
            transport,
            coalescer: Arc::new(Coalescer::new()),
            board,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            max_rate_limit_attempts: RATE_LIMIT_MAX_ATTEMPTS,
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn RelayTransport>, board: FleetBoard) -> Self {
        StatusPoller {
            transport,
            coalescer: Arc::new(Coalescer::new()),
            board,
            status_timeout: Duration::from_secs(config.status_timeout_secs),
            max_rate_limit_attempts: config.max_rate_limit_attempts,
        }
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn board(&self) -> &FleetBoard {
        &self.board
    }

    /// Begin polling a single serial. Dropping (or stopping) the returned
    /// handle aborts the loop; no board update happens after that.
    pub fn poll_one(&self, serial: &str, interval: Duration) -> PollHandle {
        self.spawn_loops(std::slice::from_ref(&serial.to_string()), interval)
    }

    /// Fan out independent polling loops across a set of serials. The loops
    /// share nothing but the board and the coalescer, so one robot's failure
    /// or slow response never delays another's updates.
    pub fn poll_many(&self, serials: &[String], interval: Duration) -> PollHandle {
        self.spawn_loops(serials, interval)
    }

    fn spawn_loops(&self, serials: &[String], interval: Duration) -> PollHandle {
        let mut seen = std::collections::HashSet::new();
        let tasks = serials
            .iter()
            .map(|serial| serial.trim())
            .filter(|serial| !serial.is_empty() && seen.insert(serial.to_string()))
            .map(|serial| {
                tokio::spawn(poll_loop(
                    Arc::clone(&self.transport),
                    Arc::clone(&self.coalescer),
                    self.board.clone(),
                    serial.to_string(),
                    interval,
                    self.status_timeout,
                    self.max_rate_limit_attempts,
                ))
            })
            .collect();
        PollHandle { tasks }
    }
}

/// Cancellation handle for a set of polling loops.
pub struct PollHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl PollHandle {
    pub fn stop(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    transport: Arc<dyn RelayTransport>,
    coalescer: Arc<Coalescer<RobotInfo>>,
    board: FleetBoard,
    serial: String,
    interval: Duration,
    status_timeout: Duration,
    max_rate_limit_attempts: u32,
) {
    board.track(&serial, interval).await;

    loop {
        let key = request_key(
            "robot/info",
            &json!({ "serial": serial, "timeout": status_timeout.as_secs() }),
        );
        let request = {
            let transport = Arc::clone(&transport);
            let serial = serial.clone();
            async move {
                with_rate_limit_backoff(
                    || {
                        let transport = Arc::clone(&transport);
                        let serial = serial.clone();
                        async move { transport.robot_info(&serial, status_timeout).await }
                    },
                    max_rate_limit_attempts,
                )
                .await
            }
        };

        match coalescer.run(&key, request).await {
            Ok(info) => board.record_success(&serial, info).await,
            Err(err) => {
                tracing::warn!(serial = %serial, error = %err, "status poll failed");
                board.record_failure(&serial, err.to_string()).await;
            }
        }

        tokio::time::sleep(interval).await;
    }
}
