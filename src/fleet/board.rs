use super::models::{RobotInfo, RobotPresence, RobotStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A robot is ONLINE only while its last successful poll is younger than
/// `poll_interval * STALE_INTERVAL_MULTIPLIER`.
pub const STALE_INTERVAL_MULTIPLIER: u32 = 3;
/// Interval assumed for entries recorded before any poll loop registered one.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Per-robot bookkeeping held by the board.
#[derive(Debug, Clone)]
pub struct TrackedRobot {
    pub status: Option<RobotStatus>,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub poll_interval: Duration,
}

impl TrackedRobot {
    fn new(poll_interval: Duration) -> Self {
        TrackedRobot {
            status: None,
            last_error: None,
            last_success: None,
            poll_interval,
        }
    }
}

/// Shared in-memory view of the fleet's last known telemetry.
///
/// Held only for the lifetime of the owning session; polling tasks write
/// into it, consumers read snapshots out of it. A failed poll never erases
/// the last known-good status, it only flags the error next to it.
#[derive(Debug, Clone, Default)]
pub struct FleetBoard {
    robots: Arc<RwLock<HashMap<String, TrackedRobot>>>,
}

impl FleetBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a serial before its first poll so consumers can already see
    /// it (as OFFLINE) and so staleness is judged against the right interval.
    pub async fn track(&self, serial: &str, poll_interval: Duration) {
        let mut robots = self.robots.write().await;
        robots
            .entry(serial.to_string())
            .and_modify(|entry| entry.poll_interval = poll_interval)
            .or_insert_with(|| TrackedRobot::new(poll_interval));
    }

    pub async fn record_success(&self, serial: &str, info: RobotInfo) {
        self.record_success_at(serial, info, Utc::now()).await;
    }

    /// Overwrite the entry with a fresh observation and clear the error flag.
    pub async fn record_success_at(&self, serial: &str, info: RobotInfo, observed_at: DateTime<Utc>) {
        let mut robots = self.robots.write().await;
        let entry = robots
            .entry(serial.to_string())
            .or_insert_with(|| TrackedRobot::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)));
        entry.status = Some(RobotStatus::from_info(info, observed_at));
        entry.last_error = None;
        entry.last_success = Some(observed_at);
    }

    /// Flag a failed poll. The previous status, if any, is preserved so the
    /// consumer can keep showing last known values with a stale indicator.
    pub async fn record_failure(&self, serial: &str, reason: String) {
        let mut robots = self.robots.write().await;
        let entry = robots
            .entry(serial.to_string())
            .or_insert_with(|| TrackedRobot::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)));
        entry.last_error = Some(reason);
    }

    pub async fn status(&self, serial: &str) -> Option<RobotStatus> {
        let robots = self.robots.read().await;
        robots.get(serial).and_then(|entry| entry.status.clone())
    }

    pub async fn last_error(&self, serial: &str) -> Option<String> {
        let robots = self.robots.read().await;
        robots.get(serial).and_then(|entry| entry.last_error.clone())
    }

    pub async fn presence(&self, serial: &str) -> RobotPresence {
        self.presence_at(serial, Utc::now()).await
    }

    /// Presence as of `now`. OFFLINE beats everything once the last success
    /// falls outside the staleness window; CHARGING beats ONLINE inside it.
    pub async fn presence_at(&self, serial: &str, now: DateTime<Utc>) -> RobotPresence {
        let robots = self.robots.read().await;
        let Some(entry) = robots.get(serial) else {
            return RobotPresence::Offline;
        };
        let Some(last_success) = entry.last_success else {
            return RobotPresence::Offline;
        };

        let stale_after_ms =
            entry.poll_interval.as_millis() as i64 * i64::from(STALE_INTERVAL_MULTIPLIER);
        if (now - last_success).num_milliseconds() >= stale_after_ms {
            return RobotPresence::Offline;
        }

        match &entry.status {
            Some(status) if status.is_charging => RobotPresence::Charging,
            Some(_) => RobotPresence::Online,
            None => RobotPresence::Offline,
        }
    }

    /// Point-in-time copy of every tracked robot.
    pub async fn snapshot(&self) -> HashMap<String, TrackedRobot> {
        self.robots.read().await.clone()
    }
}
