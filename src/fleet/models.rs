use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Telemetry payload reported by the relay for one robot.
///
/// `serial_number` echoes the serial the request was issued for; the
/// transport verifies the echo so a late response can never be attributed
/// to the wrong robot.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RobotInfo {
    pub serial_number: String,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub ctrl_version: Option<String>,
    #[serde(default)]
    pub battery_level: Option<u8>,
    #[serde(default)]
    pub is_charging: Option<bool>,
}

/// Last observed telemetry snapshot for one robot.
///
/// `battery_level` stays `None` when the robot has never reported it; an
/// unknown reading is never replaced with a fabricated value.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RobotStatus {
    pub serial: String,
    pub battery_level: Option<u8>,
    pub is_charging: bool,
    pub firmware_version: Option<String>,
    pub control_version: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl RobotStatus {
    pub fn from_info(info: RobotInfo, observed_at: DateTime<Utc>) -> Self {
        RobotStatus {
            serial: info.serial_number,
            battery_level: info.battery_level,
            is_charging: info.is_charging.unwrap_or(false),
            firmware_version: info.firmware_version,
            control_version: info.ctrl_version,
            observed_at,
        }
    }
}

/// Derived presence tag. CHARGING wins over ONLINE; a robot with no recent
/// successful poll is OFFLINE no matter what data is still cached for it.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotPresence {
    Online,
    Offline,
    Charging,
}

/// Recognized command categories. The wire `type` field is the serde name,
/// so an unknown category can never be smuggled through dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Action,
    Dance,
    Expression,
    SkillHelper,
    ExtendedAction,
    #[serde(rename = "process-text")]
    ProcessText,
    WebrtcStart,
    WebrtcStop,
}

impl CommandKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            CommandKind::Action => "action",
            CommandKind::Dance => "dance",
            CommandKind::Expression => "expression",
            CommandKind::SkillHelper => "skill_helper",
            CommandKind::ExtendedAction => "extended_action",
            CommandKind::ProcessText => "process-text",
            CommandKind::WebrtcStart => "webrtc_start",
            CommandKind::WebrtcStop => "webrtc_stop",
        }
    }

    /// WebRTC session commands carry an empty payload and no language tag.
    pub fn is_session_control(&self) -> bool {
        matches!(self, CommandKind::WebrtcStart | CommandKind::WebrtcStop)
    }
}

/// Body posted to the relay's command endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CommandEnvelope {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl CommandEnvelope {
    pub fn new(kind: CommandKind, payload: Value) -> Self {
        if kind.is_session_control() {
            CommandEnvelope {
                kind,
                data: Value::Object(Default::default()),
                lang: None,
            }
        } else {
            CommandEnvelope {
                kind,
                data: payload,
                lang: Some("vi".to_string()),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Sent,
    Failed,
}

/// Structured acknowledgment returned by the relay for one command post.
/// Any body that does not match this shape is a malformed-response error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAck {
    pub status: AckStatus,
    pub to: String,
    pub command: Value,
    #[serde(default)]
    pub active_clients: u32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Sent,
    Failed,
}

/// Result of one command dispatch attempt against one robot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub target_serial: String,
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl CommandOutcome {
    pub fn is_sent(&self) -> bool {
        self.status == OutcomeStatus::Sent
    }
}
