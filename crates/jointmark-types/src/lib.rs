//! Shared vocabulary for the jointmark workspace: joint limit specs, marker
//! feedback events, trajectory commands, bus events, and the global error
//! type.

pub mod orientation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use orientation::{Point3, Quaternion};

/// Limits declared for one controllable joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSpec {
    pub name: String,
    /// `false` when the robot description declares no position limits.
    pub has_limits: bool,
    pub min: f64,
    pub max: f64,
}

impl JointSpec {
    /// A spec with declared position limits.
    pub fn limited(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            has_limits: true,
            min,
            max,
        }
    }

    /// A spec for a joint without declared position limits.
    pub fn unlimited(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_limits: false,
            min: 0.0,
            max: 0.0,
        }
    }
}

/// What the operator did to an interactive marker.
///
/// Discriminants match the wire values used by the visualization host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FeedbackEventType {
    KeepAlive = 0,
    PoseUpdate = 1,
    MenuSelect = 2,
    ButtonClick = 3,
    MouseDown = 4,
    MouseUp = 5,
}

impl TryFrom<u8> for FeedbackEventType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::KeepAlive,
            1 => Self::PoseUpdate,
            2 => Self::MenuSelect,
            3 => Self::ButtonClick,
            4 => Self::MouseDown,
            5 => Self::MouseUp,
            other => return Err(format!("unknown feedback event type {other}")),
        })
    }
}

impl From<FeedbackEventType> for u8 {
    fn from(value: FeedbackEventType) -> Self {
        value as u8
    }
}

impl std::fmt::Display for FeedbackEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::KeepAlive => "keep alive",
            Self::PoseUpdate => "pose changed",
            Self::MenuSelect => "menu select",
            Self::ButtonClick => "button click",
            Self::MouseDown => "mouse down",
            Self::MouseUp => "mouse up",
        };
        f.write_str(s)
    }
}

/// One operator interaction reported by the visualization host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub marker_name: String,
    pub control_name: String,
    pub event_type: FeedbackEventType,
    pub orientation: Quaternion,
    /// Present only when the host reports a valid mouse position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse_point: Option<Point3>,
    pub frame_id: String,
    #[serde(default)]
    pub menu_entry_id: u32,
}

/// A single trajectory waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointTrajectoryPoint {
    pub positions: Vec<f64>,
    pub time_from_start_secs: f64,
}

/// A joint-indexed trajectory: `points[i].positions[j]` targets
/// `joint_names[j]`.  Joints not listed are left untouched by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<JointTrajectoryPoint>,
}

impl JointTrajectory {
    /// A one-joint, one-point trajectory.
    pub fn single(joint: impl Into<String>, position: f64, time_from_start_secs: f64) -> Self {
        Self {
            joint_names: vec![joint.into()],
            points: vec![JointTrajectoryPoint {
                positions: vec![position],
                time_from_start_secs,
            }],
        }
    }
}

/// A controller as reported by the controller-management service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub name: String,
    /// Joints claimed by the controller, in reported order.
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Which bound a rejected angle crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitSide {
    Upper,
    Lower,
}

impl std::fmt::Display for LimitSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upper => f.write_str("upper"),
            Self::Lower => f.write_str("lower"),
        }
    }
}

/// Unified event wrapper for the internal bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"jointmark-hal::emitter"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the internal bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Operator interaction arriving from the visualization host.
    Feedback(FeedbackEvent),
    /// Trajectory command addressed to `topic` (`/<controller>/command`).
    Command {
        topic: String,
        trajectory: JointTrajectory,
    },
    /// Pose the host must display for a marker after a feedback cycle.
    MarkerPose {
        server: String,
        marker_name: String,
        orientation: Quaternion,
    },
    /// Non-fatal problem worth showing to an operator.
    Fault { component: String, message: String },
}

/// Global error type for limit checks, discovery, and transport.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JointError {
    #[error("limit violation on {joint}: {attempted} crosses {side} limit {bound}")]
    LimitViolation {
        joint: String,
        attempted: f64,
        bound: f64,
        side: LimitSide,
    },

    #[error("no joint limits found for {0}")]
    MissingLimitSpec(String),

    #[error("malformed feedback for {joint}: {reason}")]
    MalformedFeedback { joint: String, reason: String },

    #[error("controller manager unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("could not register {joint} on {controller}: {details}")]
    DiscoveryIncomplete {
        controller: String,
        joint: String,
        details: String,
    },

    #[error("no handle registered for marker {0}")]
    UnknownMarker(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),
}
