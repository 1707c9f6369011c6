//! rosbridge-style JSON framing.
//!
//! The visualization host speaks the rosbridge v2 protocol: every frame is a
//! JSON object with an `op` field.  Only `publish` frames are relevant here:
//!
//! * inbound  `/<server>/feedback` – `visualization_msgs/InteractiveMarkerFeedback`
//! * outbound `/<controller>/command` – `trajectory_msgs/JointTrajectory`
//! * outbound `/<server>/update` – marker pose refresh
//! * outbound `/jointmark/alerts` – operator-visible faults

use jointmark_types::{
    Event, EventPayload, FeedbackEvent, FeedbackEventType, JointError, JointTrajectory, Point3,
    Quaternion,
};
use serde::Deserialize;
use serde_json::{Value, json};

/// Topic that carries [`EventPayload::Fault`] frames to the host.
pub const ALERT_TOPIC: &str = "/jointmark/alerts";

// ────────────────────────────────────────────────────────────────────────────
// Outbound
// ────────────────────────────────────────────────────────────────────────────

/// Build the publish frame for a trajectory command.
pub fn encode_command(topic: &str, trajectory: &JointTrajectory) -> Value {
    let points: Vec<Value> = trajectory
        .points
        .iter()
        .map(|p| {
            let (secs, nsecs) = split_duration(p.time_from_start_secs);
            json!({
                "positions": p.positions,
                "velocities": [],
                "accelerations": [],
                "effort": [],
                "time_from_start": { "secs": secs, "nsecs": nsecs }
            })
        })
        .collect();
    json!({
        "op": "publish",
        "topic": topic,
        "msg": {
            "joint_names": trajectory.joint_names,
            "points": points
        }
    })
}

/// Build the publish frame that moves a marker to `orientation`.
pub fn encode_marker_pose(server: &str, marker_name: &str, orientation: Quaternion) -> Value {
    json!({
        "op": "publish",
        "topic": format!("/{server}/update"),
        "msg": {
            "marker_name": marker_name,
            "pose": {
                "position": { "x": 0.0, "y": 0.0, "z": 0.0 },
                "orientation": {
                    "x": orientation.x,
                    "y": orientation.y,
                    "z": orientation.z,
                    "w": orientation.w
                }
            }
        }
    })
}

/// Translate a bus event into the frame sent to the host, if it has one.
///
/// Feedback events are inbound only and produce `None`.
pub fn encode_event(event: &Event) -> Option<Value> {
    match &event.payload {
        EventPayload::Command { topic, trajectory } => Some(encode_command(topic, trajectory)),
        EventPayload::MarkerPose {
            server,
            marker_name,
            orientation,
        } => Some(encode_marker_pose(server, marker_name, *orientation)),
        EventPayload::Fault { component, message } => Some(json!({
            "op": "publish",
            "topic": ALERT_TOPIC,
            "msg": { "component": component, "message": message }
        })),
        EventPayload::Feedback(_) => None,
    }
}

fn split_duration(secs: f64) -> (i64, i64) {
    let secs = secs.max(0.0);
    let whole = secs.trunc();
    let nsecs = ((secs - whole) * 1e9).round() as i64;
    if nsecs >= 1_000_000_000 {
        (whole as i64 + 1, 0)
    } else {
        (whole as i64, nsecs)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inbound
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Frame {
    op: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    msg: Option<Value>,
}

#[derive(Deserialize, Default)]
struct WireHeader {
    #[serde(default)]
    frame_id: String,
}

#[derive(Deserialize)]
struct WireQuaternion {
    x: f64,
    y: f64,
    z: f64,
    w: f64,
}

#[derive(Deserialize)]
struct WirePose {
    orientation: WireQuaternion,
}

#[derive(Deserialize)]
struct WirePoint {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Deserialize)]
struct WireFeedback {
    #[serde(default)]
    header: WireHeader,
    marker_name: String,
    #[serde(default)]
    control_name: String,
    event_type: u8,
    pose: WirePose,
    #[serde(default)]
    menu_entry_id: u32,
    #[serde(default)]
    mouse_point: Option<WirePoint>,
    #[serde(default)]
    mouse_point_valid: bool,
}

/// Decode an inbound text frame into a [`FeedbackEvent`].
///
/// # Errors
///
/// [`JointError::Serialization`] when the frame is not a `publish` on a
/// `/feedback` topic or the message body does not parse.
pub fn decode_feedback(text: &str) -> Result<FeedbackEvent, JointError> {
    let frame: Frame =
        serde_json::from_str(text).map_err(|e| JointError::Serialization(e.to_string()))?;
    if frame.op != "publish" || !frame.topic.ends_with("/feedback") {
        return Err(JointError::Serialization(format!(
            "not a feedback publish: op={} topic={}",
            frame.op, frame.topic
        )));
    }
    let msg = frame
        .msg
        .ok_or_else(|| JointError::Serialization("feedback frame without msg".to_string()))?;
    let wire: WireFeedback =
        serde_json::from_value(msg).map_err(|e| JointError::Serialization(e.to_string()))?;
    let event_type =
        FeedbackEventType::try_from(wire.event_type).map_err(JointError::Serialization)?;

    let mouse_point = match (wire.mouse_point_valid, wire.mouse_point) {
        (true, Some(p)) => Some(Point3::new(p.x, p.y, p.z)),
        _ => None,
    };
    let o = wire.pose.orientation;

    Ok(FeedbackEvent {
        marker_name: wire.marker_name,
        control_name: wire.control_name,
        event_type,
        orientation: Quaternion::new(o.x, o.y, o.z, o.w),
        mouse_point,
        frame_id: wire.header.frame_id,
        menu_entry_id: wire.menu_entry_id,
    })
}
