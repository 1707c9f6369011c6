//! [`JointHandle`] – one joint's interaction state and limit enforcement.
//!
//! The handle turns raw marker feedback into a [`Decision`]:
//!
//! * pose updates whose yaw lies inside the joint's [`LimitRange`] are
//!   **accepted**; the handle records the angle and forwards it to its
//!   [`CommandSink`];
//! * pose updates outside the range are **rejected** with a
//!   [`JointError::LimitViolation`] and leave the handle untouched;
//! * orientations that carry no rotation (NaN, infinite, zero length) are
//!   rejected with [`JointError::MalformedFeedback`];
//! * every other interaction (clicks, menu entries, mouse up/down) is only
//!   logged.
//!
//! [`JointHandle::marker_pose`] always reflects the last accepted angle, so
//! a refresh after a rejection snaps the visual back to the accepted state.

use std::sync::Arc;

use jointmark_types::{
    FeedbackEvent, FeedbackEventType, JointError, JointSpec, LimitSide, Quaternion,
};
use tracing::{debug, info, instrument, warn};

use crate::limits::LimitRange;
use crate::marker::MarkerDescription;

/// Receives `(joint, angle)` pairs for accepted feedback.
///
/// Delivery is fire-and-forget: an error is logged by the caller and never
/// undoes the acceptance.
pub trait CommandSink: Send + Sync {
    fn send(&self, joint_name: &str, angle: f64) -> Result<(), JointError>;
}

/// Anything that consumes marker feedback.
pub trait FeedbackSink {
    fn on_feedback(&mut self, event: &FeedbackEvent) -> Decision;
}

/// Outcome of evaluating one feedback event.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Angle recorded and forwarded.
    Accepted { angle: f64 },
    /// Nothing changed; the error says why.
    Rejected(JointError),
    /// Non-pose interaction, logged only.
    Observed(FeedbackEventType),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Interaction state for one controllable joint.
pub struct JointHandle {
    spec: JointSpec,
    range: LimitRange,
    last_accepted_angle: f64,
    controller_name: String,
    marker: MarkerDescription,
    sink: Arc<dyn CommandSink>,
}

impl std::fmt::Debug for JointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JointHandle")
            .field("joint", &self.spec.name)
            .field("controller", &self.controller_name)
            .field("range", &self.range)
            .field("last_accepted_angle", &self.last_accepted_angle)
            .finish()
    }
}

impl JointHandle {
    /// Create a handle for `spec`, owned by `controller_name`.
    ///
    /// `current_angle` is the joint's last reported position, if known.
    /// Joints without declared limits get the fallback range and a warning.
    ///
    /// # Errors
    ///
    /// [`JointError::DiscoveryIncomplete`] when the declared limits are
    /// unusable (inverted or non-finite).
    pub fn create(
        spec: JointSpec,
        current_angle: Option<f64>,
        controller_name: impl Into<String>,
        marker: MarkerDescription,
        sink: Arc<dyn CommandSink>,
    ) -> Result<Self, JointError> {
        let controller_name = controller_name.into();
        let range = LimitRange::for_spec(&spec).map_err(|e| JointError::DiscoveryIncomplete {
            controller: controller_name.clone(),
            joint: spec.name.clone(),
            details: e.to_string(),
        })?;

        if range.fallback {
            let missing = JointError::MissingLimitSpec(spec.name.clone());
            warn!(
                joint = %spec.name,
                min = range.min,
                max = range.max,
                "{missing}, using fallback range"
            );
        } else {
            info!(joint = %spec.name, lower = range.min, upper = range.max, "joint limits set");
        }

        let last_accepted_angle = current_angle.filter(|a| a.is_finite()).unwrap_or(0.0);

        Ok(Self {
            spec,
            range,
            last_accepted_angle,
            controller_name,
            marker,
            sink,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &JointSpec {
        &self.spec
    }

    pub fn range(&self) -> LimitRange {
        self.range
    }

    pub fn controller_name(&self) -> &str {
        &self.controller_name
    }

    pub fn marker(&self) -> &MarkerDescription {
        &self.marker
    }

    pub fn last_accepted_angle(&self) -> f64 {
        self.last_accepted_angle
    }

    /// Orientation the marker should display: the last accepted angle about
    /// the control axis.  Reapplying it is a no-op for the host.
    pub fn marker_pose(&self) -> Quaternion {
        Quaternion::from_yaw(self.last_accepted_angle)
    }

    /// Evaluate one feedback event against the joint's limits.
    #[instrument(level = "debug", skip_all, fields(joint = %self.spec.name))]
    pub fn evaluate_feedback(&mut self, event: &FeedbackEvent) -> Decision {
        log_interaction(event);

        if event.event_type != FeedbackEventType::PoseUpdate {
            return Decision::Observed(event.event_type);
        }

        let Some(unit) = event.orientation.normalized() else {
            let err = JointError::MalformedFeedback {
                joint: self.spec.name.clone(),
                reason: format!("degenerate orientation {:?}", event.orientation),
            };
            warn!(joint = %self.spec.name, error = %err, "feedback rejected");
            return Decision::Rejected(err);
        };

        let (roll, pitch, yaw) = unit.to_euler();
        debug!(roll, pitch, yaw, "r p y");

        if !self.range.contains(yaw) {
            return if yaw > self.range.max {
                self.reject(yaw, self.range.max, LimitSide::Upper)
            } else {
                self.reject(yaw, self.range.min, LimitSide::Lower)
            };
        }

        self.last_accepted_angle = yaw;
        if let Err(e) = self.sink.send(&self.spec.name, yaw) {
            debug!(joint = %self.spec.name, error = %e, "command not delivered");
        }
        Decision::Accepted { angle: yaw }
    }

    fn reject(&self, attempted: f64, bound: f64, side: LimitSide) -> Decision {
        warn!(
            joint = %self.spec.name,
            attempted,
            bound,
            %side,
            "going past {side} joint limit on {}: {attempted} vs {bound}",
            self.marker.base_name
        );
        Decision::Rejected(JointError::LimitViolation {
            joint: self.spec.name.clone(),
            attempted,
            bound,
            side,
        })
    }
}

impl FeedbackSink for JointHandle {
    fn on_feedback(&mut self, event: &FeedbackEvent) -> Decision {
        self.evaluate_feedback(event)
    }
}

fn log_interaction(event: &FeedbackEvent) {
    let mouse = event
        .mouse_point
        .map(|p| format!(" at {}, {}, {} in frame {}", p.x, p.y, p.z, event.frame_id))
        .unwrap_or_default();
    match event.event_type {
        FeedbackEventType::MenuSelect => info!(
            marker = %event.marker_name,
            control = %event.control_name,
            menu_entry = event.menu_entry_id,
            "menu item {} clicked{mouse}", event.menu_entry_id
        ),
        FeedbackEventType::KeepAlive => debug!(marker = %event.marker_name, "keep alive"),
        kind => info!(
            marker = %event.marker_name,
            control = %event.control_name,
            "{kind}{mouse}"
        ),
    }
}
