//! [`FeedbackLoop`] – the task that owns every joint handle.
//!
//! Feedback arrives on [`Topic::Feedback`]; each event is routed through
//! [`JointRegistry::dispatch`].  After every pose update the marker's
//! authoritative pose goes out on [`Topic::MarkerUpdates`], so a rejected
//! drag snaps back to the last accepted angle.  Rejections are also published
//! as [`EventPayload::Fault`] on [`Topic::SystemAlerts`].
//!
//! Being the registry's only owner, the loop needs no locks: feedback is
//! handled strictly one event at a time.

use jointmark_hal::registry::Dispatch;
use jointmark_hal::JointRegistry;
use jointmark_kernel::Decision;
use jointmark_middleware::{EventBus, Topic, TopicReceiver};
use jointmark_types::{Event, EventPayload, FeedbackEvent, JointError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const SOURCE: &str = "jointmark-runtime::feedback_loop";

/// Counters kept across the loop's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackStats {
    pub accepted: u64,
    pub rejected: u64,
    pub observed: u64,
    pub unknown_marker: u64,
}

pub struct FeedbackLoop {
    bus: EventBus,
    registry: JointRegistry,
    feedback: TopicReceiver,
    stats: FeedbackStats,
}

impl FeedbackLoop {
    /// Subscribes to feedback immediately so nothing published after this
    /// call is missed.
    pub fn new(bus: EventBus, registry: JointRegistry) -> Self {
        let feedback = bus.subscribe_to(Topic::Feedback);
        Self {
            bus,
            registry,
            feedback,
            stats: FeedbackStats::default(),
        }
    }

    pub fn registry(&self) -> &JointRegistry {
        &self.registry
    }

    pub fn stats(&self) -> FeedbackStats {
        self.stats
    }

    /// Publish every marker's current pose.  The bus latches them for hosts
    /// that connect later.
    pub fn publish_initial_poses(&self) {
        for refresh in self.registry.marker_refreshes() {
            self.publish(Topic::MarkerUpdates, refresh.into_payload());
        }
    }

    /// Process feedback until `shutdown` flips to `true` or the bus closes.
    /// Returns the registry so the caller can inspect final state.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> (JointRegistry, FeedbackStats) {
        info!(handles = self.registry.len(), "feedback loop running");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = self.feedback.recv() => match received {
                    Ok(event) => {
                        if let EventPayload::Feedback(feedback) = &event.payload {
                            self.handle_feedback(feedback);
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(lagged_by = n, "feedback loop lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!(
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            "feedback loop stopped"
        );
        (self.registry, self.stats)
    }

    /// Route one feedback event and publish what follows from it.
    pub fn handle_feedback(&mut self, feedback: &FeedbackEvent) -> Option<Dispatch> {
        let dispatch = match self.registry.dispatch(feedback) {
            Ok(d) => d,
            Err(JointError::UnknownMarker(marker)) => {
                debug!(%marker, "feedback for unregistered marker");
                self.stats.unknown_marker += 1;
                return None;
            }
            Err(e) => {
                warn!(error = %e, "feedback dispatch failed");
                return None;
            }
        };

        match &dispatch.decision {
            Decision::Accepted { .. } => self.stats.accepted += 1,
            Decision::Observed(_) => self.stats.observed += 1,
            Decision::Rejected(err) => {
                self.stats.rejected += 1;
                self.publish(
                    Topic::SystemAlerts,
                    EventPayload::Fault {
                        component: dispatch.joint.clone(),
                        message: err.to_string(),
                    },
                );
            }
        }

        if let Some(refresh) = dispatch.refresh.clone() {
            self.publish(Topic::MarkerUpdates, refresh.into_payload());
        }
        Some(dispatch)
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        if let Err(e) = self.bus.publish_to(topic, Event::new(SOURCE, payload)) {
            debug!(?topic, error = %e, "nothing listening");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jointmark_hal::SimControllerManager;
    use jointmark_kernel::JointLimitTable;
    use jointmark_types::{FeedbackEventType, JointSpec, Quaternion};
    use std::time::Duration;

    async fn feedback_loop(bus: &EventBus) -> FeedbackLoop {
        let limits = JointLimitTable::from_specs([JointSpec::limited("arm_right_2_joint", -1.5, 1.5)]);
        let manager = SimControllerManager::builder()
            .with_controller("arm_right_controller", &["arm_right_2_joint"])
            .with_controller("head_controller", &["head_1_joint"])
            .build();
        let mut registry = JointRegistry::new(bus.clone(), limits);
        let bindings = registry.discover(&manager).await.unwrap();
        registry.build_handles(&bindings);
        FeedbackLoop::new(bus.clone(), registry)
    }

    fn pose(marker: &str, yaw: f64) -> FeedbackEvent {
        FeedbackEvent {
            marker_name: marker.to_string(),
            control_name: String::new(),
            event_type: FeedbackEventType::PoseUpdate,
            orientation: Quaternion::from_yaw(yaw),
            mouse_point: None,
            frame_id: String::new(),
            menu_entry_id: 0,
        }
    }

    fn yaw_of(event: &Event) -> f64 {
        match &event.payload {
            EventPayload::MarkerPose { orientation, .. } => orientation.to_euler().2,
            other => panic!("expected MarkerPose, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn accept_then_reject_round_trip() {
        let bus = EventBus::default();
        let mut commands = bus.subscribe_to(Topic::Commands);
        let mut markers = bus.subscribe_to(Topic::MarkerUpdates);
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let mut fl = feedback_loop(&bus).await;

        fl.handle_feedback(&pose("rotate_arm_right_2_joint", 1.0)).unwrap();
        let cmd = commands.try_recv().unwrap();
        assert!(matches!(
            cmd.payload,
            EventPayload::Command { ref topic, .. } if topic == "/arm_right_controller/command"
        ));
        assert!((yaw_of(&markers.try_recv().unwrap()) - 1.0).abs() < 1e-9);

        fl.handle_feedback(&pose("rotate_arm_right_2_joint", 2.0)).unwrap();
        assert!(commands.try_recv().is_err());
        assert!((yaw_of(&markers.try_recv().unwrap()) - 1.0).abs() < 1e-9);
        match alerts.try_recv().unwrap().payload {
            EventPayload::Fault { component, message } => {
                assert_eq!(component, "arm_right_2_joint");
                assert!(message.contains("upper"));
            }
            other => panic!("expected Fault, got {other:?}"),
        }

        assert_eq!(
            fl.stats(),
            FeedbackStats {
                accepted: 1,
                rejected: 1,
                observed: 0,
                unknown_marker: 0
            }
        );
    }

    #[tokio::test]
    async fn unknown_marker_is_counted_not_fatal() {
        let bus = EventBus::default();
        let mut fl = feedback_loop(&bus).await;
        assert!(fl.handle_feedback(&pose("rotate_torso_joint", 0.0)).is_none());
        assert_eq!(fl.stats().unknown_marker, 1);
    }

    #[tokio::test]
    async fn initial_poses_cover_every_marker() {
        let bus = EventBus::default();
        let mut markers = bus.subscribe_to(Topic::MarkerUpdates);
        let fl = feedback_loop(&bus).await;
        fl.publish_initial_poses();
        assert!(markers.try_recv().is_ok());
        assert!(markers.try_recv().is_ok());
        assert!(markers.try_recv().is_err());
    }

    #[tokio::test]
    async fn initial_poses_are_latched_before_any_listener() {
        let bus = EventBus::default();
        let fl = feedback_loop(&bus).await;
        fl.publish_initial_poses();

        let latched = bus.latest_marker_poses();
        assert_eq!(latched.len(), 2);
        for event in &latched {
            match &event.payload {
                EventPayload::MarkerPose { orientation, .. } => {
                    assert_eq!(*orientation, Quaternion::from_yaw(0.0));
                }
                other => panic!("expected MarkerPose, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn run_consumes_bus_feedback_until_shutdown() {
        let bus = EventBus::default();
        let mut head_cmds = bus.subscribe_commands("/head_controller/");
        let fl = feedback_loop(&bus).await;
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(fl.run(stop_rx));

        bus.publish_to(
            Topic::Feedback,
            Event::new("test", EventPayload::Feedback(pose("rotate_head_1_joint", 3.0))),
        )
        .unwrap();

        let (_, trajectory) = tokio::time::timeout(Duration::from_secs(2), head_cmds.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trajectory.joint_names, vec!["head_1_joint".to_string()]);

        stop_tx.send(true).unwrap();
        let (registry, stats) = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.accepted, 1);
        assert!((registry.handle("head_1_joint").unwrap().last_accepted_angle() - 3.0).abs() < 1e-9);
    }
}
