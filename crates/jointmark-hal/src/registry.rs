//! [`JointRegistry`] – controller discovery, handle construction and
//! feedback dispatch.
//!
//! Startup happens in two steps:
//!
//! 1. [`discover`][JointRegistry::discover] waits for the controller manager
//!    and turns every controller that claims at least one joint into a
//!    [`ControllerBinding`] with its own command channel.
//! 2. [`build_handles`][JointRegistry::build_handles] creates one
//!    [`JointHandle`] per joint, wires it to a [`CommandEmitter`] on its
//!    controller's channel and registers it under its marker name.
//!
//! Afterwards [`dispatch`][JointRegistry::dispatch] routes each feedback event
//! to the handle that owns the marker.
//!
//! Problems found while building handles never abort startup.  They are
//! collected in a [`RegistryReport`]:
//!
//! | Entry | Meaning |
//! |---|---|
//! | `fallback_limits` | joint has no declared limits, `±4 rad` assumed |
//! | `duplicates` | joint already claimed by an earlier controller; the first claim wins |
//! | `failures` | handle could not be created (invalid limits, marker name clash) |
//! | `skipped_controllers` | controller claims no joints |

use std::collections::HashMap;
use std::sync::Arc;

use jointmark_kernel::{
    Decision, FeedbackSink, JointHandle, JointLimitTable, MarkerDescription, MeshResolver,
};
use jointmark_middleware::EventBus;
use jointmark_types::{EventPayload, FeedbackEvent, FeedbackEventType, JointError, Quaternion};
use tracing::{info, instrument, warn};

use crate::discovery::{ControllerBinding, ControllerManager, LIST_CONTROLLERS_SERVICE};
use crate::emitter::{CommandEmitter, DEFAULT_TIME_FROM_START_SECS};

/// A joint claimed by more than one controller.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateJoint {
    pub joint: String,
    /// Controller that owns the registered handle.
    pub owner: String,
    /// Later controller whose claim was ignored.
    pub ignored: String,
}

/// Outcome of [`JointRegistry::build_handles`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryReport {
    pub fallback_limits: Vec<String>,
    pub duplicates: Vec<DuplicateJoint>,
    pub failures: Vec<JointError>,
    pub skipped_controllers: Vec<String>,
}

impl RegistryReport {
    /// `true` when every claimed joint got a handle.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Pose a marker must be shown at after a feedback cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRefresh {
    pub server: String,
    pub marker_name: String,
    pub orientation: Quaternion,
}

impl MarkerRefresh {
    fn for_handle(handle: &JointHandle) -> Self {
        let marker = handle.marker();
        Self {
            server: marker.server.clone(),
            marker_name: marker.name.clone(),
            orientation: handle.marker_pose(),
        }
    }

    pub fn into_payload(self) -> EventPayload {
        EventPayload::MarkerPose {
            server: self.server,
            marker_name: self.marker_name,
            orientation: self.orientation,
        }
    }
}

/// Result of routing one feedback event.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub joint: String,
    pub decision: Decision,
    /// Set for pose updates, accepted or not.
    pub refresh: Option<MarkerRefresh>,
}

/// Owns every [`JointHandle`] and the marker-name dispatch table.
pub struct JointRegistry {
    bus: EventBus,
    limits: JointLimitTable,
    initial_positions: HashMap<String, f64>,
    mesh_resolver: Option<Arc<dyn MeshResolver>>,
    time_from_start_secs: f64,
    handles: Vec<JointHandle>,
    by_marker: HashMap<String, usize>,
    by_joint: HashMap<String, usize>,
    report: RegistryReport,
}

impl JointRegistry {
    /// Registry whose commands go out on `bus` and whose limits come from
    /// `limits`.
    pub fn new(bus: EventBus, limits: JointLimitTable) -> Self {
        Self {
            bus,
            limits,
            initial_positions: HashMap::new(),
            mesh_resolver: None,
            time_from_start_secs: DEFAULT_TIME_FROM_START_SECS,
            handles: Vec::new(),
            by_marker: HashMap::new(),
            by_joint: HashMap::new(),
            report: RegistryReport::default(),
        }
    }

    /// Last reported joint positions used as each handle's starting angle.
    pub fn with_initial_positions(mut self, positions: HashMap<String, f64>) -> Self {
        self.initial_positions = positions;
        self
    }

    pub fn with_mesh_resolver(mut self, resolver: Arc<dyn MeshResolver>) -> Self {
        self.mesh_resolver = Some(resolver);
        self
    }

    pub fn with_time_from_start(mut self, secs: f64) -> Self {
        self.time_from_start_secs = secs;
        self
    }

    /// Wait for the controller manager, then bind every controller that
    /// claims at least one joint.
    ///
    /// Overlapping joint sets are kept as reported; deduplication happens in
    /// [`build_handles`][Self::build_handles].
    #[instrument(level = "info", skip_all)]
    pub async fn discover(
        &mut self,
        manager: &dyn ControllerManager,
    ) -> Result<Vec<ControllerBinding>, JointError> {
        info!("connecting to {LIST_CONTROLLERS_SERVICE}");
        manager.wait_for_service().await?;
        info!("connected");

        let mut bindings = Vec::new();
        for state in manager.list_controllers().await? {
            if state.resources.is_empty() {
                info!(controller = %state.name, "controller claims no joints, skipped");
                self.report.skipped_controllers.push(state.name);
                continue;
            }
            info!(controller = %state.name, joints = ?state.resources, "controller claims joints");
            let joints = state
                .resources
                .iter()
                .map(|name| self.limits.lookup_quiet(name))
                .collect();
            bindings.push(ControllerBinding {
                channel: self.bus.command_channel(&state.name),
                controller_name: state.name,
                joints,
            });
        }
        Ok(bindings)
    }

    /// Create and register one handle per joint in `bindings`.
    pub fn build_handles(&mut self, bindings: &[ControllerBinding]) -> &RegistryReport {
        for binding in bindings {
            let emitter = Arc::new(
                CommandEmitter::new(binding.channel.clone())
                    .with_time_from_start(self.time_from_start_secs),
            );
            for spec in &binding.joints {
                if let Some(&idx) = self.by_joint.get(&spec.name) {
                    let owner = self.handles[idx].controller_name().to_string();
                    warn!(
                        joint = %spec.name,
                        %owner,
                        ignored = %binding.controller_name,
                        "joint claimed by more than one controller"
                    );
                    self.report.duplicates.push(DuplicateJoint {
                        joint: spec.name.clone(),
                        owner,
                        ignored: binding.controller_name.clone(),
                    });
                    continue;
                }

                let mut marker = MarkerDescription::for_joint(&spec.name);
                if let Some(resolver) = &self.mesh_resolver {
                    marker = marker.with_mesh_from(resolver.as_ref());
                }
                if self.by_marker.contains_key(&marker.name) {
                    self.fail(JointError::DiscoveryIncomplete {
                        controller: binding.controller_name.clone(),
                        joint: spec.name.clone(),
                        details: format!("marker name {} already in use", marker.name),
                    });
                    continue;
                }

                let current = self.initial_positions.get(&spec.name).copied();
                let handle = match JointHandle::create(
                    spec.clone(),
                    current,
                    binding.controller_name.clone(),
                    marker,
                    emitter.clone(),
                ) {
                    Ok(h) => h,
                    Err(e) => {
                        self.fail(e);
                        continue;
                    }
                };
                self.register(handle);
            }
        }
        info!(
            handles = self.handles.len(),
            failures = self.report.failures.len(),
            duplicates = self.report.duplicates.len(),
            "joint handles built"
        );
        &self.report
    }

    fn register(&mut self, handle: JointHandle) {
        if handle.range().fallback {
            self.report.fallback_limits.push(handle.name().to_string());
        }
        let idx = self.handles.len();
        self.by_marker.insert(handle.marker().name.clone(), idx);
        self.by_joint.insert(handle.name().to_string(), idx);
        self.handles.push(handle);
    }

    fn fail(&mut self, err: JointError) {
        warn!(error = %err, "joint handle not created");
        self.report.failures.push(err);
    }

    /// Route `event` to the handle owning its marker.
    ///
    /// # Errors
    ///
    /// [`JointError::UnknownMarker`] when no handle is registered under
    /// `event.marker_name`.
    pub fn dispatch(&mut self, event: &FeedbackEvent) -> Result<Dispatch, JointError> {
        let idx = *self
            .by_marker
            .get(&event.marker_name)
            .ok_or_else(|| JointError::UnknownMarker(event.marker_name.clone()))?;
        let handle = &mut self.handles[idx];
        let decision = handle.on_feedback(event);
        let refresh = (event.event_type == FeedbackEventType::PoseUpdate)
            .then(|| MarkerRefresh::for_handle(handle));
        Ok(Dispatch {
            joint: handle.name().to_string(),
            decision,
            refresh,
        })
    }

    /// Current pose of every marker, in registration order.
    pub fn marker_refreshes(&self) -> Vec<MarkerRefresh> {
        self.handles.iter().map(MarkerRefresh::for_handle).collect()
    }

    /// Visualization display blocks, concatenated in registration order.
    pub fn viz_config(&self) -> String {
        self.handles
            .iter()
            .map(|h| h.marker().viz_config_fragment())
            .collect()
    }

    pub fn handle(&self, joint_name: &str) -> Option<&JointHandle> {
        self.by_joint.get(joint_name).map(|&i| &self.handles[i])
    }

    pub fn handles(&self) -> &[JointHandle] {
        &self.handles
    }

    pub fn report(&self) -> &RegistryReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimControllerManager;
    use jointmark_kernel::{MeshInfo, TomlLimitSource};
    use jointmark_types::{JointSpec, LimitSide, Point3};

    const LIMITS: &str = r#"
        [joints.arm_right_1_joint]
        min = -2.0
        max = 2.0

        [joints.arm_right_2_joint]
        min = -1.5
        max = 1.5

        [joints.head_2_joint]
        min = -0.9
        max = 0.9
    "#;

    fn limits() -> JointLimitTable {
        JointLimitTable::load(&TomlLimitSource::from_toml_str(LIMITS)).unwrap()
    }

    fn manager() -> SimControllerManager {
        SimControllerManager::builder()
            .with_controller("joint_state_controller", &[])
            .with_controller("arm_right_controller", &["arm_right_1_joint", "arm_right_2_joint"])
            .with_controller("head_controller", &["head_1_joint", "head_2_joint"])
            .build()
    }

    async fn registry(bus: &EventBus) -> JointRegistry {
        let mut reg = JointRegistry::new(bus.clone(), limits());
        let bindings = reg.discover(&manager()).await.unwrap();
        reg.build_handles(&bindings);
        reg
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

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unlimited_joint_is_reported_once() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let reg = registry(&EventBus::default()).await;
        assert!(reg.handle("head_1_joint").unwrap().range().fallback);

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let warnings: Vec<_> = text
            .lines()
            .filter(|l| l.contains("no joint limits found for head_1_joint"))
            .collect();
        assert_eq!(warnings.len(), 1, "{text}");
        assert!(warnings[0].contains("WARN"));
    }

    #[tokio::test]
    async fn zero_resource_controllers_get_no_binding() {
        let mut reg = JointRegistry::new(EventBus::default(), limits());
        let bindings = reg.discover(&manager()).await.unwrap();

        let names: Vec<_> = bindings.iter().map(|b| b.controller_name.as_str()).collect();
        assert_eq!(names, vec!["arm_right_controller", "head_controller"]);
        assert_eq!(bindings[1].channel.topic(), "/head_controller/command");
        assert_eq!(
            bindings[0].joint_names().collect::<Vec<_>>(),
            vec!["arm_right_1_joint", "arm_right_2_joint"]
        );
        assert_eq!(reg.report().skipped_controllers, vec!["joint_state_controller"]);
    }

    #[tokio::test]
    async fn one_handle_per_joint_with_owning_controller() {
        let reg = registry(&EventBus::default()).await;
        assert_eq!(reg.len(), 4);
        assert_eq!(
            reg.handle("head_2_joint").unwrap().controller_name(),
            "head_controller"
        );
        assert_eq!(
            reg.handle("arm_right_2_joint").unwrap().controller_name(),
            "arm_right_controller"
        );
        assert!(reg.report().is_complete());
    }

    #[tokio::test]
    async fn missing_limits_fall_back() {
        let reg = registry(&EventBus::default()).await;
        assert_eq!(reg.report().fallback_limits, vec!["head_1_joint"]);
        let range = reg.handle("head_1_joint").unwrap().range();
        assert_eq!((range.min, range.max), (-4.0, 4.0));
    }

    #[tokio::test]
    async fn accepted_feedback_reaches_owning_controller() {
        let bus = EventBus::default();
        let mut arm_cmds = bus.subscribe_commands("/arm_right_controller/");
        let mut reg = registry(&bus).await;

        let d = reg.dispatch(&pose("rotate_arm_right_2_joint", 1.0)).unwrap();
        assert_eq!(d.joint, "arm_right_2_joint");
        assert!(d.decision.is_accepted());

        let (topic, trajectory) = arm_cmds.recv().await.unwrap();
        assert_eq!(topic, "/arm_right_controller/command");
        assert_eq!(trajectory.joint_names, vec!["arm_right_2_joint".to_string()]);
        assert!((trajectory.points[0].positions[0] - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejected_feedback_restores_marker() {
        let bus = EventBus::default();
        let mut cmds = bus.subscribe_to(jointmark_middleware::Topic::Commands);
        let mut reg = registry(&bus).await;

        let accepted = reg.dispatch(&pose("rotate_arm_right_2_joint", 1.0)).unwrap();
        cmds.recv().await.unwrap();

        let rejected = reg.dispatch(&pose("rotate_arm_right_2_joint", 2.0)).unwrap();
        assert!(matches!(
            rejected.decision,
            Decision::Rejected(JointError::LimitViolation { side: LimitSide::Upper, .. })
        ));
        assert_eq!(rejected.refresh, accepted.refresh);
        assert!(cmds.try_recv().is_err(), "no command after a reject");
        assert!(
            (reg.handle("arm_right_2_joint").unwrap().last_accepted_angle() - 1.0).abs() < 1e-9
        );
    }

    #[tokio::test]
    async fn non_pose_events_carry_no_refresh() {
        let mut reg = registry(&EventBus::default()).await;
        let mut ev = pose("rotate_head_1_joint", 0.0);
        ev.event_type = FeedbackEventType::ButtonClick;
        ev.mouse_point = Some(Point3::new(1.0, 0.0, 0.0));
        let d = reg.dispatch(&ev).unwrap();
        assert_eq!(d.decision, Decision::Observed(FeedbackEventType::ButtonClick));
        assert!(d.refresh.is_none());
    }

    #[tokio::test]
    async fn unknown_marker_is_an_error() {
        let mut reg = registry(&EventBus::default()).await;
        assert!(matches!(
            reg.dispatch(&pose("rotate_gripper_joint", 0.0)),
            Err(JointError::UnknownMarker(_))
        ));
    }

    #[tokio::test]
    async fn overlapping_controllers_keep_first_claim() {
        let manager = SimControllerManager::builder()
            .with_controller("head_controller", &["head_1_joint", "head_2_joint"])
            .with_controller("head_pan_controller", &["head_1_joint"])
            .build();
        let mut reg = JointRegistry::new(EventBus::default(), limits());
        let bindings = reg.discover(&manager).await.unwrap();
        assert_eq!(bindings.len(), 2);

        let report = reg.build_handles(&bindings).clone();
        assert_eq!(reg.len(), 2);
        assert_eq!(
            report.duplicates,
            vec![DuplicateJoint {
                joint: "head_1_joint".to_string(),
                owner: "head_controller".to_string(),
                ignored: "head_pan_controller".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn invalid_limits_are_reported_not_dropped() {
        let table = JointLimitTable::from_specs([JointSpec::limited("wrist_joint", 1.0, -1.0)]);
        let manager = SimControllerManager::builder()
            .with_controller("wrist_controller", &["wrist_joint", "finger_joint"])
            .build();
        let mut reg = JointRegistry::new(EventBus::default(), table);
        let bindings = reg.discover(&manager).await.unwrap();
        let report = reg.build_handles(&bindings);

        assert!(!report.is_complete());
        assert!(matches!(
            &report.failures[0],
            JointError::DiscoveryIncomplete { joint, controller, .. }
                if joint == "wrist_joint" && controller == "wrist_controller"
        ));
        assert_eq!(reg.len(), 1);
        assert!(reg.handle("finger_joint").is_some());
    }

    #[tokio::test]
    async fn marker_name_clash_is_a_failure() {
        // Both joints map to the base name `elbow`.
        let manager = SimControllerManager::builder()
            .with_controller("arm_controller", &["elbow_joint", "elbow"])
            .build();
        let mut reg = JointRegistry::new(EventBus::default(), JointLimitTable::default());
        let bindings = reg.discover(&manager).await.unwrap();
        let report = reg.build_handles(&bindings);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn discovery_error_propagates() {
        let mut reg = JointRegistry::new(EventBus::default(), limits());
        let manager = SimControllerManager::builder().failing().build();
        assert!(matches!(
            reg.discover(&manager).await,
            Err(JointError::DiscoveryUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn viz_config_follows_registration_order() {
        let reg = registry(&EventBus::default()).await;
        let cfg = reg.viz_config();
        let order: Vec<_> = cfg
            .lines()
            .filter_map(|l| l.trim().strip_prefix("Name: "))
            .collect();
        assert_eq!(
            order,
            vec!["ims_arm_right_1", "ims_arm_right_2", "ims_head_1", "ims_head_2"]
        );
    }

    #[tokio::test]
    async fn initial_positions_seed_handles() {
        let mut reg = JointRegistry::new(EventBus::default(), limits())
            .with_initial_positions(HashMap::from([("head_2_joint".to_string(), 0.4)]));
        let bindings = reg.discover(&manager()).await.unwrap();
        reg.build_handles(&bindings);

        assert_eq!(reg.handle("head_2_joint").unwrap().last_accepted_angle(), 0.4);
        let refresh = reg
            .marker_refreshes()
            .into_iter()
            .find(|r| r.server == "ims_head_2")
            .unwrap();
        let (_, _, yaw) = refresh.orientation.to_euler();
        assert!((yaw - 0.4).abs() < 1e-9);
    }

    struct HeadMeshes;

    impl MeshResolver for HeadMeshes {
        fn resolve(&self, link_name: &str) -> Option<MeshInfo> {
            link_name
                .starts_with("head")
                .then(|| MeshInfo::with_scale_str(format!("package://robot/{link_name}.stl"), ""))
        }
    }

    #[tokio::test]
    async fn mesh_resolver_decorates_markers() {
        let mut reg = JointRegistry::new(EventBus::default(), limits())
            .with_mesh_resolver(Arc::new(HeadMeshes));
        let bindings = reg.discover(&manager()).await.unwrap();
        reg.build_handles(&bindings);
        assert!(reg.handle("head_1_joint").unwrap().marker().mesh.is_some());
        assert!(reg.handle("arm_right_1_joint").unwrap().marker().mesh.is_none());
    }
}
