//! Interactive marker naming and layout for one joint.
//!
//! Everything is derived from the joint name: `arm_right_2_joint` gets the
//! base name `arm_right_2`, the marker server `ims_arm_right_2`, the marker
//! `rotate_arm_right_2_joint`, and is attached to frame `arm_right_2_link`.

use jointmark_types::Quaternion;

/// Marker scale used for every joint handle.
pub const MARKER_SCALE: f64 = 0.2;

/// Mesh resource and per-axis scale for a link's visual.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInfo {
    pub resource: String,
    pub scale: [f64; 3],
}

impl MeshInfo {
    /// Parse a whitespace separated `"x y z"` scale as written in robot
    /// descriptions.  Missing or unparsable components default to `1.0`.
    pub fn with_scale_str(resource: impl Into<String>, scale: &str) -> Self {
        let mut parsed = [1.0; 3];
        for (slot, part) in parsed.iter_mut().zip(scale.split_whitespace()) {
            if let Ok(v) = part.parse::<f64>() {
                *slot = v;
            }
        }
        Self {
            resource: resource.into(),
            scale: parsed,
        }
    }
}

/// Resolves the mesh used to draw a link.  Implemented outside the core.
pub trait MeshResolver: Send + Sync {
    fn resolve(&self, link_name: &str) -> Option<MeshInfo>;
}

/// Description of the interactive marker attached to one joint.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDescription {
    pub base_name: String,
    /// Marker server namespace, `ims_<base>`.
    pub server: String,
    pub name: String,
    pub description: String,
    pub frame_id: String,
    pub scale: f64,
    /// Orientation of the rotate-axis control.  `(w=1, y=1)` makes the
    /// control turn about z, matching the yaw extracted from feedback.
    pub control_orientation: Quaternion,
    pub mesh: Option<MeshInfo>,
}

impl MarkerDescription {
    pub fn for_joint(joint_name: &str) -> Self {
        let base_name = base_name(joint_name);
        Self {
            server: format!("ims_{base_name}"),
            name: format!("rotate_{base_name}_joint"),
            description: format!("Rotate {base_name}_joint"),
            frame_id: format!("{base_name}_link"),
            scale: MARKER_SCALE,
            control_orientation: Quaternion::new(0.0, 1.0, 0.0, 1.0),
            mesh: None,
            base_name,
        }
    }

    /// Attach the mesh `resolver` reports for this marker's link, if any.
    pub fn with_mesh_from(mut self, resolver: &dyn MeshResolver) -> Self {
        self.mesh = resolver.resolve(&self.frame_id);
        self
    }

    pub fn update_topic(&self) -> String {
        format!("/{}/update", self.server)
    }

    pub fn feedback_topic(&self) -> String {
        format!("/{}/feedback", self.server)
    }

    /// The visualization display block for this marker server.
    pub fn viz_config_fragment(&self) -> String {
        let name = &self.server;
        format!(
            "        - Class: rviz/InteractiveMarkers\n\
             \x20         Enable Transparency: true\n\
             \x20         Enabled: true\n\
             \x20         Name: {name}\n\
             \x20         Show Axes: false\n\
             \x20         Show Descriptions: false\n\
             \x20         Show Visual Aids: false\n\
             \x20         Update Topic: /{name}/update\n\
             \x20         Value: true\n"
        )
    }
}

/// Strip every `_joint` occurrence, so `arm_right_2_joint` → `arm_right_2`.
pub fn base_name(joint_name: &str) -> String {
    joint_name.replace("_joint", "")
}
