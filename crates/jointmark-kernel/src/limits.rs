//! [`JointLimitTable`] – joint name → declared position limits.
//!
//! The table is built once at startup from a [`LimitSource`] (normally the
//! robot description) and is read-only afterwards.  Lookups never fail: a
//! joint the source does not know about is reported with a warning and
//! returned as a spec without limits, and [`LimitRange::for_spec`] then
//! substitutes the symmetric fallback range.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use jointmark_types::{JointError, JointSpec};
use serde::Deserialize;
use tracing::{debug, warn};

/// Half-width of the range assumed for joints without declared limits.
pub const FALLBACK_LIMIT_RAD: f64 = 4.0;

/// Anything that can enumerate the movable joints of a robot together with
/// their position limits.
pub trait LimitSource {
    /// Return one [`JointSpec`] per non-fixed joint.
    fn joint_specs(&self) -> Result<Vec<JointSpec>, JointError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LimitRange
// ────────────────────────────────────────────────────────────────────────────

/// Inclusive `[min, max]` range a joint angle must stay within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitRange {
    pub min: f64,
    pub max: f64,
    /// `true` when the range is the fallback rather than a declared limit.
    pub fallback: bool,
}

impl LimitRange {
    /// The symmetric `[-4.0, 4.0]` range used for unlimited joints.
    pub fn fallback() -> Self {
        Self {
            min: -FALLBACK_LIMIT_RAD,
            max: FALLBACK_LIMIT_RAD,
            fallback: true,
        }
    }

    /// Effective range for `spec`.
    ///
    /// # Errors
    ///
    /// [`JointError::Config`] when declared limits are non-finite or
    /// inverted.
    pub fn for_spec(spec: &JointSpec) -> Result<Self, JointError> {
        if !spec.has_limits {
            return Ok(Self::fallback());
        }
        if !spec.min.is_finite() || !spec.max.is_finite() || spec.min > spec.max {
            return Err(JointError::Config(format!(
                "invalid limits for {}: [{}, {}]",
                spec.name, spec.min, spec.max
            )));
        }
        Ok(Self {
            min: spec.min,
            max: spec.max,
            fallback: false,
        })
    }

    pub fn contains(&self, angle: f64) -> bool {
        angle >= self.min && angle <= self.max
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JointLimitTable
// ────────────────────────────────────────────────────────────────────────────

/// Static mapping from joint name to [`JointSpec`].
#[derive(Debug, Default, Clone)]
pub struct JointLimitTable {
    joints: HashMap<String, JointSpec>,
}

impl JointLimitTable {
    /// Build the table from a [`LimitSource`].
    pub fn load(source: &dyn LimitSource) -> Result<Self, JointError> {
        let table = Self::from_specs(source.joint_specs()?);
        debug!(joints = table.len(), "joint limit table loaded");
        Ok(table)
    }

    /// Build the table from already parsed specs.  Later duplicates replace
    /// earlier ones.
    pub fn from_specs(specs: impl IntoIterator<Item = JointSpec>) -> Self {
        let joints = specs.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { joints }
    }

    /// Declared spec for `joint_name`.
    ///
    /// # Errors
    ///
    /// [`JointError::MissingLimitSpec`] when the source never mentioned the
    /// joint.
    pub fn get(&self, joint_name: &str) -> Result<JointSpec, JointError> {
        self.joints
            .get(joint_name)
            .cloned()
            .ok_or_else(|| JointError::MissingLimitSpec(joint_name.to_string()))
    }

    /// Spec for `joint_name`.  Unknown joints come back without limits and a
    /// warning.
    pub fn lookup(&self, joint_name: &str) -> JointSpec {
        self.get(joint_name).unwrap_or_else(|e| {
            warn!(joint = %joint_name, "{e}");
            JointSpec::unlimited(joint_name)
        })
    }

    /// Like [`lookup`](Self::lookup) but silent; the caller reports the
    /// missing entry itself.
    pub fn lookup_quiet(&self, joint_name: &str) -> JointSpec {
        self.get(joint_name)
            .unwrap_or_else(|_| JointSpec::unlimited(joint_name))
    }

    pub fn contains(&self, joint_name: &str) -> bool {
        self.joints.contains_key(joint_name)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TOML-backed source
// ────────────────────────────────────────────────────────────────────────────

/// Kind of joint as declared in the description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JointKind {
    #[default]
    Revolute,
    Prismatic,
    Continuous,
    Fixed,
}

#[derive(Debug, Deserialize)]
struct JointEntry {
    #[serde(default, rename = "type")]
    kind: JointKind,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LimitFile {
    #[serde(default)]
    joints: HashMap<String, JointEntry>,
}

/// [`LimitSource`] reading a TOML joint table:
///
/// ```toml
/// [joints.arm_right_2_joint]
/// type = "revolute"
/// min = -1.5
/// max = 1.5
///
/// [joints.head_1_joint]
/// type = "continuous"
/// ```
///
/// Fixed joints are skipped.  An entry needs both `min` and `max` to count
/// as limited.
#[derive(Debug, Clone)]
pub struct TomlLimitSource {
    raw: TomlInput,
}

#[derive(Debug, Clone)]
enum TomlInput {
    File(PathBuf),
    Inline(String),
}

impl TomlLimitSource {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            raw: TomlInput::File(path.as_ref().to_path_buf()),
        }
    }

    pub fn from_toml_str(text: impl Into<String>) -> Self {
        Self {
            raw: TomlInput::Inline(text.into()),
        }
    }

    fn text(&self) -> Result<String, JointError> {
        match &self.raw {
            TomlInput::File(path) => fs::read_to_string(path).map_err(|e| {
                JointError::Io(format!("failed to read limits at {}: {e}", path.display()))
            }),
            TomlInput::Inline(s) => Ok(s.clone()),
        }
    }
}

impl LimitSource for TomlLimitSource {
    fn joint_specs(&self) -> Result<Vec<JointSpec>, JointError> {
        let file: LimitFile = toml::from_str(&self.text()?)
            .map_err(|e| JointError::Config(format!("failed to parse joint limits: {e}")))?;

        let mut specs: Vec<JointSpec> = file
            .joints
            .into_iter()
            .filter(|(_, entry)| entry.kind != JointKind::Fixed)
            .map(|(name, entry)| match (entry.kind, entry.min, entry.max) {
                (JointKind::Continuous, _, _) => JointSpec::unlimited(name),
                (_, Some(min), Some(max)) => JointSpec::limited(name, min, max),
                _ => JointSpec::unlimited(name),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }
}
