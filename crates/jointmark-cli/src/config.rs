//! Package configuration – `<package>/config/jointmark.toml`.
//!
//! Every field has a default, and a missing file means "all defaults".
//! Relative paths are resolved against the package directory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use jointmark_kernel::{MeshInfo, MeshResolver};
use jointmark_types::JointError;
use serde::{Deserialize, Serialize};

/// Install-path override for the package directory.
pub const PACKAGE_PATH_VAR: &str = "JOINTMARK_PACKAGE_PATH";

/// Mesh drawn for one link's marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshEntry {
    pub resource: String,
    /// Whitespace separated `"x y z"`.
    #[serde(default = "default_mesh_scale")]
    pub scale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the visualization bridge listens on.
    #[serde(default = "default_bridge_addr")]
    pub bridge_addr: String,

    /// Controller listing served in place of the controller manager.
    #[serde(default = "default_controllers_file")]
    pub controllers_file: PathBuf,

    /// Joint limit table.
    #[serde(default = "default_limits_file")]
    pub limits_file: PathBuf,

    /// Time the controller gets to reach each commanded position.
    #[serde(default = "default_time_from_start")]
    pub time_from_start_secs: f64,

    /// How often to check whether the controller manager is up.
    #[serde(default = "default_discovery_poll_ms")]
    pub discovery_poll_ms: u64,

    /// Last known joint positions, used as each marker's starting angle.
    #[serde(default)]
    pub initial_positions: BTreeMap<String, f64>,

    /// Link name → mesh.
    #[serde(default)]
    pub meshes: BTreeMap<String, MeshEntry>,
}

fn default_bridge_addr() -> String {
    "127.0.0.1:9090".to_string()
}
fn default_controllers_file() -> PathBuf {
    PathBuf::from("config/controllers.toml")
}
fn default_limits_file() -> PathBuf {
    PathBuf::from("config/joint_limits.toml")
}
fn default_time_from_start() -> f64 {
    1.0
}
fn default_discovery_poll_ms() -> u64 {
    500
}
fn default_mesh_scale() -> String {
    "1 1 1".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_addr: default_bridge_addr(),
            controllers_file: default_controllers_file(),
            limits_file: default_limits_file(),
            time_from_start_secs: default_time_from_start(),
            discovery_poll_ms: default_discovery_poll_ms(),
            initial_positions: BTreeMap::new(),
            meshes: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn controllers_path(&self, package: &Path) -> PathBuf {
        package.join(&self.controllers_file)
    }

    pub fn limits_path(&self, package: &Path) -> PathBuf {
        package.join(&self.limits_file)
    }

    pub fn initial_positions(&self) -> HashMap<String, f64> {
        self.initial_positions
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn mesh_resolver(&self) -> ConfigMeshResolver {
        ConfigMeshResolver {
            meshes: self.meshes.clone(),
        }
    }
}

/// [`MeshResolver`] backed by the `[meshes]` table.
#[derive(Debug, Clone, Default)]
pub struct ConfigMeshResolver {
    meshes: BTreeMap<String, MeshEntry>,
}

impl MeshResolver for ConfigMeshResolver {
    fn resolve(&self, link_name: &str) -> Option<MeshInfo> {
        self.meshes
            .get(link_name)
            .map(|m| MeshInfo::with_scale_str(&m.resource, &m.scale))
    }
}

/// Package directory: `$JOINTMARK_PACKAGE_PATH`, else the working directory.
pub fn package_path() -> PathBuf {
    std::env::var_os(PACKAGE_PATH_VAR)
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_path(package: &Path) -> PathBuf {
    package.join("config").join("jointmark.toml")
}

/// Load the config at `path`; defaults when the file does not exist.
pub fn load_from(path: &Path) -> Result<Config, JointError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| JointError::Io(format!("failed to read config at {}: {e}", path.display())))?;
    toml::from_str(&raw).map_err(|e| JointError::Config(format!("failed to parse config: {e}")))
}

/// Write `cfg` to `path`, creating parent directories.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), JointError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| JointError::Io(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| JointError::Serialization(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| JointError::Io(format!("failed to write config at {}: {e}", path.display())))
}
