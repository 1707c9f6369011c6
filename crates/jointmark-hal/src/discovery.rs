//! Controller discovery.
//!
//! [`ControllerManager`] is the controller-management service: it becomes
//! available at some point after startup and then lists every loaded
//! controller with the joints it claims.  Discovery blocks until the service
//! answers; there is no timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use jointmark_middleware::CommandChannel;
use jointmark_types::{ControllerState, JointError, JointSpec};
use serde::Deserialize;
use tracing::{debug, info};

/// Name of the listing service, used in log lines.
pub const LIST_CONTROLLERS_SERVICE: &str = "/controller_manager/list_controllers";

/// The controller-management service.
#[async_trait]
pub trait ControllerManager: Send + Sync {
    /// Resolve once the service can answer [`list_controllers`][Self::list_controllers].
    async fn wait_for_service(&self) -> Result<(), JointError>;

    /// Every loaded controller, in the order the service reports them.
    async fn list_controllers(&self) -> Result<Vec<ControllerState>, JointError>;
}

/// One controller that claims at least one joint, together with the channel
/// its commands go out on.
#[derive(Debug, Clone)]
pub struct ControllerBinding {
    pub controller_name: String,
    /// Claimed joints, in reported order.
    pub joints: Vec<JointSpec>,
    pub channel: CommandChannel,
}

impl ControllerBinding {
    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.joints.iter().map(|j| j.name.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// File-backed controller manager
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ControllerFile {
    #[serde(default)]
    controllers: Vec<ControllerState>,
}

/// [`ControllerManager`] backed by a TOML listing:
///
/// ```toml
/// [[controllers]]
/// name = "head_controller"
/// resources = ["head_1_joint", "head_2_joint"]
/// ```
///
/// The service counts as available once the file exists.
#[derive(Debug, Clone)]
pub struct FileControllerManager {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileControllerManager {
    pub fn new(path: impl AsRef<Path>, poll_interval: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ControllerManager for FileControllerManager {
    async fn wait_for_service(&self) -> Result<(), JointError> {
        let mut announced = false;
        while !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            if !announced {
                info!(
                    path = %self.path.display(),
                    "waiting for {LIST_CONTROLLERS_SERVICE}"
                );
                announced = true;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    async fn list_controllers(&self) -> Result<Vec<ControllerState>, JointError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            JointError::DiscoveryUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        let file: ControllerFile = toml::from_str(&text)
            .map_err(|e| JointError::Config(format!("failed to parse controller list: {e}")))?;
        debug!(count = file.controllers.len(), "controllers listed");
        Ok(file.controllers)
    }
}
