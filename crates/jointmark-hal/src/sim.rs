//! [`SimControllerManager`] – in-process controller manager for tests and CI.
//!
//! Serves a fixed controller listing without a running robot.
//!
//! # Example
//!
//! ```rust
//! use jointmark_hal::sim::SimControllerManager;
//!
//! let manager = SimControllerManager::builder()
//!     .with_controller("joint_state_controller", &[])
//!     .with_controller("head_controller", &["head_1_joint", "head_2_joint"])
//!     .build();
//! ```

use std::time::Duration;

use async_trait::async_trait;
use jointmark_types::{ControllerState, JointError};
use tracing::debug;

use crate::discovery::ControllerManager;

/// Builder and implementation in one: configure with the `with_*` methods,
/// then [`build`][Self::build].
#[derive(Debug, Default, Clone)]
pub struct SimControllerManager {
    controllers: Vec<ControllerState>,
    startup_delay: Duration,
    fail_listing: bool,
}

impl SimControllerManager {
    pub fn builder() -> Self {
        Self::default()
    }

    /// Add a controller claiming `joints`, in order.
    pub fn with_controller(mut self, name: impl Into<String>, joints: &[&str]) -> Self {
        self.controllers.push(ControllerState {
            name: name.into(),
            resources: joints.iter().map(|j| j.to_string()).collect(),
        });
        self
    }

    /// Delay before the service reports itself available.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Make every listing call fail with [`JointError::DiscoveryUnavailable`].
    pub fn failing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn build(self) -> Self {
        self
    }
}

#[async_trait]
impl ControllerManager for SimControllerManager {
    async fn wait_for_service(&self) -> Result<(), JointError> {
        if !self.startup_delay.is_zero() {
            debug!(delay_ms = self.startup_delay.as_millis() as u64, "sim controller manager starting");
            tokio::time::sleep(self.startup_delay).await;
        }
        Ok(())
    }

    async fn list_controllers(&self) -> Result<Vec<ControllerState>, JointError> {
        if self.fail_listing {
            return Err(JointError::DiscoveryUnavailable(
                "sim controller manager configured to fail".to_string(),
            ));
        }
        Ok(self.controllers.clone())
    }
}
