//! [`CommandEmitter`] – accepted angle → trajectory command.
//!
//! Every command is a single-point trajectory naming only the moved joint,
//! so the controller leaves its other joints where they are.

use jointmark_kernel::CommandSink;
use jointmark_middleware::CommandChannel;
use jointmark_types::{JointError, JointTrajectory};
use tracing::debug;

const SOURCE: &str = "jointmark-hal::emitter";

/// Default time the controller is given to reach a commanded position.
pub const DEFAULT_TIME_FROM_START_SECS: f64 = 1.0;

/// Publishes accepted angles on one controller's command channel.
#[derive(Debug, Clone)]
pub struct CommandEmitter {
    channel: CommandChannel,
    time_from_start_secs: f64,
}

impl CommandEmitter {
    pub fn new(channel: CommandChannel) -> Self {
        Self {
            channel,
            time_from_start_secs: DEFAULT_TIME_FROM_START_SECS,
        }
    }

    pub fn with_time_from_start(mut self, secs: f64) -> Self {
        self.time_from_start_secs = secs;
        self
    }

    pub fn topic(&self) -> &str {
        self.channel.topic()
    }

    /// Publish `angle` for `joint_name`.
    ///
    /// # Errors
    ///
    /// [`JointError::Channel`] when nothing is listening on the command lane.
    pub fn emit(&self, joint_name: &str, angle: f64) -> Result<(), JointError> {
        let trajectory = JointTrajectory::single(joint_name, angle, self.time_from_start_secs);
        let receivers = self.channel.publish(SOURCE, trajectory)?;
        debug!(topic = %self.channel.topic(), joint = %joint_name, angle, receivers, "command sent");
        Ok(())
    }
}

impl CommandSink for CommandEmitter {
    fn send(&self, joint_name: &str, angle: f64) -> Result<(), JointError> {
        self.emit(joint_name, angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jointmark_middleware::EventBus;

    #[tokio::test]
    async fn emits_single_joint_trajectory() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe_commands("/arm_right_controller");
        let emitter =
            CommandEmitter::new(bus.command_channel("arm_right_controller")).with_time_from_start(0.5);

        emitter.send("arm_right_2_joint", 1.0).unwrap();

        let (topic, trajectory) = sub.recv().await.unwrap();
        assert_eq!(topic, "/arm_right_controller/command");
        assert_eq!(trajectory.joint_names, vec!["arm_right_2_joint".to_string()]);
        assert_eq!(trajectory.points.len(), 1);
        assert_eq!(trajectory.points[0].positions, vec![1.0]);
        assert_eq!(trajectory.points[0].time_from_start_secs, 0.5);
    }

    #[test]
    fn send_without_listeners_is_channel_error() {
        let bus = EventBus::default();
        let emitter = CommandEmitter::new(bus.command_channel("head_controller"));
        assert_eq!(emitter.topic(), "/head_controller/command");
        assert!(matches!(
            emitter.send("head_1_joint", 0.2),
            Err(JointError::Channel(_))
        ));
    }
}
