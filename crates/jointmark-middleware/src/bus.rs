//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Feedback`] | Marker interactions arriving from the visualization host |
//! | [`Topic::Commands`] | Joint-trajectory commands addressed to controllers |
//! | [`Topic::MarkerUpdates`] | Poses the host must display after each feedback cycle |
//! | [`Topic::SystemAlerts`] | Limit violations, discovery gaps, shutdown notices |
//!
//! [`Topic::MarkerUpdates`] is latched: the bus keeps the newest pose per
//! `(server, marker)` so a host that connects late can be brought up to date
//! with [`EventBus::latest_marker_poses`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use jointmark_types::{Event, EventPayload, JointError, JointTrajectory};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Feedback,
    Commands,
    MarkerUpdates,
    SystemAlerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    feedback: broadcast::Sender<Event>,
    commands: broadcast::Sender<Event>,
    marker_updates: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
    latched_poses: Arc<Mutex<BTreeMap<(String, String), Event>>>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (feedback, _) = broadcast::channel(capacity);
        let (commands, _) = broadcast::channel(capacity);
        let (marker_updates, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            feedback,
            commands,
            marker_updates,
            system_alerts,
            latched_poses: Arc::default(),
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`JointError::Channel`] when nobody is listening on the topic.
    /// Marker poses are latched even when nobody is listening.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, JointError> {
        if topic == Topic::MarkerUpdates {
            self.latch_pose(&event);
        }
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| JointError::Channel(format!("no subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to [`Topic::Commands`], keeping only commands whose
    /// destination starts with `prefix` (e.g. `"/head_controller"`).
    pub fn subscribe_commands(&self, prefix: impl Into<String>) -> CommandSubscriber {
        CommandSubscriber {
            prefix: prefix.into(),
            receiver: self.commands.subscribe(),
        }
    }

    /// A publish handle addressed to `/<controller_name>/command`.
    pub fn command_channel(&self, controller_name: &str) -> CommandChannel {
        CommandChannel {
            topic: format!("/{controller_name}/command"),
            sender: self.commands.clone(),
        }
    }

    /// Newest latched pose of every marker, ordered by server then marker.
    pub fn latest_marker_poses(&self) -> Vec<Event> {
        self.latched_poses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    fn latch_pose(&self, event: &Event) {
        let EventPayload::MarkerPose {
            server,
            marker_name,
            ..
        } = &event.payload
        else {
            return;
        };
        self.latched_poses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((server.clone(), marker_name.clone()), event.clone());
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Feedback => &self.feedback,
            Topic::Commands => &self.commands,
            Topic::MarkerUpdates => &self.marker_updates,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Command channel
// ---------------------------------------------------------------------------

/// Publish handle for one controller's command topic.
///
/// Cloning is cheap; every joint on a controller shares the same channel and
/// each publish is a complete message, so no locking is required.
#[derive(Clone, Debug)]
pub struct CommandChannel {
    topic: String,
    sender: broadcast::Sender<Event>,
}

impl CommandChannel {
    /// Destination topic, `/<controller>/command`.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Send `trajectory` to the controller.
    ///
    /// Returns the number of bus receivers handed the command, or
    /// [`JointError::Channel`] when none is listening.
    pub fn publish(&self, source: &str, trajectory: JointTrajectory) -> Result<usize, JointError> {
        let event = Event::new(
            source,
            EventPayload::Command {
                topic: self.topic.clone(),
                trajectory,
            },
        );
        self.sender
            .send(event)
            .map_err(|_| JointError::Channel(format!("no subscribers for {}", self.topic)))
    }
}

// ---------------------------------------------------------------------------
// Receivers
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// `Err(RecvError::Lagged(n))` means `n` events were dropped because the
    /// receiver fell behind; `Err(RecvError::Closed)` means the bus is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// A [`Topic::Commands`] subscriber filtered by destination prefix.
pub struct CommandSubscriber {
    prefix: String,
    receiver: broadcast::Receiver<Event>,
}

impl CommandSubscriber {
    /// Wait for the next command whose destination matches the prefix.
    ///
    /// Returns `None` when the bus is closed.
    pub async fn recv(&mut self) -> Option<(String, JointTrajectory)> {
        loop {
            match self.receiver.recv().await {
                Ok(Event {
                    payload: EventPayload::Command { topic, trajectory },
                    ..
                }) if topic.starts_with(&self.prefix) => return Some((topic, trajectory)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(prefix = %self.prefix, lagged_by = n, "CommandSubscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
