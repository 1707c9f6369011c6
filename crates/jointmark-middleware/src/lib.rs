//! `jointmark-middleware` – routes data between the joint handles, the
//! controllers, and the visualization host without caring about its meaning.
//!
//! # Modules
//!
//! - [`bus`] – topic-partitioned publish/subscribe event bus built on Tokio
//!   broadcast channels, plus per-controller [`CommandChannel`]s.
//! - [`codec`] – rosbridge-style JSON framing for feedback, commands, and
//!   marker refreshes.
//! - [`ws_bridge`] – WebSocket server connecting the bus to the
//!   visualization host.

pub mod bus;
pub mod codec;
pub mod ws_bridge;

pub use bus::{CommandChannel, CommandSubscriber, EventBus, Topic, TopicReceiver};
pub use ws_bridge::WsBridge;
