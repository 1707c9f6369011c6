//! `jointmark-kernel` – Limit enforcement
//!
//! Everything that decides whether an operator's manipulation may reach a
//! controller.  The kernel does not talk to any transport; it hands accepted
//! angles to a [`CommandSink`] and lets the caller route them.
//!
//! # Modules
//!
//! - [`limits`] – [`JointLimitTable`][limits::JointLimitTable]: joint name to
//!   declared limits, loaded once from a [`LimitSource`][limits::LimitSource],
//!   plus the effective [`LimitRange`][limits::LimitRange] with the `±4 rad`
//!   fallback.
//! - [`joint_handle`] – [`JointHandle`][joint_handle::JointHandle]: per-joint
//!   state machine turning marker feedback into accept/reject
//!   [`Decision`][joint_handle::Decision]s.
//! - [`marker`] – [`MarkerDescription`][marker::MarkerDescription]: names,
//!   frames and visualization config derived from a joint name.

pub mod joint_handle;
pub mod limits;
pub mod marker;

pub use joint_handle::{CommandSink, Decision, FeedbackSink, JointHandle};
pub use limits::{FALLBACK_LIMIT_RAD, JointLimitTable, LimitRange, LimitSource, TomlLimitSource};
pub use marker::{MarkerDescription, MeshInfo, MeshResolver};
