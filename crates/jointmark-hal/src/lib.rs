//! `jointmark-hal` – Controller discovery and command wiring
//!
//! Connects the limit-enforcing [`JointHandle`][jointmark_kernel::JointHandle]s
//! to the robot's controllers.
//!
//! # Modules
//!
//! - [`discovery`] – [`ControllerManager`][discovery::ControllerManager]: the
//!   controller-management service, plus a file-backed implementation.
//! - [`emitter`] – [`CommandEmitter`][emitter::CommandEmitter]: turns an
//!   accepted angle into a single-joint trajectory on the owning
//!   controller's command channel.
//! - [`registry`] – [`JointRegistry`][registry::JointRegistry]: discovers
//!   controllers, builds one handle per joint and routes feedback to it.
//! - [`sim`] – [`SimControllerManager`][sim::SimControllerManager]: in-process
//!   controller manager for tests and CI.

pub mod discovery;
pub mod emitter;
pub mod registry;
pub mod sim;

pub use discovery::{ControllerBinding, ControllerManager, FileControllerManager};
pub use emitter::CommandEmitter;
pub use registry::{Dispatch, JointRegistry, RegistryReport};
pub use sim::SimControllerManager;
