//! `jointmark-runtime` – Process plumbing
//!
//! # Modules
//!
//! - [`feedback_loop`] – [`FeedbackLoop`][feedback_loop::FeedbackLoop]: the
//!   single task that owns the [`JointRegistry`][jointmark_hal::JointRegistry],
//!   drains marker feedback from the bus and publishes marker refreshes and
//!   operator alerts.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.

pub mod feedback_loop;
pub mod telemetry;

pub use feedback_loop::{FeedbackLoop, FeedbackStats};
pub use telemetry::{TracerProviderGuard, init_tracing};
