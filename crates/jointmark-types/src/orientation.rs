//! Minimal rotation primitives used by the marker feedback path.
//!
//! Quaternions arrive from the visualization host in `(x, y, z, w)` order and
//! are converted to roll/pitch/yaw using the static XYZ convention, so yaw is
//! the rotation about the fixed z axis.
//!
//! ```rust
//! use jointmark_types::orientation::Quaternion;
//!
//! let q = Quaternion::from_yaw(0.75);
//! let (_, _, yaw) = q.to_euler();
//! assert!((yaw - 0.75).abs() < 1e-12);
//! ```

use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

/// Quaternions whose norm falls below this are treated as degenerate.
pub const MIN_QUATERNION_NORM: f64 = 1e-9;

/// A 3-D point, used for the optional mouse position attached to feedback.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A rotation quaternion in `(x, y, z, w)` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a quaternion.  No normalisation is applied.
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Pure rotation of `yaw` radians about the z axis.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self::new(0.0, 0.0, half.sin(), half.cos())
    }

    /// Euclidean length, computed without overflow for large components.
    pub fn norm(self) -> f64 {
        self.x.hypot(self.y).hypot(self.z.hypot(self.w))
    }

    /// `true` when every component is finite.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.w.is_finite()
    }

    fn max_abs(self) -> f64 {
        self.x.abs().max(self.y.abs()).max(self.z.abs()).max(self.w.abs())
    }

    fn scaled(self, k: f64) -> Self {
        Self::new(self.x / k, self.y / k, self.z / k, self.w / k)
    }

    /// Return the unit quaternion pointing the same way, or `None` when the
    /// input is non-finite or too close to zero to carry a rotation.
    ///
    /// Components are first divided by the largest magnitude, so inputs
    /// anywhere in the finite range normalise correctly.
    pub fn normalized(self) -> Option<Self> {
        if !self.is_finite() {
            return None;
        }
        let scale = self.max_abs();
        if scale == 0.0 {
            return None;
        }
        let reduced = self.scaled(scale);
        let n = reduced.norm();
        if scale * n < MIN_QUATERNION_NORM {
            return None;
        }
        let unit = reduced.scaled(n);
        (unit.is_finite() && (unit.norm() - 1.0).abs() < 1e-6).then_some(unit)
    }

    /// Convert to `(roll, pitch, yaw)` in radians, static XYZ axes.
    ///
    /// The input is assumed to be a unit quaternion; call
    /// [`normalized`][Self::normalized] first for raw host input.
    pub fn to_euler(self) -> (f64, f64, f64) {
        let Self { x, y, z, w } = self;

        let sinr_cosp = 2.0 * (w * x + y * z);
        let cosr_cosp = 1.0 - 2.0 * (x * x + y * y);
        let roll = sinr_cosp.atan2(cosr_cosp);

        let sinp = 2.0 * (w * y - z * x);
        let pitch = if sinp.abs() >= 1.0 {
            // Gimbal lock
            FRAC_PI_2.copysign(sinp)
        } else {
            sinp.asin()
        };

        let siny_cosp = 2.0 * (w * z + x * y);
        let cosy_cosp = 1.0 - 2.0 * (y * y + z * z);
        let yaw = siny_cosp.atan2(cosy_cosp);

        (roll, pitch, yaw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn identity_has_zero_angles() {
        let (r, p, y) = Quaternion::identity().to_euler();
        assert_eq!((r, p, y), (0.0, 0.0, 0.0));
    }

    #[test]
    fn yaw_survives_conversion() {
        for yaw in [-3.0, -1.5, -0.2, 0.0, 0.4, 1.0, 2.9] {
            let (roll, pitch, back) = Quaternion::from_yaw(yaw).to_euler();
            assert!(roll.abs() < 1e-12);
            assert!(pitch.abs() < 1e-12);
            assert!((back - yaw).abs() < 1e-12, "yaw {yaw} came back as {back}");
        }
    }

    #[test]
    fn yaw_wraps_past_pi() {
        let (_, _, yaw) = Quaternion::from_yaw(PI + 0.5).to_euler();
        assert!((yaw - (-PI + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn roll_about_x_axis() {
        let half = FRAC_PI_2 * 0.5;
        let q = Quaternion::new(half.sin(), 0.0, 0.0, half.cos());
        let (roll, pitch, yaw) = q.to_euler();
        assert!((roll - FRAC_PI_2).abs() < 1e-12);
        assert!(pitch.abs() < 1e-12);
        assert!(yaw.abs() < 1e-12);
    }

    #[test]
    fn gimbal_lock_pitch_saturates() {
        // Slightly over-length quaternion at pitch = +90°.
        let half = FRAC_PI_2 * 0.5;
        let q = Quaternion::new(0.0, half.sin() * 1.000_000_1, 0.0, half.cos() * 1.000_000_1);
        let (_, pitch, _) = q.to_euler();
        assert_eq!(pitch, FRAC_PI_2);

        let q = Quaternion::new(0.0, -half.sin() * 1.000_000_1, 0.0, half.cos() * 1.000_000_1);
        let (_, pitch, _) = q.to_euler();
        assert_eq!(pitch, -FRAC_PI_2);
    }

    #[test]
    fn euler_conversion_with_all_axes() {
        // roll 0.1, pitch 0.2, yaw 0.3 composed as Rz * Ry * Rx.
        let (roll, pitch, yaw) = (0.1_f64, 0.2_f64, 0.3_f64);
        let (cr, sr) = ((roll * 0.5).cos(), (roll * 0.5).sin());
        let (cp, sp) = ((pitch * 0.5).cos(), (pitch * 0.5).sin());
        let (cy, sy) = ((yaw * 0.5).cos(), (yaw * 0.5).sin());
        let q = Quaternion::new(
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
            cr * cp * cy + sr * sp * sy,
        );

        let (r2, p2, y2) = q.to_euler();
        assert!((roll - r2).abs() < 1e-10);
        assert!((pitch - p2).abs() < 1e-10);
        assert!((yaw - y2).abs() < 1e-10);
    }

    #[test]
    fn normalized_handles_huge_components() {
        let q = Quaternion::new(0.0, 0.0, 1e200, 1e200).normalized().unwrap();
        assert!((q.norm() - 1.0).abs() < 1e-12);
        let (_, _, yaw) = q.to_euler();
        assert!((yaw - FRAC_PI_2).abs() < 1e-12);

        let q = Quaternion::new(f64::MAX, 0.0, 0.0, f64::MAX).normalized().unwrap();
        assert!((q.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normalized_handles_tiny_but_valid_components() {
        let q = Quaternion::new(0.0, 0.0, 1e-5, 1e-5).normalized().unwrap();
        let (_, _, yaw) = q.to_euler();
        assert!((yaw - FRAC_PI_2).abs() < 1e-12);
        assert!(Quaternion::new(0.0, 0.0, 1e-300, 1e-300).normalized().is_none());
    }

    #[test]
    fn norm_does_not_overflow() {
        assert!((Quaternion::new(0.0, 0.0, 3e200, 4e200).norm() - 5e200).abs() < 1e188);
    }

    #[test]
    fn normalized_scales_to_unit_length() {
        let q = Quaternion::new(0.0, 0.0, 2.0, 2.0).normalized().unwrap();
        assert!((q.norm() - 1.0).abs() < 1e-12);
        let (_, _, yaw) = q.to_euler();
        assert!((yaw - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn normalized_rejects_degenerate_input() {
        assert!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalized().is_none());
        assert!(Quaternion::new(f64::NAN, 0.0, 0.0, 1.0).normalized().is_none());
        assert!(Quaternion::new(0.0, f64::INFINITY, 0.0, 1.0).normalized().is_none());
    }
}
