// orientation.rs - pointer drags to view rotation

use glam::{EulerRot, Mat4, Quat};
use serde::Deserialize;
use std::f32::consts::FRAC_PI_2;
use std::str::FromStr;

use crate::config::ConfigError;

/// Degrees of rotation per pixel of pointer travel.
pub const DEFAULT_SENSITIVITY: f32 = 0.1;

/// A drag is snapped to one axis when that axis' delta is this many
/// times larger than the other.
pub const AXIS_SNAP_RATIO: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DragPolicy {
    /// Accumulate a quaternion, locking near-axial drags to one axis.
    #[default]
    AxisSnap,
    /// Accumulate pitch/yaw angles with pitch clamped to +-90 degrees.
    ClampedEuler,
}

impl DragPolicy {
    pub fn label(self) -> &'static str {
        match self {
            DragPolicy::AxisSnap => "Axis snap",
            DragPolicy::ClampedEuler => "Clamped Euler",
        }
    }
}

impl FromStr for DragPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "axis-snap" | "snap" | "quaternion" => Ok(DragPolicy::AxisSnap),
            "clamped-euler" | "euler" => Ok(DragPolicy::ClampedEuler),
            other => Err(ConfigError::UnknownValue {
                flag: "--policy",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Orientation {
    Quaternion(Quat),
    /// Radians. `x_rot` stays within [-pi/2, pi/2].
    Euler { x_rot: f32, y_rot: f32 },
}

/// Rotation actually applied by one drag, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DragDelta {
    pub pitch: f32,
    pub yaw: f32,
}

/// Zeroes the minor axis of a drag when the major axis dominates it.
pub fn snap_to_axis(delta: DragDelta) -> DragDelta {
    let DragDelta { mut pitch, mut yaw } = delta;
    if yaw.abs() > AXIS_SNAP_RATIO * pitch.abs() {
        pitch = 0.0;
    } else if pitch.abs() > AXIS_SNAP_RATIO * yaw.abs() {
        yaw = 0.0;
    }
    DragDelta { pitch, yaw }
}

#[derive(Debug, Clone)]
pub struct OrientationModel {
    policy: DragPolicy,
    sensitivity: f32,
    state: Orientation,
}

impl OrientationModel {
    pub fn new(policy: DragPolicy, sensitivity: f32) -> Self {
        Self {
            policy,
            sensitivity,
            state: Self::initial(policy),
        }
    }

    fn initial(policy: DragPolicy) -> Orientation {
        match policy {
            DragPolicy::AxisSnap => Orientation::Quaternion(Quat::IDENTITY),
            DragPolicy::ClampedEuler => Orientation::Euler { x_rot: 0.0, y_rot: 0.0 },
        }
    }

    pub fn policy(&self) -> DragPolicy {
        self.policy
    }

    pub fn orientation(&self) -> Orientation {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = Self::initial(self.policy);
    }

    /// Applies a screen-space pointer delta (pixels). Dragging right turns
    /// the view left, dragging down tilts it up.
    pub fn apply_drag(&mut self, dx: f32, dy: f32) -> DragDelta {
        let raw = DragDelta {
            pitch: -dy * self.sensitivity,
            yaw: -dx * self.sensitivity,
        };

        match &mut self.state {
            Orientation::Quaternion(q) => {
                let delta = snap_to_axis(raw);
                let dq = Quat::from_rotation_y(delta.yaw.to_radians())
                    * Quat::from_rotation_x(delta.pitch.to_radians());
                // World-space drag: the new delta goes on the left.
                *q = (dq * *q).normalize();
                delta
            }
            Orientation::Euler { x_rot, y_rot } => {
                let before = *x_rot;
                *x_rot = (*x_rot + raw.pitch.to_radians()).clamp(-FRAC_PI_2, FRAC_PI_2);
                *y_rot += raw.yaw.to_radians();
                DragDelta {
                    pitch: (*x_rot - before).to_degrees(),
                    yaw: raw.yaw,
                }
            }
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        match self.state {
            Orientation::Quaternion(q) => Mat4::from_quat(q),
            Orientation::Euler { x_rot, y_rot } => {
                Mat4::from_rotation_x(x_rot) * Mat4::from_rotation_y(y_rot)
            }
        }
    }

    /// (pitch, yaw) in degrees for display.
    pub fn angles_degrees(&self) -> (f32, f32) {
        match self.state {
            Orientation::Quaternion(q) => {
                let (yaw, pitch, _) = q.to_euler(EulerRot::YXZ);
                (pitch.to_degrees(), yaw.to_degrees())
            }
            Orientation::Euler { x_rot, y_rot } => (x_rot.to_degrees(), y_rot.to_degrees()),
        }
    }
}

/// Tracks the pressed pointer between move events.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerState {
    down: bool,
    last: (f64, f64),
}

impl PointerState {
    pub fn is_down(&self) -> bool {
        self.down
    }

    pub fn press(&mut self, x: f64, y: f64) {
        self.down = true;
        self.last = (x, y);
    }

    pub fn release(&mut self) {
        self.down = false;
    }

    /// Returns the delta since the previous position while pressed.
    pub fn move_to(&mut self, x: f64, y: f64) -> Option<(f32, f32)> {
        if !self.down {
            return None;
        }
        let (lx, ly) = self.last;
        self.last = (x, y);
        Some(((x - lx) as f32, (y - ly) as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn pseudo_random_drags(n: usize) -> impl Iterator<Item = (f32, f32)> {
        let mut seed: u32 = 0x9e37_79b9;
        (0..n).map(move |_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let dx = (seed % 401) as f32 - 200.0;
            let dy = ((seed >> 9) % 401) as f32 - 200.0;
            (dx, dy)
        })
    }

    #[test]
    fn quaternion_stays_normalized() {
        let mut model = OrientationModel::new(DragPolicy::AxisSnap, DEFAULT_SENSITIVITY);
        for (dx, dy) in pseudo_random_drags(10_000) {
            model.apply_drag(dx, dy);
            let Orientation::Quaternion(q) = model.orientation() else {
                panic!("policy changed representation");
            };
            assert!((q.length() - 1.0).abs() < EPS, "|q| = {}", q.length());
        }
    }

    #[test]
    fn horizontal_drag_snaps_pitch_to_zero() {
        let mut model = OrientationModel::new(DragPolicy::AxisSnap, DEFAULT_SENSITIVITY);
        let applied = model.apply_drag(10.0, 1.0);
        assert_eq!(applied.pitch, 0.0);
        assert!(applied.yaw != 0.0);
    }

    #[test]
    fn vertical_drag_snaps_yaw_to_zero() {
        let mut model = OrientationModel::new(DragPolicy::AxisSnap, DEFAULT_SENSITIVITY);
        let applied = model.apply_drag(1.0, 10.0);
        assert_eq!(applied.yaw, 0.0);
        assert!(applied.pitch != 0.0);
    }

    #[test]
    fn diagonal_drag_keeps_both_axes() {
        let delta = snap_to_axis(DragDelta { pitch: 2.0, yaw: 3.0 });
        assert_eq!(delta, DragDelta { pitch: 2.0, yaw: 3.0 });
    }

    #[test]
    fn euler_pitch_is_clamped() {
        let mut model = OrientationModel::new(DragPolicy::ClampedEuler, DEFAULT_SENSITIVITY);
        for _ in 0..1000 {
            model.apply_drag(0.0, -500.0);
            let Orientation::Euler { x_rot, .. } = model.orientation() else {
                panic!("policy changed representation");
            };
            assert!(x_rot <= FRAC_PI_2 && x_rot >= -FRAC_PI_2);
        }
        assert!((model.angles_degrees().0 - 90.0).abs() < EPS);

        for _ in 0..1000 {
            model.apply_drag(0.0, 500.0);
        }
        assert!((model.angles_degrees().0 + 90.0).abs() < EPS);
    }

    #[test]
    fn euler_yaw_is_unbounded() {
        let mut model = OrientationModel::new(DragPolicy::ClampedEuler, DEFAULT_SENSITIVITY);
        for _ in 0..10 {
            model.apply_drag(-1000.0, 0.0);
        }
        // 10 * 1000px * 0.1 deg/px
        assert!((model.angles_degrees().1 - 1000.0).abs() < 0.01);
    }

    #[test]
    fn euler_view_applies_pitch_after_yaw() {
        let mut model = OrientationModel::new(DragPolicy::ClampedEuler, 1.0);
        model.apply_drag(-90.0, -30.0);
        let expected = Mat4::from_rotation_x(30f32.to_radians()) * Mat4::from_rotation_y(90f32.to_radians());
        assert!(model.view_matrix().abs_diff_eq(expected, EPS));
    }

    #[test]
    fn delta_is_left_multiplied() {
        let mut model = OrientationModel::new(DragPolicy::AxisSnap, 1.0);
        model.apply_drag(-90.0, 0.0); // yaw +90
        model.apply_drag(0.0, -90.0); // pitch +90
        let yaw = Quat::from_rotation_y(90f32.to_radians());
        let pitch = Quat::from_rotation_x(90f32.to_radians());
        let Orientation::Quaternion(q) = model.orientation() else {
            unreachable!()
        };
        assert!(q.abs_diff_eq(pitch * yaw, EPS));
    }

    #[test]
    fn diagonal_drag_turns_yaw_outside_pitch() {
        let mut model = OrientationModel::new(DragPolicy::AxisSnap, 1.0);
        model.apply_drag(-30.0, -20.0);
        let expected = Quat::from_rotation_y(30f32.to_radians()) * Quat::from_rotation_x(20f32.to_radians());
        let Orientation::Quaternion(q) = model.orientation() else {
            unreachable!()
        };
        assert!(q.abs_diff_eq(expected, EPS));
        let swapped = Quat::from_rotation_x(20f32.to_radians()) * Quat::from_rotation_y(30f32.to_radians());
        assert!(!q.abs_diff_eq(swapped, EPS));
    }

    #[test]
    fn reset_restores_identity() {
        let mut model = OrientationModel::new(DragPolicy::AxisSnap, DEFAULT_SENSITIVITY);
        model.apply_drag(40.0, 3.0);
        model.reset();
        assert_eq!(model.view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn pointer_reports_nothing_while_up() {
        let mut pointer = PointerState::default();
        assert_eq!(pointer.move_to(10.0, 10.0), None);
        pointer.press(10.0, 10.0);
        assert_eq!(pointer.move_to(15.0, 7.0), Some((5.0, -3.0)));
        pointer.release();
        assert_eq!(pointer.move_to(20.0, 20.0), None);
    }
}
