//! Eye poses, fields of view and view matrices.
//!
//! Math conventions (glam): column vectors, column-major matrices, and
//! `a * b` applies `b` first. The tracker space is right-handed with +Y up and
//! -Z forward. Projections map depth to [0, 1].

use glam::{Mat4, Quat, Vec3, Vec4};

/// One of the two eyes. Arrays indexed by eye are always `[left, right]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left = 0,
    Right = 1,
}

impl Eye {
    /// Render order.
    pub const ALL: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Eye::Left => "left",
            Eye::Right => "right",
        }
    }
}

/// Orientation and position in tracker space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        orientation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    pub fn new(orientation: Quat, position: Vec3) -> Self {
        Self {
            orientation,
            position,
        }
    }

    /// Pose of an eye sitting at `hmd_to_eye` in head-local coordinates.
    pub fn eye(&self, hmd_to_eye: Vec3) -> Pose {
        Pose {
            orientation: self.orientation,
            position: self.position + self.orientation * hmd_to_eye,
        }
    }
}

/// Half-angle tangents of an eye's frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub up_tan: f32,
    pub down_tan: f32,
    pub left_tan: f32,
    pub right_tan: f32,
}

impl FieldOfView {
    pub fn from_degrees(up: f32, down: f32, left: f32, right: f32) -> Self {
        Self {
            up_tan: up.to_radians().tan(),
            down_tan: down.to_radians().tan(),
            left_tan: left.to_radians().tan(),
            right_tan: right.to_radians().tan(),
        }
    }

    /// Off-axis perspective projection for this frustum.
    pub fn projection(&self, near: f32, far: f32) -> Mat4 {
        let top = near * self.up_tan;
        let bottom = -near * self.down_tan;
        let left = -near * self.left_tan;
        let right = near * self.right_tan;

        let x_scale = 2.0 * near / (right - left);
        let y_scale = 2.0 * near / (top - bottom);
        let x_offset = (right + left) / (right - left);
        let y_offset = (top + bottom) / (top - bottom);
        let z_scale = far / (near - far);
        let z_offset = near * far / (near - far);

        Mat4::from_cols(
            Vec4::new(x_scale, 0.0, 0.0, 0.0),
            Vec4::new(0.0, y_scale, 0.0, 0.0),
            Vec4::new(x_offset, y_offset, z_scale, -1.0),
            Vec4::new(0.0, 0.0, z_offset, 0.0),
        )
    }
}

/// View matrices of one eye for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeViews {
    /// Follows head orientation and the fixed yaw.
    pub view: Mat4,
    /// Follows the fixed yaw only.
    pub still_view: Mat4,
}

/// Builds both view matrices of a tracked eye.
///
/// The eye position is turned by the fixed yaw alone; the head orientation
/// only steers the look direction of `view`.
pub fn resolve(eye: &Pose, fixed_yaw: f32) -> EyeViews {
    let yaw = Quat::from_rotation_y(fixed_yaw);
    let composite = yaw * eye.orientation;
    let eye_position = yaw * eye.position;

    EyeViews {
        view: look_from(eye_position, composite),
        still_view: look_from(eye_position, yaw),
    }
}

/// [`resolve`] for a head pose plus the head-to-eye offset.
pub fn resolve_head(
    head_orientation: Quat,
    head_position: Vec3,
    eye_offset: Vec3,
    fixed_yaw: f32,
) -> EyeViews {
    resolve(&Pose::new(head_orientation, head_position).eye(eye_offset), fixed_yaw)
}

fn look_from(position: Vec3, rotation: Quat) -> Mat4 {
    let up = rotation * Vec3::Y;
    let forward = rotation * Vec3::NEG_Z;
    Mat4::look_at_rh(position, position + forward, up)
}
