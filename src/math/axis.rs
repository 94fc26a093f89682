//! Local-axis discovery for bones whose rig orientation is unknown.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// One of the three cardinal axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn to_vec3(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }

    /// Axis with the largest absolute component of `v`.
    pub fn dominant(v: Vec3) -> Axis {
        let a = v.abs();
        if a.x >= a.y && a.x >= a.z {
            Axis::X
        } else if a.y >= a.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    /// Local axis of `rotation` that points most nearly along `direction`
    /// (either sign).
    pub fn closest(rotation: Quat, direction: Vec3) -> Axis {
        let direction = direction.normalize_or_zero();
        let mut best = Axis::X;
        let mut best_dot = -1.0;
        for axis in Self::ALL {
            let dot = (rotation * axis.to_vec3()).dot(direction).abs();
            if dot > best_dot {
                best = axis;
                best_dot = dot;
            }
        }
        best
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// Unit local axis of `rotation` closest to `direction`, unsigned.
pub fn axis_vector_to_direction(rotation: Quat, direction: Vec3) -> Vec3 {
    Axis::closest(rotation, direction).to_vec3()
}

/// Like [`axis_vector_to_direction`], but flipped so that it points along
/// `direction` rather than away from it.
pub fn signed_axis_to_direction(rotation: Quat, direction: Vec3) -> Vec3 {
    let axis = axis_vector_to_direction(rotation, direction);
    if (rotation * axis).dot(direction) < 0.0 {
        -axis
    } else {
        axis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant() {
        assert_eq!(Axis::dominant(Vec3::new(0.1, -3.0, 2.0)), Axis::Y);
        assert_eq!(Axis::dominant(Vec3::new(-5.0, 1.0, 2.0)), Axis::X);
        assert_eq!(Axis::dominant(Vec3::new(0.0, 0.0, -0.1)), Axis::Z);
    }

    #[test]
    fn test_closest_axis_follows_rotation() {
        // Rotating 90° about Y sends local X to world -Z
        let r = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        assert_eq!(Axis::closest(r, Vec3::Z), Axis::X);
        assert_eq!(Axis::closest(r, Vec3::Y), Axis::Y);
    }

    #[test]
    fn test_signed_axis_points_along_direction() {
        let r = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let axis = signed_axis_to_direction(r, Vec3::Z);
        assert_eq!(axis, -Vec3::X);
        assert!((r * axis).dot(Vec3::Z) > 0.99);
    }
}
