//! Quaternion helpers.

use glam::{Mat3, Quat, Vec3};

use super::{sine_smooth, EPSILON_SQR};

/// Rotation whose +Z points along `forward` and whose +Y is as close to `up`
/// as possible. Degenerate input yields identity.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let Some(z) = forward.try_normalize() else {
        return Quat::IDENTITY;
    };
    let x = match up.cross(z).try_normalize() {
        Some(x) => x,
        // up parallel to forward: pick any perpendicular
        None => z.any_orthonormal_vector(),
    };
    let y = z.cross(x);
    Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize()
}

/// Shortest-arc rotation taking direction `from` onto direction `to`.
pub fn from_to_rotation(from: Vec3, to: Vec3) -> Quat {
    match (from.try_normalize(), to.try_normalize()) {
        (Some(f), Some(t)) => Quat::from_rotation_arc(f, t),
        _ => Quat::IDENTITY,
    }
}

/// Rotation that takes orientation `from` to orientation `to` in world space.
pub fn difference(from: Quat, to: Quat) -> Quat {
    to * from.inverse()
}

/// Angle between two rotations in degrees.
pub fn angle(a: Quat, b: Quat) -> f32 {
    a.dot(b).abs().min(1.0).acos().to_degrees() * 2.0
}

/// Normalized lerp that returns the endpoints exactly at weight 0 and 1.
pub fn lerp(from: Quat, to: Quat, weight: f32) -> Quat {
    if weight <= 0.0 {
        return from;
    }
    if weight >= 1.0 {
        return to;
    }
    from.lerp(to, weight)
}

/// Slerp that returns the endpoints exactly at weight 0 and 1.
pub fn slerp(from: Quat, to: Quat, weight: f32) -> Quat {
    if weight <= 0.0 {
        return from;
    }
    if weight >= 1.0 {
        return to;
    }
    from.slerp(to, weight)
}

/// Rotation from identity to `q`, linearly weighted.
pub fn linear_blend(q: Quat, weight: f32) -> Quat {
    lerp(Quat::IDENTITY, q, weight)
}

/// Rotation from identity to `q`, spherically weighted.
pub fn spherical_blend(q: Quat, weight: f32) -> Quat {
    slerp(Quat::IDENTITY, q, weight)
}

/// Rotates `from` towards `to` by at most `max_degrees`.
pub fn rotate_towards(from: Quat, to: Quat, max_degrees: f32) -> Quat {
    let a = angle(from, to);
    if a == 0.0 {
        return to;
    }
    from.slerp(to, (max_degrees / a).min(1.0))
}

/// Rotation about `axis` by `degrees`. A zero axis gives identity.
pub fn angle_axis(degrees: f32, axis: Vec3) -> Quat {
    match axis.try_normalize() {
        Some(axis) => Quat::from_axis_angle(axis, degrees.to_radians()),
        None => Quat::IDENTITY,
    }
}

/// Pulls `rotation` back towards identity.
///
/// `clamp_weight` 1 removes the rotation entirely, 0 leaves it untouched; in
/// between, rotations closer to 180° are attenuated harder. Each smoothing
/// iteration applies one pass of sine easing to the multiplier.
pub fn clamp_rotation(rotation: Quat, clamp_weight: f32, smoothing: u32) -> Quat {
    if clamp_weight >= 1.0 {
        return Quat::IDENTITY;
    }
    if clamp_weight <= 0.0 {
        return rotation;
    }

    let dot = 1.0 - angle(Quat::IDENTITY, rotation) / 180.0;
    let mlp = clamp_multiplier(dot, clamp_weight, smoothing);
    Quat::IDENTITY.slerp(rotation, mlp)
}

/// Scalar counterpart of [`clamp_rotation`] for an angle in degrees.
pub fn clamp_angle(angle: f32, clamp_weight: f32, smoothing: u32) -> f32 {
    if clamp_weight >= 1.0 {
        return 0.0;
    }
    if clamp_weight <= 0.0 {
        return angle;
    }

    let dot = 1.0 - angle.abs() / 180.0;
    angle * clamp_multiplier(dot, clamp_weight, smoothing)
}

fn clamp_multiplier(dot: f32, clamp_weight: f32, smoothing: u32) -> f32 {
    let target_clamp = if dot >= 1.0 {
        1.0
    } else {
        (1.0 - (clamp_weight - dot) / (1.0 - dot)).clamp(0.0, 1.0)
    };
    let clamp = sine_smooth((dot / clamp_weight).clamp(0.0, 1.0), smoothing);
    clamp * target_clamp
}

/// True when `q` is a finite, non-degenerate rotation.
pub fn is_valid(q: Quat) -> bool {
    q.is_finite() && q.length_squared() > EPSILON_SQR
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_look_rotation_forward_is_identity() {
        let q = look_rotation(Vec3::Z, Vec3::Y);
        assert!(q.abs_diff_eq(Quat::IDENTITY, 1e-5), "got {:?}", q);

        let q = look_rotation(Vec3::X, Vec3::Y);
        assert!((q * Vec3::Z).abs_diff_eq(Vec3::X, 1e-5));
        assert!((q * Vec3::Y).abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_look_rotation_degenerate_input() {
        assert_eq!(look_rotation(Vec3::ZERO, Vec3::Y), Quat::IDENTITY);
        let q = look_rotation(Vec3::Y, Vec3::Y);
        assert!((q * Vec3::Z).abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_from_to_rotation() {
        let q = from_to_rotation(Vec3::X * 3.0, Vec3::Y);
        assert!((q * Vec3::X).abs_diff_eq(Vec3::Y, 1e-5));
        assert_eq!(from_to_rotation(Vec3::ZERO, Vec3::Y), Quat::IDENTITY);

        let opposite = from_to_rotation(Vec3::X, -Vec3::X);
        assert!((opposite * Vec3::X).abs_diff_eq(-Vec3::X, 1e-4));
    }

    #[test]
    fn test_angle_degrees() {
        let q = Quat::from_rotation_y(90f32.to_radians());
        assert_abs_diff_eq!(angle(Quat::IDENTITY, q), 90.0, epsilon = 1e-3);
        assert_abs_diff_eq!(angle(q, q), 0.0, epsilon = 0.1);
    }

    #[test]
    fn test_clamp_rotation_weight_extremes() {
        let q = Quat::from_rotation_x(1.2);
        assert_eq!(clamp_rotation(q, 1.0, 2), Quat::IDENTITY);
        assert_eq!(clamp_rotation(q, 0.0, 2), q);
    }

    #[test]
    fn test_clamp_rotation_attenuates() {
        let q = Quat::from_rotation_x(2.5);
        let clamped = clamp_rotation(q, 0.5, 2);
        let a = angle(Quat::IDENTITY, clamped);
        assert!(
            a < angle(Quat::IDENTITY, q),
            "clamped rotation should be smaller, got {}",
            a
        );
        // Small rotations pass through untouched
        let small = Quat::from_rotation_x(0.05);
        assert!(clamp_rotation(small, 0.5, 2).abs_diff_eq(small, 1e-4));
    }

    #[test]
    fn test_clamp_angle() {
        assert_eq!(clamp_angle(120.0, 1.0, 2), 0.0);
        assert_eq!(clamp_angle(120.0, 0.0, 2), 120.0);
        let clamped = clamp_angle(-150.0, 0.5, 1);
        assert!(clamped <= 0.0 && clamped > -150.0, "got {}", clamped);
        assert_abs_diff_eq!(clamp_angle(5.0, 0.5, 1), 5.0, epsilon = 1e-3);
    }

    #[test]
    fn test_weighted_lerps_hit_endpoints() {
        let a = Quat::from_rotation_z(0.3);
        let b = Quat::from_rotation_z(1.3);
        assert_eq!(slerp(a, b, -1.0), a);
        assert_eq!(slerp(a, b, 2.0), b);
        assert_eq!(lerp(a, b, 0.0), a);
        assert_eq!(linear_blend(b, 1.0), b);
        assert_eq!(spherical_blend(b, 0.0), Quat::IDENTITY);
    }

    #[test]
    fn test_rotate_towards_limits_step() {
        let to = Quat::from_rotation_y(90f32.to_radians());
        let step = rotate_towards(Quat::IDENTITY, to, 30.0);
        assert_abs_diff_eq!(angle(Quat::IDENTITY, step), 30.0, epsilon = 1e-2);
        assert!(rotate_towards(Quat::IDENTITY, to, 180.0).abs_diff_eq(to, 1e-5));
    }

    #[test]
    fn test_difference_composes() {
        let from = Quat::from_rotation_x(0.4);
        let to = Quat::from_rotation_y(0.9) * from;
        assert!((difference(from, to) * from).abs_diff_eq(to, 1e-5));
    }
}
