//! Geometry and interpolation primitives shared by every solver stage.
//!
//! Conventions: +Z forward, +Y up, +X right. Angles passed across the public
//! API are in degrees unless a function name says otherwise.

pub mod axis;
pub mod curve;
pub mod interp;
pub mod quat;
pub mod vec;

pub use axis::Axis;
pub use curve::{FloatCurve, Keyframe};
pub use interp::InterpolationMode;

/// World forward axis.
pub const FORWARD: glam::Vec3 = glam::Vec3::Z;
/// World up axis.
pub const UP: glam::Vec3 = glam::Vec3::Y;
/// World right axis.
pub const RIGHT: glam::Vec3 = glam::Vec3::X;

/// Squared magnitudes below this are treated as zero-length.
pub const EPSILON_SQR: f32 = 1e-10;

/// Linear interpolation with `t` clamped into [0, 1].
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

/// Moves `current` towards `target` by at most `max_delta`.
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        return target;
    }
    current + (target - current).signum() * max_delta
}

/// Shortest signed difference between two angles in degrees, in (-180, 180].
pub fn delta_angle(current: f32, target: f32) -> f32 {
    let mut delta = (target - current).rem_euclid(360.0);
    if delta > 180.0 {
        delta -= 360.0;
    }
    delta
}

/// Critically damped spring towards `target`.
///
/// Returns the new value; `velocity` carries state between calls.
pub fn smooth_damp(
    current: f32,
    target: f32,
    velocity: &mut f32,
    smooth_time: f32,
    max_speed: f32,
    delta_time: f32,
) -> f32 {
    let smooth_time = smooth_time.max(0.0001);
    let omega = 2.0 / smooth_time;

    let x = omega * delta_time;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let max_change = max_speed * smooth_time;
    let change = (current - target).clamp(-max_change, max_change);
    let clamped_target = current - change;

    let temp = (*velocity + omega * change) * delta_time;
    *velocity = (*velocity - omega * temp) * exp;
    let mut output = clamped_target + (change + temp) * exp;

    // Prevent overshooting
    if (target - current > 0.0) == (output > target) {
        output = target;
        *velocity = (output - target) / delta_time.max(f32::EPSILON);
    }

    output
}

/// Repeated sine easing used by the clamp family: each pass pushes the
/// multiplier towards 1.
pub(crate) fn sine_smooth(mut value: f32, iterations: u32) -> f32 {
    for _ in 0..iterations {
        value = (value * std::f32::consts::FRAC_PI_2).sin();
    }
    value
}
