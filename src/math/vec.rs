//! Vector helpers.

use glam::Vec3;

use super::{sine_smooth, EPSILON_SQR};

/// Lerp that returns the endpoints exactly at weight 0 and 1.
pub fn lerp(from: Vec3, to: Vec3, weight: f32) -> Vec3 {
    if weight <= 0.0 {
        return from;
    }
    if weight >= 1.0 {
        return to;
    }
    from.lerp(to, weight)
}

/// Spherical interpolation of direction with linear interpolation of length.
pub fn slerp(from: Vec3, to: Vec3, weight: f32) -> Vec3 {
    if weight <= 0.0 {
        return from;
    }
    if weight >= 1.0 {
        return to;
    }

    let (from_len, to_len) = (from.length(), to.length());
    if from_len * to_len <= f32::EPSILON {
        return from.lerp(to, weight);
    }

    let (a, b) = (from / from_len, to / to_len);
    let dot = a.dot(b).clamp(-1.0, 1.0);
    if dot.abs() > 0.9995 {
        return from.lerp(to, weight);
    }

    let theta = dot.acos() * weight;
    let relative = (b - a * dot).normalize_or_zero();
    let dir = a * theta.cos() + relative * theta.sin();
    dir * (from_len + (to_len - from_len) * weight)
}

/// Projection of `v` onto `on_normal`; zero when the normal is degenerate.
pub fn project(v: Vec3, on_normal: Vec3) -> Vec3 {
    let sqr = on_normal.length_squared();
    if sqr < EPSILON_SQR {
        return Vec3::ZERO;
    }
    on_normal * (v.dot(on_normal) / sqr)
}

/// Projection of `v` onto the plane with normal `plane_normal`.
pub fn project_on_plane(v: Vec3, plane_normal: Vec3) -> Vec3 {
    v - project(v, plane_normal)
}

/// Component of `v` along `vertical_axis`, scaled by `weight`.
pub fn extract_vertical(v: Vec3, vertical_axis: Vec3, weight: f32) -> Vec3 {
    if weight == 0.0 {
        return Vec3::ZERO;
    }
    project(v, vertical_axis) * weight
}

/// Component of `v` in the plane of `normal`, scaled by `weight`.
pub fn extract_horizontal(v: Vec3, normal: Vec3, weight: f32) -> Vec3 {
    if weight == 0.0 {
        return Vec3::ZERO;
    }
    project_on_plane(v, normal) * weight
}

/// Projects `point` onto the plane through `plane_position` with `plane_normal`.
pub fn point_to_plane(point: Vec3, plane_position: Vec3, plane_normal: Vec3) -> Vec3 {
    if plane_normal == Vec3::Y {
        return Vec3::new(point.x, plane_position.y, point.z);
    }
    plane_position + project_on_plane(point - plane_position, plane_normal)
}

/// Limits the length of `v` to `max_length`.
pub fn clamp_magnitude(v: Vec3, max_length: f32) -> Vec3 {
    if v.length_squared() > max_length * max_length {
        return v.normalize_or_zero() * max_length;
    }
    v
}

/// Angle between two directions in degrees.
pub fn angle(a: Vec3, b: Vec3) -> f32 {
    let denom = (a.length_squared() * b.length_squared()).sqrt();
    if denom < 1e-15 {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Pulls `direction` back towards `normal_direction`.
///
/// Directions within `clamp_weight` of the normal (measured as
/// `1 - angle / 180`) pass through; wider ones are slerped back, with
/// `smoothing` sine iterations on the multiplier.
pub fn clamp_direction(direction: Vec3, normal_direction: Vec3, clamp_weight: f32, smoothing: u32) -> Vec3 {
    if clamp_weight <= 0.0 {
        return direction;
    }
    if clamp_weight >= 1.0 {
        return normal_direction;
    }

    let dot = 1.0 - angle(normal_direction, direction) / 180.0;
    if dot > clamp_weight {
        return direction;
    }

    let target_clamp = (1.0 - (clamp_weight - dot) / (1.0 - dot)).clamp(0.0, 1.0);
    let clamp = sine_smooth((dot / clamp_weight).clamp(0.0, 1.0), smoothing);
    slerp(normal_direction, direction, clamp * target_clamp)
}

/// Rotates `point` about `pivot` by `rotation`.
pub fn rotate_around(point: Vec3, pivot: Vec3, rotation: glam::Quat) -> Vec3 {
    pivot + rotation * (point - pivot)
}
