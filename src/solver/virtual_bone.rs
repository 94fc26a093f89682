//! Virtual bones and the generic chain algorithms that act on them.
//!
//! A chain is a plain slice of [`VirtualBone`] ordered root→leaf. Every
//! algorithm here works on solver positions/rotations only; the read pose is
//! kept untouched so later stages can blend back towards it.

use glam::{Quat, Vec3};

use crate::math::{quat, EPSILON_SQR};

/// One bone of a solver chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualBone {
    /// Animated position sampled at the start of the frame
    pub read_position: Vec3,
    /// Animated rotation sampled at the start of the frame
    pub read_rotation: Quat,
    /// Working position, mutated by successive passes
    pub solver_position: Vec3,
    /// Working rotation, mutated by successive passes
    pub solver_rotation: Quat,
    /// Distance to the next bone (0 for the last bone)
    pub length: f32,
    /// Squared distance to the next bone
    pub sqr_mag: f32,
    /// Direction to the next bone in this bone's own rotation space
    pub axis: Vec3,
}

impl VirtualBone {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            read_position: position,
            read_rotation: rotation,
            solver_position: position,
            solver_rotation: rotation,
            length: 0.0,
            sqr_mag: 0.0,
            axis: Vec3::ZERO,
        }
    }

    /// Sample a new animated transform; also resets the solver state to it.
    pub fn read(&mut self, position: Vec3, rotation: Quat) {
        self.read_position = position;
        self.read_rotation = rotation;
        self.solver_position = position;
        self.solver_rotation = rotation;
    }

    /// World-space direction towards the next bone.
    pub fn direction(&self) -> Vec3 {
        self.solver_rotation * self.axis
    }
}

/// Computes bone lengths and local axes; returns the total chain length.
pub fn pre_solve(bones: &mut [VirtualBone]) -> f32 {
    let mut length = 0.0;
    let count = bones.len();

    for i in 0..count {
        if i + 1 < count {
            let to_next = bones[i + 1].solver_position - bones[i].solver_position;
            let bone = &mut bones[i];
            bone.sqr_mag = to_next.length_squared();
            bone.length = bone.sqr_mag.sqrt();
            bone.axis = bone.solver_rotation.inverse() * to_next;
            length += bone.length;
        } else {
            bones[i].sqr_mag = 0.0;
            bones[i].length = 0.0;
        }
    }

    length
}

/// Rotates `bones[index]` so its axis points at `target`, carrying every
/// following bone's rotation along. Positions are left alone.
pub fn swing_rotation(bones: &mut [VirtualBone], index: usize, target: Vec3, weight: f32) {
    if weight <= 0.0 {
        return;
    }

    let from = bones[index].direction();
    let to = target - bones[index].solver_position;
    let r = quat::linear_blend(quat::from_to_rotation(from, to), weight);

    for bone in &mut bones[index..] {
        bone.solver_rotation = r * bone.solver_rotation;
    }
}

/// Rotates `bones[index..]` about `point`.
pub fn rotate_around_point(bones: &mut [VirtualBone], index: usize, point: Vec3, rotation: Quat) {
    for bone in &mut bones[index..] {
        bone.solver_position = point + rotation * (bone.solver_position - point);
        bone.solver_rotation = rotation * bone.solver_rotation;
    }
}

/// Rotates `bones[index..]` about `bones[index]`.
pub fn rotate_by(bones: &mut [VirtualBone], index: usize, rotation: Quat) {
    let pivot = bones[index].solver_position;
    rotate_around_point(bones, index, pivot, rotation);
}

/// Rotates the whole chain about its first bone.
pub fn rotate_chain_by(bones: &mut [VirtualBone], rotation: Quat) {
    if bones.is_empty() {
        return;
    }
    rotate_by(bones, 0, rotation);
}

/// Rotates `bones[index..]` about `bones[index]` so that `bones[index]` ends
/// up with world rotation `rotation`.
pub fn rotate_to(bones: &mut [VirtualBone], index: usize, rotation: Quat) {
    let q = quat::difference(bones[index].solver_rotation, rotation);
    rotate_by(bones, index, q);
}

/// Closed-form two-segment solve over `first → second → third`.
///
/// The target is blended from the current position of `third` by `weight`;
/// `bend_normal` picks the plane the middle joint bends in. Bones after
/// `third` ride along rigidly. A target on top of `first` is a no-op.
pub fn solve_trigonometric(
    bones: &mut [VirtualBone],
    first: usize,
    second: usize,
    third: usize,
    target: Vec3,
    bend_normal: Vec3,
    weight: f32,
) {
    if weight <= 0.0 {
        return;
    }

    let target = bones[third].solver_position.lerp(target, weight.min(1.0));
    let dir = target - bones[first].solver_position;

    let sqr_mag = dir.length_squared();
    if sqr_mag == 0.0 {
        return;
    }
    let length = sqr_mag.sqrt();

    let sqr_mag1 = (bones[second].solver_position - bones[first].solver_position).length_squared();
    let sqr_mag2 = (bones[third].solver_position - bones[second].solver_position).length_squared();

    let bend_dir = dir.cross(bend_normal);
    let to_bend_point = direction_to_bend_point(dir, length, bend_dir, sqr_mag1, sqr_mag2);

    let q1 = quat::linear_blend(
        quat::from_to_rotation(
            bones[second].solver_position - bones[first].solver_position,
            to_bend_point,
        ),
        weight,
    );
    let pivot = bones[first].solver_position;
    rotate_around_point(bones, first, pivot, q1);

    let q2 = quat::linear_blend(
        quat::from_to_rotation(
            bones[third].solver_position - bones[second].solver_position,
            target - bones[second].solver_position,
        ),
        weight,
    );
    let pivot = bones[second].solver_position;
    rotate_around_point(bones, second, pivot, q2);
}

/// Direction from the first joint to the law-of-cosines bend point. The
/// magnitude is not the first bone's length.
fn direction_to_bend_point(
    direction: Vec3,
    direction_mag: f32,
    bend_direction: Vec3,
    sqr_mag1: f32,
    sqr_mag2: f32,
) -> Vec3 {
    if direction == Vec3::ZERO {
        return Vec3::ZERO;
    }
    let x = (direction_mag * direction_mag + (sqr_mag1 - sqr_mag2)) / 2.0 / direction_mag;
    let y = (sqr_mag1 - x * x).max(0.0).sqrt();
    quat::look_rotation(direction, bend_direction) * Vec3::new(0.0, y, x)
}

/// Simple FABRIK over the whole chain, without rotation limits.
///
/// `length` is the reference length used by the minimum normalized target
/// distance; `start_offset` is added to every bone after the first backward
/// pass. Bone rotations are swung to face their solved children at the end.
#[allow(clippy::too_many_arguments)]
pub fn solve_fabrik(
    bones: &mut [VirtualBone],
    start_position: Vec3,
    target_position: Vec3,
    weight: f32,
    min_normalized_target_distance: f32,
    iterations: usize,
    length: f32,
    start_offset: Vec3,
) {
    if weight <= 0.0 || bones.is_empty() {
        return;
    }
    let weight = weight.min(1.0);
    let last = bones.len() - 1;
    let mut target_position = target_position;

    if min_normalized_target_distance > 0.0 {
        let target_direction = target_position - start_position;
        let target_length = target_direction.length();
        if target_length * target_length > EPSILON_SQR {
            let clamped = start_position
                + (target_direction / target_length)
                    * (length * min_normalized_target_distance).max(target_length);
            target_position = target_position.lerp(clamped, weight);
        }
    }

    for iteration in 0..iterations {
        // Backward
        bones[last].solver_position = bones[last].solver_position.lerp(target_position, weight);
        for i in (0..last).rev() {
            bones[i].solver_position = fabrik_joint(
                bones[i].solver_position,
                bones[i + 1].solver_position,
                bones[i].length,
            );
        }

        // Forward
        if iteration == 0 {
            for bone in bones.iter_mut() {
                bone.solver_position += start_offset;
            }
        }

        bones[0].solver_position = start_position;
        for i in 1..=last {
            bones[i].solver_position = fabrik_joint(
                bones[i].solver_position,
                bones[i - 1].solver_position,
                bones[i - 1].length,
            );
        }
    }

    for i in 0..last {
        let next = bones[i + 1].solver_position;
        swing_rotation(bones, i, next, 1.0);
    }
}

/// Places `pos1` at `length` from `pos2` along the line between them.
fn fabrik_joint(pos1: Vec3, pos2: Vec3, length: f32) -> Vec3 {
    pos2 + (pos1 - pos2).normalize_or_zero() * length
}

/// Cyclic coordinate descent towards `target_position`.
pub fn solve_ccd(bones: &mut [VirtualBone], target_position: Vec3, weight: f32, iterations: usize) {
    if weight <= 0.0 || bones.len() < 2 {
        return;
    }
    let last = bones.len() - 1;

    for _ in 0..iterations {
        for i in (0..last).rev() {
            let to_last_bone = bones[last].solver_position - bones[i].solver_position;
            let to_target = target_position - bones[i].solver_position;
            let rotation = quat::from_to_rotation(to_last_bone, to_target);
            rotate_by(bones, i, quat::linear_blend(rotation, weight));
        }
    }
}
