//! Single-foot stepping state machine.

use glam::{Quat, Vec3};

use crate::math::{move_towards, quat, smooth_damp, vec, InterpolationMode};

/// Smooth time of the support-leg weight spring, in seconds.
const SUPPORT_LEG_SMOOTH_TIME: f32 = 0.2;

/// Yaw difference past which a planted foot re-steps even when close.
const RESTEP_ANGLE: f32 = 25.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Footstep {
    /// Progress gained per second while stepping
    pub step_speed: f32,
    /// Where the foot rests relative to the center of mass, in root space
    pub character_space_offset: Vec3,
    pub position: Vec3,
    pub rotation: Quat,
    pub step_from: Vec3,
    pub step_to: Vec3,
    pub step_from_rot: Quat,
    pub step_to_rot: Quat,
    /// Root heading the current step was planned for
    pub step_to_root_rot: Quat,
    pub is_support_leg: bool,

    step_progress: f32,
    foot_relative_to_root: Quat,
    support_leg_w: f32,
    support_leg_wv: f32,
}

impl Footstep {
    pub fn new(
        root_rotation: Quat,
        foot_position: Vec3,
        foot_rotation: Quat,
        character_space_offset: Vec3,
    ) -> Self {
        let mut footstep = Self {
            step_speed: 3.0,
            character_space_offset,
            position: foot_position,
            rotation: foot_rotation,
            step_from: foot_position,
            step_to: foot_position,
            step_from_rot: foot_rotation,
            step_to_rot: foot_rotation,
            step_to_root_rot: root_rotation,
            is_support_leg: false,
            step_progress: 1.0,
            foot_relative_to_root: Quat::IDENTITY,
            support_leg_w: 0.0,
            support_leg_wv: 0.0,
        };
        footstep.reset(root_rotation, foot_position, foot_rotation);
        footstep.foot_relative_to_root = root_rotation.inverse() * footstep.rotation;
        footstep
    }

    /// Plants the foot at the given transform.
    pub fn reset(&mut self, root_rotation: Quat, foot_position: Vec3, foot_rotation: Quat) {
        self.position = foot_position;
        self.rotation = foot_rotation;
        self.step_from = foot_position;
        self.step_to = foot_position;
        self.step_from_rot = foot_rotation;
        self.step_to_rot = foot_rotation;
        self.step_to_root_rot = root_rotation;
        self.step_progress = 1.0;
    }

    pub fn is_stepping(&self) -> bool {
        self.step_progress < 1.0
    }

    pub fn step_progress(&self) -> f32 {
        self.step_progress
    }

    /// Starts a step towards `target` unless it is within `step_threshold`
    /// of the current step goal and the heading barely changed.
    pub fn step_to(&mut self, target: Vec3, root_rotation: Quat, step_threshold: f32) {
        if (target - self.step_to).length() < step_threshold
            && quat::angle(root_rotation, self.step_to_root_rot) < RESTEP_ANGLE
        {
            return;
        }

        self.step_from = self.position;
        self.step_to = target;
        self.step_from_rot = self.rotation;
        self.step_to_root_rot = root_rotation;
        self.step_to_rot = root_rotation * self.foot_relative_to_root;
        self.step_progress = 0.0;
    }

    /// Steers an ongoing step towards a moving goal.
    pub fn update_stepping(&mut self, target: Vec3, root_rotation: Quat, speed: f32, delta_time: f32) {
        let t = delta_time * speed;
        self.step_to = vec::lerp(self.step_to, target, t);
        self.step_to_rot = quat::lerp(self.step_to_rot, root_rotation * self.foot_relative_to_root, t);
        self.step_to_root_rot = self.step_to_rot * self.foot_relative_to_root.inverse();
    }

    /// Relaxes a planted foot's twist towards the body heading once it
    /// exceeds `min_angle`. Support legs relax less.
    pub fn update_standing(&mut self, root_rotation: Quat, min_angle: f32, speed: f32, delta_time: f32) {
        if speed <= 0.0 || min_angle >= 180.0 {
            return;
        }

        let r = root_rotation * self.foot_relative_to_root;
        let angle = quat::angle(self.rotation, r);
        if angle > min_angle {
            let max_degrees =
                (delta_time * speed * (1.0 - self.support_leg_w)).min(angle - min_angle);
            self.rotation = quat::rotate_towards(self.rotation, r, max_degrees);
        }
    }

    /// Advances the step. Returns true on the call that plants the foot.
    pub fn update(&mut self, interpolation: InterpolationMode, delta_time: f32) -> bool {
        let target = if self.is_support_leg { 1.0 } else { 0.0 };
        self.support_leg_w = smooth_damp(
            self.support_leg_w,
            target,
            &mut self.support_leg_wv,
            SUPPORT_LEG_SMOOTH_TIME,
            f32::INFINITY,
            delta_time,
        );

        if !self.is_stepping() {
            return false;
        }

        self.step_progress = move_towards(self.step_progress, 1.0, delta_time * self.step_speed);
        let planted = self.step_progress >= 1.0;

        let t = interpolation.eval(self.step_progress);
        self.position = vec::lerp(self.step_from, self.step_to, t);
        self.rotation = quat::lerp(self.step_from_rot, self.step_to_rot, t);
        planted
    }

    /// Carries the foot and its step history along with a moving platform.
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
        self.step_from += delta;
        self.step_to += delta;
    }

    /// Rotates the foot and its step history about `pivot`.
    pub fn rotate_around(&mut self, delta: Quat, pivot: Vec3) {
        self.rotation = delta * self.rotation;
        self.step_from_rot = delta * self.step_from_rot;
        self.step_to_rot = delta * self.step_to_rot;
        self.step_to_root_rot = delta * self.step_to_root_rot;
        self.position = vec::rotate_around(self.position, pivot, delta);
        self.step_from = vec::rotate_around(self.step_from, pivot, delta);
        self.step_to = vec::rotate_around(self.step_to, pivot, delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn planted() -> Footstep {
        Footstep::new(Quat::IDENTITY, Vec3::new(-0.1, 0.0, 0.0), Quat::IDENTITY, Vec3::X * -0.3)
    }

    #[test]
    fn test_new_footstep_is_planted() {
        let f = planted();
        assert!(!f.is_stepping());
        assert_eq!(f.step_progress(), 1.0);
        assert_eq!(f.step_to, f.position);
    }

    #[test]
    fn test_small_step_is_ignored() {
        let mut f = planted();
        f.step_to(f.position + Vec3::Z * 0.1, Quat::IDENTITY, 0.4);
        assert!(!f.is_stepping(), "step below threshold should not start");

        f.step_to(f.position + Vec3::Z * 0.1, Quat::from_rotation_y(1.0), 0.4);
        assert!(f.is_stepping(), "large heading change should force a step");
    }

    #[test]
    fn test_step_progress_is_monotonic_and_plants() {
        let mut f = planted();
        f.step_speed = 3.0;
        let goal = f.position + Vec3::Z * 0.5;
        f.step_to(goal, Quat::IDENTITY, 0.4);
        assert!(f.is_stepping());

        let dt = 1.0 / 60.0;
        let mut last = f.step_progress();
        let mut frames = 0;
        let mut plant_events = 0;
        while frames < 100 {
            if f.update(InterpolationMode::InOutSine, dt) {
                plant_events += 1;
            }
            frames += 1;
            assert!(f.step_progress() >= last, "progress went backwards");
            last = f.step_progress();
            if !f.is_stepping() {
                break;
            }
        }

        // 1 / step_speed seconds at 60 Hz
        assert!((19..=21).contains(&frames), "step took {} frames", frames);
        assert_eq!(plant_events, 1);
        assert!(f.position.abs_diff_eq(goal, 1e-6));

        // Planted feet stay put and report nothing further
        assert!(!f.update(InterpolationMode::InOutSine, dt));
        assert!(f.position.abs_diff_eq(goal, 1e-6));
    }

    #[test]
    fn test_update_stepping_steers_goal() {
        let mut f = planted();
        f.step_to(Vec3::Z, Quat::IDENTITY, 0.0);
        f.update_stepping(Vec3::Z * 2.0, Quat::IDENTITY, 10.0, 0.05);
        assert_abs_diff_eq!(f.step_to.z, 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_update_standing_relaxes_twist() {
        let mut f = planted();
        let turned = Quat::from_rotation_y(60f32.to_radians());
        f.update_standing(turned, 20.0, 400.0, 1.0);
        let remaining = quat::angle(f.rotation, turned);
        assert_abs_diff_eq!(remaining, 20.0, epsilon = 0.1);

        // Within the dead zone nothing moves
        let before = f.rotation;
        f.update_standing(turned, 20.0, 400.0, 1.0);
        assert!(f.rotation.abs_diff_eq(before, 1e-6));
    }

    #[test]
    fn test_platform_motion_moves_history() {
        let mut f = planted();
        f.step_to(Vec3::Z, Quat::IDENTITY, 0.0);
        f.translate(Vec3::Y);
        assert!(f.step_to.abs_diff_eq(Vec3::new(0.0, 1.0, 1.0), 1e-6));

        let turn = Quat::from_rotation_y(std::f32::consts::PI);
        f.rotate_around(turn, Vec3::new(0.0, 1.0, 0.0));
        assert!(f.step_to.abs_diff_eq(Vec3::new(0.0, 1.0, -1.0), 1e-5));
        assert!(f.rotation.abs_diff_eq(turn, 1e-6));
    }
}
