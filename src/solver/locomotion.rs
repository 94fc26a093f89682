//! Procedural stepping for rigs without foot targets.
//!
//! Tracks a predicted center of mass over the support polygon of the two
//! feet and decides, every call, whether a planted foot should step under
//! the body again.

use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::arm::Arm;
use super::footstep::Footstep;
use super::leg::Leg;
use super::spine::Spine;
use super::targets::{FootPlacement, FootstepEvent};
use super::virtual_bone::VirtualBone;
use crate::config::LocomotionSettings;
use crate::math::{lerp, quat, vec, RIGHT, UP};
use crate::skeleton::{JointName, Pose, Side};

const PELVIS_MASS: f32 = 1.0;
const HEAD_MASS: f32 = 1.0;
const ARM_MASS: f32 = 0.2;

/// Feet closer than this are treated as colliding when planning a step.
const FOOT_RADIUS: f32 = 0.25;

/// A new step may start once the other foot is this far into its own.
const STAGGER_PROGRESS: f32 = 0.8;

/// Rate at which an ongoing step follows its moving goal.
const STEP_STEER_SPEED: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct Locomotion {
    pub settings: LocomotionSettings,
    center_of_mass: Vec3,
    footsteps: Vec<Footstep>,
    last_com_position: Vec3,
    com_velocity: Vec3,
    has_toes: bool,
    rng: StdRng,
}

impl Locomotion {
    /// `seed` fixes the per-step speed jitter; `None` seeds from the OS.
    pub fn new(settings: &LocomotionSettings, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            settings: settings.clamped(),
            center_of_mass: Vec3::ZERO,
            footsteps: Vec::new(),
            last_com_position: Vec3::ZERO,
            com_velocity: Vec3::ZERO,
            has_toes: false,
            rng,
        }
    }

    pub fn apply_settings(&mut self, settings: &LocomotionSettings) {
        self.settings = settings.clamped();
    }

    pub fn is_initiated(&self) -> bool {
        self.footsteps.len() == 2
    }

    /// Predicted center of mass from the last solve.
    pub fn center_of_mass(&self) -> Vec3 {
        self.center_of_mass
    }

    pub fn footstep(&self, side: Side) -> Option<&Footstep> {
        self.footsteps.get(side_index(side))
    }

    fn foot_joint(&self, side: Side) -> JointName {
        let [_, _, foot, toes] = side.leg();
        if self.has_toes {
            toes
        } else {
            foot
        }
    }

    /// Plants both footsteps where `pose` has the feet.
    pub fn initiate(&mut self, pose: &Pose, has_toes: bool) {
        self.has_toes = has_toes;
        let root_rotation = pose.rotation(JointName::Root);
        let distance = self.settings.foot_distance;

        self.footsteps = Side::ALL
            .iter()
            .map(|&side| {
                let foot = pose.get(self.foot_joint(side)).unwrap_or_default();
                let lateral = if side.is_left() { -RIGHT } else { RIGHT };
                Footstep::new(root_rotation, foot.position, foot.rotation, lateral * distance)
            })
            .collect();

        self.reset(pose);
    }

    /// Forgets velocity history and re-plants both feet.
    pub fn reset(&mut self, pose: &Pose) {
        let root_rotation = pose.rotation(JointName::Root);
        self.last_com_position = pose
            .position(JointName::Pelvis)
            .lerp(pose.position(JointName::Head), 0.25)
            + root_rotation * self.settings.offset;
        self.com_velocity = Vec3::ZERO;

        for side in Side::ALL {
            let foot = pose.get(self.foot_joint(side)).unwrap_or_default();
            if let Some(footstep) = self.footsteps.get_mut(side_index(side)) {
                footstep.reset(root_rotation, foot.position, foot.rotation);
            }
        }
    }

    pub fn add_delta_position(&mut self, delta: Vec3) {
        self.last_com_position += delta;
        for footstep in &mut self.footsteps {
            footstep.translate(delta);
        }
    }

    pub fn add_delta_rotation(&mut self, delta: Quat, pivot: Vec3) {
        self.last_com_position = vec::rotate_around(self.last_com_position, pivot, delta);
        for footstep in &mut self.footsteps {
            footstep.rotate_around(delta, pivot);
        }
    }

    /// Plans and advances steps for one call, returning where the feet
    /// should be. Feet that plant during the call are pushed to `events`.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        root: &VirtualBone,
        spine: &Spine,
        legs: &[Leg],
        arms: &[Arm],
        support_leg: Option<usize>,
        delta_time: f32,
        events: &mut Vec<FootstepEvent>,
    ) -> FootPlacement {
        if self.settings.weight <= 0.0 || !self.is_initiated() || legs.len() < 2 || arms.len() < 2 {
            return FootPlacement::default();
        }
        let s = &self.settings;

        let root_up = root.solver_rotation * UP;
        let pelvis = *spine.pelvis();
        let thigh_positions = [
            pelvis.solver_position + pelvis.solver_rotation * legs[0].thigh_relative_to_pelvis,
            pelvis.solver_position + pelvis.solver_rotation * legs[1].thigh_relative_to_pelvis,
        ];

        self.footsteps[0].character_space_offset = -RIGHT * s.foot_distance;
        self.footsteps[1].character_space_offset = RIGHT * s.foot_distance;

        let mut forward = spine.face_direction;
        forward -= vec::extract_vertical(forward, root_up, 1.0);
        let mut forward_rotation = quat::look_rotation(forward, root_up);
        let heading_offset = spine.settings.root_heading_offset;
        if heading_offset != 0.0 {
            forward_rotation = quat::angle_axis(heading_offset, root_up) * forward_rotation;
        }

        // Center of mass and its predicted position
        let total_mass = PELVIS_MASS + HEAD_MASS + 2.0 * ARM_MASS;
        let mut com = pelvis.solver_position * PELVIS_MASS
            + spine.head().solver_position * HEAD_MASS
            + arms[0].target_position() * ARM_MASS
            + arms[1].target_position() * ARM_MASS;
        com /= total_mass;
        com += root.solver_rotation * s.offset;
        self.center_of_mass = com;

        self.com_velocity = if delta_time > 0.0 {
            (com - self.last_com_position) / delta_time
        } else {
            Vec3::ZERO
        };
        self.last_com_position = com;
        self.com_velocity = vec::clamp_magnitude(self.com_velocity, s.max_velocity) * s.velocity_factor;

        let com_v = com + self.com_velocity;
        let pelvis_ground = vec::point_to_plane(pelvis.solver_position, root.solver_position, root_up);
        let com_v_ground = vec::point_to_plane(com_v, root.solver_position, root_up);
        let center_of_pressure = self.footsteps[0].position.lerp(self.footsteps[1].position, 0.5);
        let com_angle =
            vec::angle(com_v - center_of_pressure, root.solver_rotation * UP) * s.com_angle_mlp;

        for (i, footstep) in self.footsteps.iter_mut().enumerate() {
            footstep.is_support_leg = support_leg == Some(i);
        }

        for footstep in &mut self.footsteps {
            if footstep.is_stepping() {
                let target = com_v_ground + root.solver_rotation * footstep.character_space_offset;
                footstep.update_stepping(target, forward_rotation, STEP_STEER_SPEED, delta_time);
            } else {
                footstep.update_standing(
                    forward_rotation,
                    s.relax_leg_twist_min_angle,
                    s.relax_leg_twist_speed,
                    delta_time,
                );
            }
        }

        if self.can_step() {
            let mut step_leg = None;
            let mut best_value = f32::NEG_INFINITY;

            for i in 0..self.footsteps.len() {
                let footstep = &self.footsteps[i];
                if footstep.is_stepping() {
                    continue;
                }

                let mut target = com_v_ground + root.solver_rotation * footstep.character_space_offset;
                let leg_length = legs[i].chain.mag;
                let thigh_distance = footstep.position.distance(thigh_positions[i]);

                let length_step = thigh_distance >= leg_length * s.max_leg_stretch;
                if length_step {
                    target = pelvis_ground + root.solver_rotation * footstep.character_space_offset;
                }

                let mut collision = false;
                if !length_step {
                    for (n, other) in self.footsteps.iter().enumerate() {
                        if n == i {
                            continue;
                        }
                        let stepping_away = footstep.position.distance(other.position) < FOOT_RADIUS
                            && (footstep.position - target).length_squared()
                                < (other.position - target).length_squared();
                        if !stepping_away {
                            collision =
                                line_sphere_collision(footstep.position, target, other.position, FOOT_RADIUS);
                        }
                        if collision {
                            break;
                        }
                    }
                }

                let angle = quat::angle(forward_rotation, footstep.step_to_root_rot);
                if collision && angle <= s.angle_threshold {
                    continue;
                }

                let step_distance = footstep.position.distance(target);
                let mut threshold = lerp(s.step_threshold, s.step_threshold * 0.1, com_angle * 0.015);
                if length_step {
                    threshold *= 0.5;
                }
                if i == 0 {
                    threshold *= 0.9;
                }

                if step_distance > threshold || angle > s.angle_threshold {
                    let value = -step_distance;
                    if value > best_value {
                        step_leg = Some(i);
                        best_value = value;
                    }
                }
            }

            if let Some(i) = step_leg {
                let target = com_v_ground + root.solver_rotation * self.footsteps[i].character_space_offset;
                let speed = if s.step_speed > 0.0 {
                    self.rng.gen_range(s.step_speed..=s.step_speed * 1.5)
                } else {
                    s.step_speed
                };
                let threshold = s.step_threshold;
                let footstep = &mut self.footsteps[i];
                footstep.step_speed = speed;
                footstep.step_to(target, forward_rotation, threshold);
                tracing::debug!(foot = Side::ALL[i].as_str(), speed, "Footstep triggered");
            }
        }

        let interpolation = self.settings.step_interpolation;
        for (i, footstep) in self.footsteps.iter_mut().enumerate() {
            if footstep.update(interpolation, delta_time) {
                events.push(match i {
                    0 => FootstepEvent::Left,
                    _ => FootstepEvent::Right,
                });
            }
        }

        let s = &self.settings;
        let [left, right] = [&self.footsteps[0], &self.footsteps[1]];
        FootPlacement {
            left_position: vec::point_to_plane(left.position, legs[0].chain.last().read_position, root_up),
            right_position: vec::point_to_plane(right.position, legs[1].chain.last().read_position, root_up),
            left_rotation: left.rotation,
            right_rotation: right.rotation,
            left_offset: s.step_height.evaluate(left.step_progress()),
            right_offset: s.step_height.evaluate(right.step_progress()),
            left_heel_offset: s.heel_height.evaluate(left.step_progress()),
            right_heel_offset: s.heel_height.evaluate(right.step_progress()),
        }
    }

    fn can_step(&self) -> bool {
        self.footsteps
            .iter()
            .all(|f| !f.is_stepping() || f.step_progress() >= STAGGER_PROGRESS)
    }
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

/// Whether the segment `line_start → line_end` passes within
/// `sphere_radius` of `sphere_center`.
fn line_sphere_collision(line_start: Vec3, line_end: Vec3, sphere_center: Vec3, sphere_radius: f32) -> bool {
    let line = line_end - line_start;
    let to_sphere = sphere_center - line_start;
    let d = to_sphere.length() - sphere_radius;
    if d > line.length() {
        return false;
    }

    let q = quat::look_rotation(line, to_sphere);
    let local = q.inverse() * to_sphere;
    if local.z < 0.0 {
        return d < 0.0;
    }
    local.y - sphere_radius < 0.0
}
