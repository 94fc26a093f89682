//! Arm: optional shoulder, upper arm, forearm and hand.
//!
//! The shoulder is swung first (yaw/pitch with damped limits, or a half
//! weight shortest-arc swing), then the elbow is placed with a trigonometric
//! solve whose bend normal comes from the chest frame, the hand orientation
//! and the optional elbow goal. Finally upper arm and forearm twist is
//! re-derived from the bend plane.

use glam::{Quat, Vec3};

use super::body_part::{BodyPart, Chain};
use super::targets::Targets;
use super::virtual_bone::{self, VirtualBone};
use crate::config::{ArmSettings, ShoulderRotationMode};
use crate::math::{axis, delta_angle, quat, vec, InterpolationMode, FORWARD, RIGHT, UP};
use crate::skeleton::{JointName, Layout, Pose, Side};

const YAW_OFFSET_ANGLE: f32 = 45.0;
const PITCH_OFFSET_ANGLE: f32 = -30.0;

#[derive(Debug, Clone)]
pub struct Arm {
    pub side: Side,
    pub chain: Chain,
    pub settings: ArmSettings,

    pub ik_position: Vec3,
    pub ik_rotation: Quat,
    pub bend_goal: Option<Vec3>,
    /// Direction the elbow bends towards when `bend_goal_weight` > 0 and no
    /// goal point is given
    pub bend_direction: Vec3,
    pub hand_position_offset: Vec3,

    /// Hand goal after weights and offsets
    pub position: Vec3,
    pub rotation: Quat,
    pub has_shoulder: bool,

    chest_forward_axis: Vec3,
    chest_up_axis: Vec3,
    chest_rotation: Quat,
    chest_forward: Vec3,
    chest_up: Vec3,
    forearm_relative_to_upper_arm: Quat,
    upper_arm_bend_axis: Vec3,
}

impl Arm {
    pub fn new(side: Side, settings: &ArmSettings) -> Self {
        Self {
            side,
            chain: Chain::default(),
            settings: settings.clamped(),
            ik_position: Vec3::ZERO,
            ik_rotation: Quat::IDENTITY,
            bend_goal: None,
            bend_direction: -FORWARD,
            hand_position_offset: Vec3::ZERO,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            has_shoulder: false,
            chest_forward_axis: FORWARD,
            chest_up_axis: UP,
            chest_rotation: Quat::IDENTITY,
            chest_forward: FORWARD,
            chest_up: UP,
            forearm_relative_to_upper_arm: Quat::IDENTITY,
            upper_arm_bend_axis: Vec3::ZERO,
        }
    }

    pub fn apply_settings(&mut self, settings: &ArmSettings) {
        self.settings = settings.clamped();
    }

    fn shoulder(&self) -> usize {
        0
    }

    fn upper_arm(&self) -> usize {
        usize::from(self.has_shoulder)
    }

    fn forearm(&self) -> usize {
        self.upper_arm() + 1
    }

    fn hand(&self) -> usize {
        self.upper_arm() + 2
    }

    pub fn hand_bone(&self) -> &VirtualBone {
        &self.chain.bones[self.hand()]
    }

    /// Hand goal used by the spine's chest-by-hands lean.
    pub fn target_position(&self) -> Vec3 {
        self.position
    }

    pub fn solve(&mut self, is_left: bool) {
        let root_rotation = self.chain.root_rotation;
        self.chest_rotation = quat::look_rotation(
            root_rotation * self.chest_forward_axis,
            root_rotation * self.chest_up_axis,
        );
        self.chest_forward = self.chest_rotation * FORWARD;
        self.chest_up = self.chest_rotation * UP;

        let pos_w = self.settings.position_weight;
        let (upper, fore, hand) = (self.upper_arm(), self.forearm(), self.hand());
        let bend_normal;

        if self.has_shoulder && self.settings.shoulder_rotation_weight > 0.0 && self.chain.lod < 1 {
            bend_normal = match self.settings.shoulder_rotation_mode {
                ShoulderRotationMode::YawPitch => self.solve_yaw_pitch(is_left),
                ShoulderRotationMode::FromTo => self.solve_from_to(is_left),
            };
        } else {
            if self.chain.lod < 1 {
                self.stretching();
            }
            bend_normal = self.bend_normal(self.position - self.chain.bones[upper].solver_position);
            if self.has_shoulder {
                virtual_bone::solve_trigonometric(
                    &mut self.chain.bones,
                    1,
                    2,
                    3,
                    self.position,
                    bend_normal,
                    pos_w,
                );
            } else {
                virtual_bone::solve_trigonometric(
                    &mut self.chain.bones,
                    0,
                    1,
                    2,
                    self.position,
                    bend_normal,
                    pos_w,
                );
            }
        }

        if self.chain.lod < 1 {
            // Upper arm twist follows the bend plane, faded with the arm weight
            let bones = &mut self.chain.bones;
            let to_forearm = bones[fore].solver_position - bones[upper].solver_position;
            let space = quat::look_rotation(
                bones[upper].solver_rotation * self.upper_arm_bend_axis,
                to_forearm,
            );
            let twist = space.inverse() * bend_normal;
            let angle = twist.x.atan2(twist.z).to_degrees();
            bones[upper].solver_rotation =
                quat::angle_axis(angle * pos_w, to_forearm) * bones[upper].solver_rotation;

            // Forearm twist relative to the upper arm
            let forearm_fixed = bones[upper].solver_rotation * self.forearm_relative_to_upper_arm;
            let from_to = quat::from_to_rotation(
                forearm_fixed * bones[fore].axis,
                bones[hand].solver_position - bones[fore].solver_position,
            );
            self.chain.rotate_to(fore, from_to * forearm_fixed, pos_w);
        }

        let rot_w = self.settings.rotation_weight;
        if rot_w >= 1.0 {
            self.chain.bones[hand].solver_rotation = self.rotation;
        } else if rot_w > 0.0 {
            let current = self.chain.bones[hand].solver_rotation;
            self.chain.bones[hand].solver_rotation = current.lerp(self.rotation, rot_w);
        }
    }

    fn solve_yaw_pitch(&mut self, is_left: bool) -> Vec3 {
        let pos_w = self.settings.position_weight;
        let shoulder_w = self.settings.shoulder_rotation_weight;
        let shoulder = self.chain.bones[self.shoulder()];

        // Yaw
        let s_dir = (self.position - shoulder.solver_position).normalize_or_zero();
        let yaw_offset = if is_left { YAW_OFFSET_ANGLE } else { -YAW_OFFSET_ANGLE };
        let side_angle = if is_left { -90.0 } else { 90.0 };
        let working_space =
            quat::angle_axis(side_angle + yaw_offset, self.chest_up) * self.chest_rotation;
        let s_dir_working = working_space.inverse() * s_dir;

        let mut yaw = s_dir_working.x.atan2(s_dir_working.z).to_degrees();
        yaw *= 1.0 - s_dir_working.y.abs();
        yaw -= yaw_offset;
        let (yaw_min, yaw_max) = if is_left { (-20.0, 50.0) } else { (-50.0, 20.0) };
        let yaw = damper_value(yaw, yaw_min - yaw_offset, yaw_max - yaw_offset, 0.7);

        let f = shoulder.solver_rotation * shoulder.axis;
        let t = working_space * (quat::angle_axis(yaw, UP) * FORWARD);
        let yaw_rotation = quat::from_to_rotation(f, t);

        // Pitch
        let pitch_offset = if is_left { PITCH_OFFSET_ANGLE } else { -PITCH_OFFSET_ANGLE };
        let working_space = quat::angle_axis(pitch_offset, self.chest_forward)
            * quat::angle_axis(side_angle, self.chest_up)
            * self.chest_rotation;

        let lateral = if is_left { RIGHT } else { -RIGHT };
        let s_dir = self.position
            - (shoulder.solver_position + self.chest_rotation * lateral * self.chain.mag);
        let s_dir_working = working_space.inverse() * s_dir;

        let pitch = s_dir_working.y.atan2(s_dir_working.z).to_degrees() - PITCH_OFFSET_ANGLE;
        let pitch = damper_value(
            pitch,
            -45.0 - PITCH_OFFSET_ANGLE,
            45.0 - PITCH_OFFSET_ANGLE,
            1.0,
        );
        let pitch_rotation = quat::angle_axis(-pitch, working_space * RIGHT);

        let shoulder_rotation =
            quat::linear_blend(pitch_rotation * yaw_rotation, shoulder_w * pos_w);
        virtual_bone::rotate_chain_by(&mut self.chain.bones, shoulder_rotation);

        self.stretching();

        let upper = self.upper_arm();
        let bend_normal = self.bend_normal(self.position - self.chain.bones[upper].solver_position);
        virtual_bone::solve_trigonometric(
            &mut self.chain.bones,
            1,
            2,
            3,
            self.position,
            bend_normal,
            pos_w,
        );

        let twist = (pitch * pos_w * shoulder_w * self.settings.shoulder_twist_weight * 2.0)
            .clamp(0.0, 180.0);
        self.twist_shoulder(twist, is_left);

        bend_normal
    }

    fn solve_from_to(&mut self, is_left: bool) -> Vec3 {
        let pos_w = self.settings.position_weight;
        let shoulder_w = self.settings.shoulder_rotation_weight;
        let shoulder_index = self.shoulder();
        let shoulder_rotation = self.chain.bones[shoulder_index].solver_rotation;

        let bones = &self.chain.bones;
        let swing = quat::from_to_rotation(
            (bones[1].solver_position - bones[0].solver_position).normalize_or_zero()
                + self.chest_forward,
            self.position - bones[0].solver_position,
        );
        let swing = quat::spherical_blend(swing, 0.5 * shoulder_w * pos_w);
        virtual_bone::rotate_chain_by(&mut self.chain.bones, swing);

        self.stretching();

        let bones = &self.chain.bones;
        let reach_normal = (bones[2].solver_position - bones[0].solver_position)
            .cross(bones[3].solver_position - bones[0].solver_position);
        virtual_bone::solve_trigonometric(
            &mut self.chain.bones,
            0,
            2,
            3,
            self.position,
            reach_normal,
            0.5 * shoulder_w * pos_w,
        );

        let bend_normal = self.bend_normal(self.position - self.chain.bones[1].solver_position);
        virtual_bone::solve_trigonometric(
            &mut self.chain.bones,
            1,
            2,
            3,
            self.position,
            bend_normal,
            pos_w,
        );

        // Twist the shoulders back when the arms are raised
        let q = quat::look_rotation(self.chest_up, self.chest_forward).inverse();
        let shoulder = self.chain.bones[shoulder_index];
        let before = q * (shoulder_rotation * shoulder.axis);
        let after = q * (shoulder.solver_rotation * shoulder.axis);
        let mut pitch = delta_angle(
            before.x.atan2(before.z).to_degrees(),
            after.x.atan2(after.z).to_degrees(),
        );
        if is_left {
            pitch = -pitch;
        }
        let twist = (pitch * shoulder_w * self.settings.shoulder_twist_weight * 2.0 * pos_w)
            .clamp(0.0, 180.0);
        self.twist_shoulder(twist, is_left);

        bend_normal
    }

    /// Rolls shoulder and upper arm about their own axes by `degrees`.
    fn twist_shoulder(&mut self, degrees: f32, is_left: bool) {
        let sign = if is_left { 1.0 } else { -1.0 };
        for index in [self.shoulder(), self.upper_arm()] {
            let bone = &mut self.chain.bones[index];
            bone.solver_rotation =
                quat::angle_axis(degrees, bone.solver_rotation * (bone.axis * sign))
                    * bone.solver_rotation;
        }
    }

    fn stretching(&mut self) {
        let (upper, fore, hand) = (self.upper_arm(), self.forearm(), self.hand());
        let mlp = self.settings.arm_length_mlp;
        let bones = &mut self.chain.bones;

        let mut arm_length = bones[upper].length + bones[fore].length;

        if mlp != 1.0 {
            arm_length *= mlp;
            let elbow_add = (bones[fore].solver_position - bones[upper].solver_position) * (mlp - 1.0);
            let hand_add = (bones[hand].solver_position - bones[fore].solver_position) * (mlp - 1.0);
            bones[fore].solver_position += elbow_add;
            bones[hand].solver_position += elbow_add + hand_add;
        }

        if arm_length <= 0.0 || self.settings.stretch_curve.is_empty() {
            return;
        }

        let distance_to_target = bones[upper].solver_position.distance(self.position);
        let m = self.settings.stretch_curve.evaluate(distance_to_target / arm_length)
            * self.settings.position_weight;

        let elbow_add = (bones[fore].solver_position - bones[upper].solver_position) * m;
        let hand_add = (bones[hand].solver_position - bones[fore].solver_position) * m;
        bones[fore].solver_position += elbow_add;
        bones[hand].solver_position += elbow_add + hand_add;
    }

    /// Elbow bend normal for a reach along `dir` (upper arm → hand goal).
    fn bend_normal(&mut self, dir: Vec3) -> Vec3 {
        if let Some(goal) = self.bend_goal {
            self.bend_direction = goal - self.chain.bones[1].solver_position;
        }

        let first = self.chain.bones[0];
        let arm_dir = first.solver_rotation * first.axis;
        let chest_inv = self.chest_rotation.inverse();

        let q = quat::from_to_rotation(-UP, chest_inv * dir.normalize_or_zero() + FORWARD);
        let mut b = q * -FORWARD;

        let q = quat::from_to_rotation(chest_inv * arm_dir, chest_inv * dir);
        b = self.chest_rotation * (q * b);

        b += arm_dir;
        b -= self.rotation * self.settings.wrist_to_palm_axis;
        b -= self.rotation * self.settings.palm_to_thumb_axis * 0.5;

        if self.settings.bend_goal_weight > 0.0 {
            b = vec::slerp(b, self.bend_direction, self.settings.bend_goal_weight);
        }

        if self.settings.swivel_offset != 0.0 {
            b = quat::angle_axis(self.settings.swivel_offset, -dir) * b;
        }

        b.cross(dir)
    }
}

/// Soft limit: remaps `value` into `[min, max]` through a quintic ease.
/// Weights below 1 halve the distance from the middle of the range first.
fn damper_value(value: f32, min: f32, max: f32, weight: f32) -> f32 {
    let range = max - min;
    let mut value = value;

    if weight < 1.0 {
        let mid = max - range * 0.5;
        value = mid + (value - mid) * 0.5;
    }

    let t = ((value - min) / range).clamp(0.0, 1.0);
    let eased = InterpolationMode::InOutQuintic.eval(t);
    min + (max - min) * eased
}

impl BodyPart for Arm {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }

    fn on_read(&mut self, pose: &Pose, layout: &Layout) {
        self.chain.read_bones(pose, layout.arm_joints(self.side));
        self.has_shoulder = layout.has_shoulders;

        if self.chain.initiated {
            return;
        }

        let hand = *self.hand_bone();
        self.ik_position = hand.read_position;
        self.ik_rotation = hand.read_rotation;
        self.rotation = hand.read_rotation;

        let character = pose.rotation(JointName::Root);
        let root_forward = character * FORWARD;
        let chest_inv = self.chain.root_rotation.inverse();
        self.chest_forward_axis = chest_inv * root_forward;
        self.chest_up_axis = chest_inv * (character * UP);

        let upper = self.chain.bones[self.upper_arm()];
        let fore = self.chain.bones[self.forearm()];
        let forward_axis = axis::signed_axis_to_direction(upper.read_rotation, root_forward);
        self.upper_arm_bend_axis = (upper.read_rotation.inverse()
            * (fore.read_position - upper.read_position))
            .cross(forward_axis);

        if self.upper_arm_bend_axis == Vec3::ZERO {
            tracing::warn!(
                side = self.side.as_str(),
                "Upper arm bend axis is zero; upper arm twist will not be corrected"
            );
        }
    }

    fn pre_solve(&mut self, targets: &Targets) {
        let hand = *self.hand_bone();
        match targets.hand(self.side) {
            Some(t) => {
                self.ik_position = t.position;
                self.ik_rotation = t.rotation;
            }
            None => {
                self.ik_position = hand.read_position;
                self.ik_rotation = hand.read_rotation;
            }
        }
        self.bend_goal = targets.elbow_goal(self.side);

        self.position = vec::lerp(hand.solver_position, self.ik_position, self.settings.position_weight);
        self.rotation = quat::lerp(hand.solver_rotation, self.ik_rotation, self.settings.rotation_weight);

        let first = &mut self.chain.bones[0];
        first.axis = first.axis.normalize_or_zero();

        let upper = self.chain.bones[self.upper_arm()];
        let fore = self.chain.bones[self.forearm()];
        self.forearm_relative_to_upper_arm = upper.solver_rotation.inverse() * fore.solver_rotation;
    }

    fn apply_offsets(&mut self) {
        self.position += self.hand_position_offset;
    }

    fn reset_offsets(&mut self) {
        self.hand_position_offset = Vec3::ZERO;
    }
}
