//! Leg: thigh, calf, foot and optional toes solved with two trigonometric
//! passes, knee bend-normal selection, stretching and twist relaxation.

use glam::{Quat, Vec3};

use super::body_part::{BodyPart, Chain};
use super::targets::Targets;
use super::virtual_bone;
use crate::config::LegSettings;
use crate::math::{quat, RIGHT};
use crate::skeleton::{Layout, Pose, Side};

const THIGH: usize = 0;
const CALF: usize = 1;
const FOOT: usize = 2;
const TOES: usize = 3;

#[derive(Debug, Clone)]
pub struct Leg {
    pub side: Side,
    pub chain: Chain,
    pub settings: LegSettings,

    /// Goal for the last bone (toes when present, else foot)
    pub ik_position: Vec3,
    pub ik_rotation: Quat,
    pub bend_goal: Option<Vec3>,

    pub foot_position_offset: Vec3,
    pub heel_position_offset: Vec3,
    pub foot_rotation_offset: Quat,

    /// Last-bone goal after weights and offsets
    pub position: Vec3,
    pub rotation: Quat,
    /// Foot goal after weights and offsets
    pub foot_position: Vec3,
    pub foot_rotation: Quat,
    pub has_toes: bool,
    /// Thigh position in pelvis space, refreshed every pre-solve
    pub thigh_relative_to_pelvis: Vec3,
    /// Cached thigh→last-bone distance used by pelvis limiting
    pub current_mag: f32,

    bend_normal: Vec3,
    bend_normal_relative_to_pelvis: Vec3,
    bend_normal_relative_to_target: Vec3,
    calf_relative_to_thigh: Quat,
    thigh_relative_to_foot: Quat,
}

impl Leg {
    pub fn new(side: Side, settings: &LegSettings) -> Self {
        Self {
            side,
            chain: Chain::default(),
            settings: settings.clamped(),
            ik_position: Vec3::ZERO,
            ik_rotation: Quat::IDENTITY,
            bend_goal: None,
            foot_position_offset: Vec3::ZERO,
            heel_position_offset: Vec3::ZERO,
            foot_rotation_offset: Quat::IDENTITY,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            foot_position: Vec3::ZERO,
            foot_rotation: Quat::IDENTITY,
            has_toes: false,
            thigh_relative_to_pelvis: Vec3::ZERO,
            current_mag: 0.0,
            bend_normal: RIGHT,
            bend_normal_relative_to_pelvis: RIGHT,
            bend_normal_relative_to_target: RIGHT,
            calf_relative_to_thigh: Quat::IDENTITY,
            thigh_relative_to_foot: Quat::IDENTITY,
        }
    }

    pub fn apply_settings(&mut self, settings: &LegSettings) {
        self.settings = settings.clamped();
    }

    pub fn thigh(&self) -> &virtual_bone::VirtualBone {
        &self.chain.bones[THIGH]
    }

    /// Knee bend normal used by the last solve.
    pub fn bend_normal(&self) -> Vec3 {
        self.bend_normal
    }

    fn animated_bend_normal(&self) -> Option<Vec3> {
        let b = &self.chain.bones;
        (b[CALF].solver_position - b[THIGH].solver_position)
            .cross(b[FOOT].solver_position - b[CALF].solver_position)
            .try_normalize()
    }

    /// Moves the foot and last-bone goals by `offset * weight`.
    pub fn apply_position_offset(&mut self, offset: Vec3, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let offset = offset * weight;
        self.foot_position += offset;
        self.position += offset;
    }

    /// Rotates the foot goal about the last-bone goal.
    pub fn apply_rotation_offset(&mut self, offset: Quat, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let offset = quat::linear_blend(offset, weight);
        self.foot_rotation = offset * self.foot_rotation;
        self.rotation = offset * self.rotation;
        self.bend_normal = offset * self.bend_normal;
        self.foot_position = self.position + offset * (self.foot_position - self.position);
    }

    /// Final per-frame solve. `stretch` enables overreach stretching.
    pub fn solve(&mut self, stretch: bool) {
        if stretch && self.chain.lod < 1 {
            self.stretching();
        }

        virtual_bone::solve_trigonometric(
            &mut self.chain.bones,
            THIGH,
            CALF,
            FOOT,
            self.foot_position,
            self.bend_normal,
            1.0,
        );
        self.chain.rotate_to(FOOT, self.foot_rotation, 1.0);

        if !self.has_toes {
            self.fix_twist_rotations();
            return;
        }

        let b = &self.chain.bones;
        let toe_normal = (b[FOOT].solver_position - b[THIGH].solver_position)
            .cross(b[TOES].solver_position - b[FOOT].solver_position);
        virtual_bone::solve_trigonometric(
            &mut self.chain.bones,
            THIGH,
            FOOT,
            TOES,
            self.position,
            toe_normal,
            1.0,
        );
        self.fix_twist_rotations();
        self.chain.bones[TOES].solver_rotation = self.rotation;
    }

    fn fix_twist_rotations(&mut self) {
        if self.chain.lod >= 1 {
            return;
        }
        let w = self.settings.bend_to_target_weight;
        let bones = &mut self.chain.bones;

        if w > 0.0 {
            let thigh_rotation = self.rotation * self.thigh_relative_to_foot;
            let f = quat::from_to_rotation(
                thigh_rotation * bones[THIGH].axis,
                bones[CALF].solver_position - bones[THIGH].solver_position,
            );
            bones[THIGH].solver_rotation =
                quat::slerp(bones[THIGH].solver_rotation, f * thigh_rotation, w);
        }

        let calf_rotation = bones[THIGH].solver_rotation * self.calf_relative_to_thigh;
        let f = quat::from_to_rotation(
            calf_rotation * bones[CALF].axis,
            bones[FOOT].solver_position - bones[CALF].solver_position,
        );
        bones[CALF].solver_rotation = f * calf_rotation;
    }

    fn stretching(&mut self) {
        let mlp = self.settings.leg_length_mlp;
        let pos_w = self.settings.position_weight;
        let has_toes = self.has_toes;
        let bones = &mut self.chain.bones;

        let mut leg_length = bones[THIGH].length + bones[CALF].length;

        if mlp != 1.0 {
            leg_length *= mlp;
            let knee_add =
                (bones[CALF].solver_position - bones[THIGH].solver_position) * (mlp - 1.0) * pos_w;
            let foot_add =
                (bones[FOOT].solver_position - bones[CALF].solver_position) * (mlp - 1.0) * pos_w;
            shift_below_knee(bones, has_toes, knee_add, foot_add);
        }

        if leg_length <= 0.0 || self.settings.stretch_curve.is_empty() {
            return;
        }

        let distance_to_target = bones[THIGH].solver_position.distance(self.foot_position);
        let stretch = self.settings.stretch_curve.evaluate(distance_to_target / leg_length) * pos_w;
        let knee_add = (bones[CALF].solver_position - bones[THIGH].solver_position) * stretch;
        let foot_add = (bones[FOOT].solver_position - bones[CALF].solver_position) * stretch;
        shift_below_knee(bones, has_toes, knee_add, foot_add);
    }
}

/// Moves the calf by `knee_add` and everything below it by both offsets.
fn shift_below_knee(
    bones: &mut [virtual_bone::VirtualBone],
    has_toes: bool,
    knee_add: Vec3,
    foot_add: Vec3,
) {
    bones[CALF].solver_position += knee_add;
    bones[FOOT].solver_position += knee_add + foot_add;
    if has_toes {
        bones[TOES].solver_position += knee_add + foot_add;
    }
}

impl BodyPart for Leg {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }

    fn on_read(&mut self, pose: &Pose, layout: &Layout) {
        self.chain.read_bones(pose, layout.leg_joints(self.side));
        self.has_toes = layout.has_toes;

        if self.chain.initiated {
            return;
        }

        self.bend_normal = self
            .animated_bend_normal()
            .unwrap_or(self.chain.root_rotation * RIGHT);
        self.bend_normal_relative_to_pelvis = self.chain.root_rotation.inverse() * self.bend_normal;

        let last = *self.chain.last();
        self.bend_normal_relative_to_target = last.read_rotation.inverse() * self.bend_normal;
        self.ik_position = last.read_position;
        self.ik_rotation = last.read_rotation;
        self.rotation = last.read_rotation;
    }

    fn pre_solve(&mut self, targets: &Targets) {
        let last = *self.chain.last();
        match targets.foot(self.side) {
            Some(t) => {
                self.ik_position = t.position;
                self.ik_rotation = t.rotation;
            }
            None => {
                self.ik_position = last.read_position;
                self.ik_rotation = last.read_rotation;
            }
        }
        self.bend_goal = targets.knee_goal(self.side);

        let bones = &self.chain.bones;
        self.foot_position = bones[FOOT].solver_position;
        self.foot_rotation = bones[FOOT].solver_rotation;
        self.position = last.solver_position;
        self.rotation = last.solver_rotation;

        let rot_w = self.settings.rotation_weight;
        if rot_w > 0.0 {
            self.apply_rotation_offset(quat::difference(self.rotation, self.ik_rotation), rot_w);
        }
        let pos_w = self.settings.position_weight;
        if pos_w > 0.0 {
            self.apply_position_offset(self.ik_position - self.position, pos_w);
        }

        let bones = &self.chain.bones;
        let root_inv = self.chain.root_rotation.inverse();
        self.thigh_relative_to_pelvis = root_inv * (bones[THIGH].solver_position - self.chain.root_position);
        self.calf_relative_to_thigh = bones[THIGH].solver_rotation.inverse() * bones[CALF].solver_rotation;
        self.thigh_relative_to_foot = last.solver_rotation.inverse() * bones[THIGH].solver_rotation;

        let bend_normal = if self.settings.use_animated_bend_normal {
            self.animated_bend_normal().unwrap_or(self.bend_normal)
        } else {
            let w = self.settings.bend_to_target_weight;
            let from_pelvis = self.chain.root_rotation * self.bend_normal_relative_to_pelvis;
            let from_target = self.rotation * self.bend_normal_relative_to_target;
            if w <= 0.0 {
                from_pelvis
            } else if w >= 1.0 {
                from_target
            } else {
                crate::math::vec::slerp(from_pelvis, from_target, w)
            }
        };
        self.bend_normal = bend_normal
            .try_normalize()
            .unwrap_or(self.chain.root_rotation * RIGHT);
    }

    fn apply_offsets(&mut self) {
        self.apply_position_offset(self.foot_position_offset, 1.0);
        self.apply_rotation_offset(self.foot_rotation_offset, 1.0);

        // Heel lift pivots the foot about the last-bone goal
        let heel = quat::from_to_rotation(
            self.foot_position - self.position,
            self.foot_position + self.heel_position_offset - self.position,
        );
        self.foot_position = self.position + heel * (self.foot_position - self.position);
        self.foot_rotation = heel * self.foot_rotation;

        let bones = &self.chain.bones;
        let thigh = bones[THIGH].solver_position;

        let mut goal_angle = 0.0;
        if let Some(goal) = self.bend_goal {
            if self.settings.bend_goal_weight > 0.0 {
                let b = (goal - thigh).cross(self.position - thigh);
                let space = quat::look_rotation(self.bend_normal, thigh - bones[FOOT].solver_position);
                let b_local = space.inverse() * b;
                goal_angle =
                    b_local.x.atan2(b_local.z).to_degrees() * self.settings.bend_goal_weight;
            }
        }

        let swivel = self.settings.swivel_offset + goal_angle;
        if swivel != 0.0 {
            let last = self.chain.last().solver_position;
            self.bend_normal = quat::angle_axis(swivel, thigh - last) * self.bend_normal;
            let thigh_bone = &mut self.chain.bones[THIGH];
            thigh_bone.solver_rotation =
                quat::angle_axis(-swivel, thigh_bone.direction()) * thigh_bone.solver_rotation;
        }
    }

    fn reset_offsets(&mut self) {
        self.foot_position_offset = Vec3::ZERO;
        self.foot_rotation_offset = Quat::IDENTITY;
        self.heel_position_offset = Vec3::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{FloatCurve, Keyframe};
    use crate::skeleton::{JointName, References, Rig, Transform};

    fn reference_pose() -> (Pose, Layout) {
        let rig = Rig::reference_humanoid();
        let pose = Pose::from_rig(&rig, &References::from_rig_names(&rig));
        let layout = pose.layout().unwrap();
        (pose, layout)
    }

    fn solve_leg(leg: &mut Leg, pose: &Pose, layout: &Layout, targets: &Targets) {
        leg.read(pose, layout, JointName::Pelvis);
        leg.pre_solve(targets);
        leg.apply_offsets();
        leg.solve(true);
    }

    #[test]
    fn test_weight_zero_reproduces_read_pose() {
        let (pose, layout) = reference_pose();
        let mut leg = Leg::new(Side::Left, &LegSettings::default());
        let targets = Targets {
            left_foot: Some(Transform::from_position(Vec3::new(0.3, 0.5, 0.4))),
            ..Default::default()
        };

        solve_leg(&mut leg, &pose, &layout, &targets);

        for (bone, joint) in leg.chain.bones.iter().zip(&leg.chain.joints) {
            assert!(
                bone.solver_position.abs_diff_eq(pose.position(*joint), 1e-4),
                "{} moved to {:?}",
                joint.as_str(),
                bone.solver_position
            );
        }
    }

    #[test]
    fn test_reachable_target_converges() {
        let (pose, layout) = reference_pose();
        let settings = LegSettings {
            position_weight: 1.0,
            rotation_weight: 1.0,
            ..Default::default()
        };
        let mut leg = Leg::new(Side::Left, &settings);
        let goal = pose.position(JointName::LeftToes) + Vec3::new(0.05, 0.25, 0.1);
        let goal_rot = Quat::from_rotation_x(-0.3);
        let targets = Targets {
            left_foot: Some(Transform::new(goal, goal_rot)),
            ..Default::default()
        };

        solve_leg(&mut leg, &pose, &layout, &targets);

        let toes = leg.chain.last();
        assert!(
            toes.solver_position.abs_diff_eq(goal, 1e-3),
            "toes at {:?}, expected {:?}",
            toes.solver_position,
            goal
        );
        assert!(toes.solver_rotation.abs_diff_eq(goal_rot, 1e-4));

        // Bone lengths survive the solve
        let b = &leg.chain.bones;
        let thigh_len = b[THIGH].solver_position.distance(b[CALF].solver_position);
        assert!((thigh_len - b[THIGH].length).abs() < 1e-4);
    }

    #[test]
    fn test_knee_bends_forward() {
        let (pose, layout) = reference_pose();
        let settings = LegSettings {
            position_weight: 1.0,
            ..Default::default()
        };
        let mut leg = Leg::new(Side::Right, &settings);
        let goal = pose.position(JointName::RightToes) + Vec3::Y * 0.3;
        let targets = Targets {
            right_foot: Some(Transform::from_position(goal)),
            ..Default::default()
        };

        solve_leg(&mut leg, &pose, &layout, &targets);

        let b = &leg.chain.bones;
        let knee_forward = b[CALF].solver_position.z
            - (b[THIGH].solver_position.z + b[FOOT].solver_position.z) * 0.5;
        assert!(knee_forward > 0.05, "knee should bend forward, got {}", knee_forward);
    }

    #[test]
    fn test_overreach_with_stretch_curve() {
        let (pose, layout) = reference_pose();
        let settings = LegSettings {
            position_weight: 1.0,
            stretch_curve: FloatCurve::new(vec![
                Keyframe::new(1.0, 0.0),
                Keyframe::new(2.0, 0.5),
            ]),
            ..Default::default()
        };
        let mut leg = Leg::new(Side::Left, &settings);
        leg.read(&pose, &layout, JointName::Pelvis);
        let thigh = leg.thigh().read_position;
        let rest = leg.chain.bones[THIGH].length + leg.chain.bones[CALF].length;
        let toe_offset = pose.position(JointName::LeftToes) - pose.position(JointName::LeftFoot);

        // Foot goal 1.5x the leg length straight down and forward
        let dir = Vec3::new(0.0, -1.0, 0.3).normalize();
        let foot_goal = thigh + dir * rest * 1.5;
        let targets = Targets {
            left_foot: Some(Transform::from_position(foot_goal + toe_offset)),
            ..Default::default()
        };

        leg.pre_solve(&targets);
        leg.apply_offsets();
        leg.solve(true);

        let reach = leg.chain.bones[FOOT].solver_position.distance(thigh);
        assert!(reach >= rest - 1e-4, "stretched reach {} below rest {}", reach, rest);
        assert!(reach <= rest * 1.5 + 1e-4, "reach {} beyond target", reach);
        assert!(reach > rest + 1e-3, "stretch curve should lengthen the leg");
    }

    #[test]
    fn test_offsets_reset() {
        let mut leg = Leg::new(Side::Left, &LegSettings::default());
        leg.foot_position_offset = Vec3::ONE;
        leg.heel_position_offset = Vec3::Y;
        leg.foot_rotation_offset = Quat::from_rotation_x(1.0);
        leg.reset_offsets();
        assert_eq!(leg.foot_position_offset, Vec3::ZERO);
        assert_eq!(leg.heel_position_offset, Vec3::ZERO);
        assert_eq!(leg.foot_rotation_offset, Quat::IDENTITY);
    }

    #[test]
    fn test_swivel_rotates_bend_normal() {
        let (pose, layout) = reference_pose();
        let settings = LegSettings {
            position_weight: 1.0,
            swivel_offset: 90.0,
            ..Default::default()
        };
        let mut leg = Leg::new(Side::Left, &settings);
        leg.read(&pose, &layout, JointName::Pelvis);
        leg.pre_solve(&Targets::default());
        let before = leg.bend_normal();
        leg.apply_offsets();
        let after = leg.bend_normal();
        let angle = crate::math::vec::angle(before, after);
        assert!((angle - 90.0).abs() < 1.0, "swivel should turn the normal, got {}", angle);
    }
}
