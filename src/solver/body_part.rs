//! Shared chain state and the interface every body part implements.

use glam::{Quat, Vec3};

use super::targets::Targets;
use super::virtual_bone::{self, VirtualBone};
use crate::math::quat;
use crate::skeleton::{JointName, Layout, Pose, Transform};

/// Bones of one body part plus the snapshot of the joint it hangs from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chain {
    pub joints: Vec<JointName>,
    pub bones: Vec<VirtualBone>,
    pub root_position: Vec3,
    pub root_rotation: Quat,
    /// Total rest length of the chain
    pub mag: f32,
    pub sqr_mag: f32,
    pub initiated: bool,
    pub lod: u8,
}

impl Chain {
    /// Samples `joints` from the pose, rebuilding the bone list when the
    /// joint set changed.
    pub fn read_bones(&mut self, pose: &Pose, joints: Vec<JointName>) {
        if self.joints != joints {
            self.bones = joints
                .iter()
                .map(|&j| {
                    let t = pose.get(j).unwrap_or_default();
                    VirtualBone::new(t.position, t.rotation)
                })
                .collect();
            self.joints = joints;
            self.initiated = false;
            return;
        }

        for (bone, &joint) in self.bones.iter_mut().zip(&self.joints) {
            let t = pose.get(joint).unwrap_or_default();
            bone.read(t.position, t.rotation);
        }
    }

    pub fn last(&self) -> &VirtualBone {
        &self.bones[self.bones.len() - 1]
    }

    /// Moves every bone by `delta`.
    pub fn move_position(&mut self, delta: Vec3) {
        for bone in &mut self.bones {
            bone.solver_position += delta;
        }
    }

    /// Rotates the chain about its first bone so that bone ends up at
    /// `rotation`.
    pub fn move_rotation(&mut self, rotation: Quat) {
        let q = quat::difference(self.bones[0].solver_rotation, rotation);
        let pivot = self.bones[0].solver_position;
        virtual_bone::rotate_around_point(&mut self.bones, 0, pivot, q);
    }

    /// Places the first bone at `position` with `rotation`, carrying the rest.
    pub fn translate(&mut self, position: Vec3, rotation: Quat) {
        self.move_position(position - self.bones[0].solver_position);
        self.move_rotation(rotation);
    }

    /// Moves the chain along with its parent joint's new transform.
    pub fn translate_root(&mut self, new_root_position: Vec3, new_root_rotation: Quat) {
        let delta_position = new_root_position - self.root_position;
        self.root_position = new_root_position;
        self.move_position(delta_position);

        let delta_rotation = quat::difference(self.root_rotation, new_root_rotation);
        self.root_rotation = new_root_rotation;
        virtual_bone::rotate_around_point(&mut self.bones, 0, new_root_position, delta_rotation);
    }

    /// Rotates `bones[index..]` about `bones[index]` towards `rotation`.
    pub fn rotate_to(&mut self, index: usize, rotation: Quat, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let bone = self.bones[index];
        let q = quat::spherical_blend(quat::difference(bone.solver_rotation, rotation), weight);
        virtual_bone::rotate_around_point(&mut self.bones, index, bone.solver_position, q);
    }
}

/// A spine, arm or leg.
///
/// One solve call runs `read → pre_solve → apply_offsets → (part-specific
/// solve) → reset_offsets → write` on every part.
pub trait BodyPart {
    fn chain(&self) -> &Chain;

    fn chain_mut(&mut self) -> &mut Chain;

    /// Samples the part's bones; performs one-time setup on first read.
    fn on_read(&mut self, pose: &Pose, layout: &Layout);

    /// Pulls goals from `targets` and derives this frame's IK goal.
    fn pre_solve(&mut self, targets: &Targets);

    /// Folds the accumulated additive offsets into the IK goal.
    fn apply_offsets(&mut self);

    /// Clears additive offsets after the pose has been written.
    fn reset_offsets(&mut self);

    fn read(&mut self, pose: &Pose, layout: &Layout, root: JointName) {
        let root_t = pose.get(root).unwrap_or_default();
        {
            let chain = self.chain_mut();
            chain.root_position = root_t.position;
            chain.root_rotation = root_t.rotation;
        }

        self.on_read(pose, layout);

        let chain = self.chain_mut();
        chain.mag = virtual_bone::pre_solve(&mut chain.bones);
        chain.sqr_mag = chain.mag * chain.mag;
        chain.initiated = true;
    }

    fn set_lod(&mut self, lod: u8) {
        self.chain_mut().lod = lod;
    }

    /// Writes solver transforms of every bone into `pose`.
    fn write(&self, pose: &mut Pose) {
        let chain = self.chain();
        for (bone, &joint) in chain.bones.iter().zip(&chain.joints) {
            pose.set(joint, Transform::new(bone.solver_position, bone.solver_rotation));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{References, Rig, Side};

    fn arm_chain() -> (Chain, Pose) {
        let rig = Rig::reference_humanoid();
        let pose = Pose::from_rig(&rig, &References::from_rig_names(&rig));
        let layout = pose.layout().unwrap();
        let mut chain = Chain::default();
        chain.read_bones(&pose, layout.arm_joints(Side::Left));
        virtual_bone::pre_solve(&mut chain.bones);
        (chain, pose)
    }

    #[test]
    fn test_read_bones_rebuilds_on_new_joint_set() {
        let (mut chain, pose) = arm_chain();
        assert_eq!(chain.bones.len(), 4);
        assert!(!chain.initiated);
        chain.initiated = true;

        chain.read_bones(&pose, vec![JointName::LeftUpperArm, JointName::LeftForearm]);
        assert_eq!(chain.bones.len(), 2);
        assert!(!chain.initiated);
    }

    #[test]
    fn test_translate_root_carries_bones() {
        let (mut chain, _) = arm_chain();
        chain.root_position = Vec3::ZERO;
        chain.root_rotation = Quat::IDENTITY;
        let hand_before = chain.last().solver_position;

        let turn = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        chain.translate_root(Vec3::new(0.0, 1.0, 0.0), turn);

        let expected = Vec3::Y + turn * hand_before;
        assert!(
            chain.last().solver_position.abs_diff_eq(expected, 1e-5),
            "got {:?}, expected {:?}",
            chain.last().solver_position,
            expected
        );
        assert_eq!(chain.root_rotation, turn);
    }

    #[test]
    fn test_rotate_to_partial_weight() {
        let (mut chain, _) = arm_chain();
        let goal = Quat::from_rotation_z(1.0);
        chain.rotate_to(1, goal, 0.5);
        let a = quat::angle(chain.bones[1].solver_rotation, goal);
        assert!((a - 28.65).abs() < 0.1, "half-way rotation expected, got {}", a);

        chain.rotate_to(1, goal, 0.0);
        chain.rotate_to(1, goal, 1.0);
        assert!(chain.bones[1].solver_rotation.abs_diff_eq(goal, 1e-5));
    }

    #[test]
    fn test_translate_places_first_bone() {
        let (mut chain, _) = arm_chain();
        let rot = Quat::from_rotation_x(0.3);
        chain.translate(Vec3::new(1.0, 2.0, 3.0), rot);
        assert!(chain.bones[0].solver_position.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(chain.bones[0].solver_rotation.abs_diff_eq(rot, 1e-5));
        let d = chain.bones[0].solver_position.distance(chain.bones[1].solver_position);
        assert!((d - 0.13).abs() < 1e-5);
    }
}
