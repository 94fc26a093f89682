//! Spine: pelvis, spine, optional chest and neck, head.
//!
//! The head goal drags the pelvis along with configurable stiffness, a
//! single FABRIK pass re-fits the chain between them and the chest and head
//! are then bent towards their goal rotations. A bound pelvis target is
//! honoured last with trigonometric passes that keep the head in place.

use glam::{Quat, Vec3};

use super::arm::Arm;
use super::body_part::{BodyPart, Chain};
use super::leg::Leg;
use super::targets::Targets;
use super::virtual_bone::{self, VirtualBone};
use crate::config::SpineSettings;
use crate::math::{quat, vec, FORWARD, RIGHT, UP};
use crate::skeleton::{Layout, Pose};

const PELVIS: usize = 0;
const SPINE: usize = 1;

/// Relaxation passes used when limiting the pelvis against leg reach.
const PELVIS_LIMIT_ITERATIONS: usize = 2;

#[derive(Debug, Clone)]
pub struct Spine {
    pub chain: Chain,
    pub settings: SpineSettings,

    pub ik_position_head: Vec3,
    pub ik_rotation_head: Quat,
    pub ik_position_pelvis: Vec3,
    pub ik_rotation_pelvis: Quat,
    /// Point the chest turns to face when `chest_goal_weight` > 0
    pub goal_position_chest: Vec3,

    pub pelvis_position_offset: Vec3,
    pub chest_position_offset: Vec3,
    pub head_position_offset: Vec3,
    pub pelvis_rotation_offset: Quat,
    pub chest_rotation_offset: Quat,
    pub head_rotation_offset: Quat,

    /// Direction the body faces, derived from the anchor each solve
    pub face_direction: Vec3,
    /// Head offset written by locomotion; survives `reset_offsets`
    pub locomotion_head_position_offset: Vec3,
    /// Head goal after weights and offsets
    pub head_position: Vec3,

    anchor_rotation: Quat,
    anchor_relative_to_head: Quat,
    anchor_relative_to_pelvis: Quat,
    head_rotation: Quat,
    pelvis_rotation: Quat,
    pelvis_relative_rotation: Quat,
    chest_relative_rotation: Quat,
    head_delta_position: Vec3,
    pelvis_delta_rotation: Quat,
    chest_target_rotation: Quat,
    chest_forward: Vec3,

    chest_index: usize,
    neck_index: usize,
    head_index: usize,
    has_chest: bool,
    has_neck: bool,
    has_legs: bool,
    head_height: f32,
    size_mlp: f32,
}

impl Spine {
    pub fn new(settings: &SpineSettings) -> Self {
        Self {
            chain: Chain::default(),
            settings: settings.clamped(),
            ik_position_head: Vec3::ZERO,
            ik_rotation_head: Quat::IDENTITY,
            ik_position_pelvis: Vec3::ZERO,
            ik_rotation_pelvis: Quat::IDENTITY,
            goal_position_chest: Vec3::ZERO,
            pelvis_position_offset: Vec3::ZERO,
            chest_position_offset: Vec3::ZERO,
            head_position_offset: Vec3::ZERO,
            pelvis_rotation_offset: Quat::IDENTITY,
            chest_rotation_offset: Quat::IDENTITY,
            head_rotation_offset: Quat::IDENTITY,
            face_direction: FORWARD,
            locomotion_head_position_offset: Vec3::ZERO,
            head_position: Vec3::ZERO,
            anchor_rotation: Quat::IDENTITY,
            anchor_relative_to_head: Quat::IDENTITY,
            anchor_relative_to_pelvis: Quat::IDENTITY,
            head_rotation: Quat::IDENTITY,
            pelvis_rotation: Quat::IDENTITY,
            pelvis_relative_rotation: Quat::IDENTITY,
            chest_relative_rotation: Quat::IDENTITY,
            head_delta_position: Vec3::ZERO,
            pelvis_delta_rotation: Quat::IDENTITY,
            chest_target_rotation: Quat::IDENTITY,
            chest_forward: FORWARD,
            chest_index: SPINE,
            neck_index: SPINE,
            head_index: 2,
            has_chest: false,
            has_neck: false,
            has_legs: false,
            head_height: 0.0,
            size_mlp: 1.0,
        }
    }

    pub fn apply_settings(&mut self, settings: &SpineSettings) {
        self.settings = settings.clamped();
    }

    pub fn pelvis(&self) -> &VirtualBone {
        &self.chain.bones[PELVIS]
    }

    /// Chest bone, or the spine bone when the rig has no chest.
    pub fn chest(&self) -> &VirtualBone {
        &self.chain.bones[self.chest_index]
    }

    pub fn head(&self) -> &VirtualBone {
        &self.chain.bones[self.head_index]
    }

    /// Rotation the body is anchored to this frame.
    pub fn anchor_rotation(&self) -> Quat {
        self.anchor_rotation
    }

    pub fn anchor_relative_to_head(&self) -> Quat {
        self.anchor_relative_to_head
    }

    /// Head height above the root at bind time, along the root's up axis.
    pub fn head_height(&self) -> f32 {
        self.head_height
    }

    pub fn solve(&mut self, root: &mut VirtualBone, legs: &mut [Leg], arms: &[Arm]) {
        self.calculate_chest_target_rotation(root, arms);

        if self.settings.max_root_angle < 180.0 {
            let mut f = self.face_direction;
            if self.settings.root_heading_offset != 0.0 {
                f = quat::angle_axis(self.settings.root_heading_offset, UP) * f;
            }
            let local = root.solver_rotation.inverse() * f;
            let angle = local.x.atan2(local.z).to_degrees();
            let max_angle = self.settings.max_root_angle;

            let mut rotation = 0.0;
            if angle > max_angle {
                rotation = angle - max_angle;
            }
            if angle < -max_angle {
                rotation = angle + max_angle;
            }
            root.solver_rotation =
                quat::angle_axis(rotation, root.read_rotation * UP) * root.solver_rotation;
        }

        let animated_pelvis_position = self.pelvis().solver_position;
        let pos_w = self.settings.position_weight;
        let rot_w = self.settings.rotation_weight;

        self.translate_pelvis(legs, self.head_delta_position, self.pelvis_delta_rotation);
        self.fabrik_pass(animated_pelvis_position, pos_w);

        let clamp = self.settings.chest_clamp_weight;
        bend_with_offset(
            &mut self.chain.bones,
            PELVIS,
            self.chest_index,
            self.chest_target_rotation,
            self.chest_rotation_offset,
            clamp,
            self.settings.neck_stiffness * rot_w,
        );

        if self.chain.lod < 1 && self.settings.chest_goal_weight > 0.0 {
            let chest = self.chain.bones[self.chest_index];
            let c = quat::from_to_rotation(
                chest.solver_rotation * self.chest_forward,
                self.goal_position_chest - chest.solver_position,
            ) * chest.solver_rotation;
            bend_with_offset(
                &mut self.chain.bones,
                PELVIS,
                self.chest_index,
                c,
                self.chest_rotation_offset,
                clamp,
                self.settings.chest_goal_weight * rot_w,
            );
        }

        self.inverse_translate_to_head(legs, false, false, Vec3::ZERO, pos_w);

        if self.chain.lod < 1 {
            self.fabrik_pass(animated_pelvis_position, pos_w);
        }

        bend_uniform(
            &mut self.chain.bones,
            self.neck_index,
            self.head_index,
            self.head_rotation,
            self.settings.head_clamp_weight,
            rot_w,
        );

        self.solve_pelvis();
    }

    /// Moves the whole spine so the head lands on its goal (plus `offset`),
    /// optionally limiting the pelvis by what the legs can reach.
    pub fn inverse_translate_to_head(
        &mut self,
        legs: &mut [Leg],
        limited: bool,
        use_current_leg_mag: bool,
        offset: Vec3,
        weight: f32,
    ) {
        let delta = (self.head_position + offset - self.head().solver_position) * weight;
        let mut p = self.pelvis().solver_position + delta;
        if limited {
            p = self.limit_pelvis_position(legs, p, use_current_leg_mag);
        }
        self.move_pelvis_to(p);
    }

    fn move_pelvis_to(&mut self, position: Vec3) {
        let delta = position - self.pelvis().solver_position;
        self.chain.move_position(delta);
    }

    fn calculate_chest_target_rotation(&mut self, root: &VirtualBone, arms: &[Arm]) {
        self.chest_target_rotation = self.head_rotation * self.chest_relative_rotation;
        self.adjust_chest_by_hands(arms);
        self.face_direction = (self.anchor_rotation * RIGHT).cross(root.read_rotation * UP)
            + self.anchor_rotation * FORWARD;
    }

    /// Leans and twists the chest towards where the hands are reaching.
    fn adjust_chest_by_hands(&mut self, arms: &[Arm]) {
        if self.chain.lod > 0 {
            return;
        }
        let [left, right] = match arms {
            [left, right, ..] => [left, right],
            _ => return,
        };

        let h = self.anchor_rotation.inverse();
        let p_left = h * (left.target_position() - self.head_position) / self.size_mlp;
        let p_right = h * (right.target_position() - self.head_position) / self.size_mlp;
        let w = self.settings.rotate_chest_by_hands;
        let root_rotation = self.chain.root_rotation;

        let mut c = FORWARD;
        c.x += p_left.x * p_left.x.abs();
        c.x += p_left.z * p_left.z.abs();
        c.x += p_right.x * p_right.x.abs();
        c.x -= p_right.z * p_right.z.abs();
        c.x *= 5.0 * w;
        let yaw = c.x.atan2(c.z).to_degrees();
        self.chest_target_rotation =
            quat::angle_axis(yaw, root_rotation * UP) * self.chest_target_rotation;

        let mut t = UP;
        t.x += p_left.y;
        t.x -= p_right.y;
        t.x *= 0.5 * w;
        let roll = t.x.atan2(t.y).to_degrees();
        self.chest_target_rotation =
            quat::angle_axis(roll, root_rotation * -FORWARD) * self.chest_target_rotation;
    }

    fn translate_pelvis(&mut self, legs: &mut [Leg], delta_position: Vec3, delta_rotation: Quat) {
        let s = &self.settings;
        let head_before = self.head().solver_position;
        let pelvis = *self.pelvis();

        let delta_rotation = quat::clamp_rotation(delta_rotation, s.chest_clamp_weight, 2);
        let r = quat::slerp(Quat::IDENTITY, delta_rotation, s.body_rot_stiffness * s.rotation_weight);
        let r = quat::slerp(
            r,
            quat::difference(pelvis.solver_rotation, self.ik_rotation_pelvis),
            s.pelvis_rotation_weight,
        );
        virtual_bone::rotate_around_point(
            &mut self.chain.bones,
            PELVIS,
            pelvis.solver_position,
            self.pelvis_rotation_offset * r,
        );

        let mut delta_position = delta_position - (self.head().solver_position - head_before);

        // Crouching pushes the body back
        let root_rotation = self.chain.root_rotation;
        let delta_y = vec::extract_vertical(delta_position, root_rotation * UP, 1.0).length();
        let back_offset = delta_y * -s.move_body_back_when_crouching * self.head_height;
        delta_position += root_rotation * FORWARD * back_offset;

        let goal = self.pelvis().solver_position
            + delta_position * s.body_pos_stiffness * s.position_weight;
        let limited = self.limit_pelvis_position(legs, goal, false);
        self.move_pelvis_to(limited);
    }

    /// Pulls `pelvis_position` back until every thigh stays within its leg's
    /// reach of that leg's foot goal.
    fn limit_pelvis_position(
        &self,
        legs: &mut [Leg],
        mut pelvis_position: Vec3,
        use_current_leg_mag: bool,
    ) -> Vec3 {
        if !self.has_legs {
            return pelvis_position;
        }

        if use_current_leg_mag {
            for leg in legs.iter_mut() {
                leg.current_mag = leg.thigh().solver_position.distance(leg.chain.last().solver_position);
            }
        }

        let pelvis = self.pelvis().solver_position;
        for _ in 0..PELVIS_LIMIT_ITERATIONS {
            for leg in legs.iter() {
                let delta = pelvis_position - pelvis;
                let wanted_thigh = leg.thigh().solver_position + delta;
                let to_wanted = wanted_thigh - leg.position;
                let max_mag = if use_current_leg_mag { leg.current_mag } else { leg.chain.mag };
                let limited_thigh = leg.position + vec::clamp_magnitude(to_wanted, max_mag);
                pelvis_position += limited_thigh - wanted_thigh;
            }
        }
        pelvis_position
    }

    fn fabrik_pass(&mut self, animated_pelvis_position: Vec3, weight: f32) {
        let start = vec::lerp(
            self.pelvis().solver_position,
            animated_pelvis_position,
            self.settings.maintain_pelvis_position,
        ) + self.pelvis_position_offset;
        let end = self.head_position - self.chest_position_offset;
        let distance = self.pelvis().solver_position.distance(self.head().solver_position);
        virtual_bone::solve_fabrik(&mut self.chain.bones, start, end, weight, 1.0, 1, distance, Vec3::ZERO);
    }

    fn solve_pelvis(&mut self) {
        let w = self.settings.pelvis_position_weight;
        if w <= 0.0 {
            return;
        }

        let head_rotation = self.head().solver_rotation;
        let delta = (self.ik_position_pelvis + self.pelvis_position_offset - self.pelvis().solver_position) * w;
        self.chain.move_position(delta);

        let bend_normal = self.anchor_rotation * RIGHT;
        let (head, target) = (self.head_index, self.head_position);
        let passes: &[(usize, f32)] = match (self.has_chest, self.has_neck) {
            (true, true) => &[(SPINE, 0.6), (self.chest_index, 0.6), (self.neck_index, 1.0)],
            (true, false) => &[(SPINE, 0.75), (self.chest_index, 1.0)],
            (false, true) => &[(SPINE, 0.75), (self.neck_index, 1.0)],
            (false, false) => &[(SPINE, 1.0)],
        };
        for &(middle, mlp) in passes {
            virtual_bone::solve_trigonometric(
                &mut self.chain.bones,
                PELVIS,
                middle,
                head,
                target,
                bend_normal,
                w * mlp,
            );
        }

        self.chain.bones[head].solver_rotation = head_rotation;
    }
}

/// Rotates `bones[first..=last]` towards `target` with fixed per-bone shares,
/// blending in `offset` by the same shares.
fn bend_with_offset(
    bones: &mut [VirtualBone],
    first: usize,
    last: usize,
    target: Quat,
    offset: Quat,
    clamp_weight: f32,
    weight: f32,
) {
    if weight <= 0.0 || bones.is_empty() || last < first {
        return;
    }
    let count = last + 1 - first;
    let r = quat::clamp_rotation(quat::difference(bones[last].solver_rotation, target), clamp_weight, 2);

    for i in first..=last {
        let step = match (count, i - first) {
            (1, _) => 1.0,
            (2, 0) => 0.2,
            (2, _) => 0.8,
            (3, 0) => 0.15,
            (3, 1) => 0.4,
            (3, _) => 0.45,
            _ => 1.0 / count as f32,
        };
        let partial = quat::slerp(quat::slerp(Quat::IDENTITY, offset, step), r, step * weight);
        let pivot = bones[i].solver_position;
        virtual_bone::rotate_around_point(bones, i, pivot, partial);
    }
}

/// Rotates `bones[first..=last]` towards `target` in equal shares.
fn bend_uniform(
    bones: &mut [VirtualBone],
    first: usize,
    last: usize,
    target: Quat,
    clamp_weight: f32,
    weight: f32,
) {
    if weight <= 0.0 || bones.is_empty() || last < first {
        return;
    }
    let count = last + 1 - first;
    let r = quat::clamp_rotation(quat::difference(bones[last].solver_rotation, target), clamp_weight, 2);
    let step = 1.0 / count as f32;

    for i in first..=last {
        let pivot = bones[i].solver_position;
        virtual_bone::rotate_around_point(bones, i, pivot, quat::slerp(Quat::IDENTITY, r, step * weight));
    }
}

impl BodyPart for Spine {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }

    fn on_read(&mut self, pose: &Pose, layout: &Layout) {
        self.chain.read_bones(pose, layout.spine_joints());
        self.has_legs = layout.has_legs;

        let root_position = self.chain.root_position;
        let root_rotation = self.chain.root_rotation;

        if !self.chain.initiated {
            self.has_chest = layout.has_chest;
            self.has_neck = layout.has_neck;
            self.chest_index = if self.has_chest { 2 } else { SPINE };
            self.neck_index = SPINE + usize::from(self.has_chest) + usize::from(self.has_neck);
            self.head_index = self.chain.bones.len() - 1;

            let head = *self.head();
            let pelvis = *self.pelvis();
            self.head_height =
                vec::extract_vertical(head.read_position - root_position, root_rotation * UP, 1.0).length();

            self.pelvis_rotation_offset = Quat::IDENTITY;
            self.chest_rotation_offset = Quat::IDENTITY;
            self.head_rotation_offset = Quat::IDENTITY;
            self.anchor_relative_to_head = head.read_rotation.inverse() * root_rotation;
            self.anchor_relative_to_pelvis = pelvis.read_rotation.inverse() * root_rotation;
            self.face_direction = root_rotation * FORWARD;

            self.ik_position_head = head.read_position;
            self.ik_rotation_head = head.read_rotation;
            self.ik_position_pelvis = pelvis.read_position;
            self.ik_rotation_pelvis = pelvis.read_rotation;
            self.goal_position_chest = self.chest().read_position + root_rotation * FORWARD;
        }

        let head = *self.head();
        let pelvis = *self.pelvis();
        let chest = *self.chest();
        let head_inv = head.read_rotation.inverse();
        self.pelvis_relative_rotation = head_inv * pelvis.read_rotation;
        self.chest_relative_rotation = head_inv * chest.read_rotation;
        self.chest_forward = chest.read_rotation.inverse() * (root_rotation * FORWARD);

        let spine_length = pelvis.read_position.distance(head.read_position);
        if spine_length > 0.0 {
            self.size_mlp = spine_length / 0.7;
        }
    }

    fn pre_solve(&mut self, targets: &Targets) {
        let head = *self.head();
        let pelvis = *self.pelvis();
        let chest = *self.chest();

        let (head_position, head_rotation) = match targets.head {
            Some(t) => (t.position, t.rotation),
            None => (head.read_position, head.read_rotation),
        };
        self.ik_position_head = head_position;
        self.ik_rotation_head = head_rotation;

        self.goal_position_chest = targets
            .chest_goal
            .unwrap_or(chest.read_position + self.chain.root_rotation * FORWARD);

        let (pelvis_position, pelvis_rotation) = match targets.pelvis {
            Some(t) => (t.position, t.rotation),
            None => (pelvis.read_position, pelvis.read_rotation),
        };
        self.ik_position_pelvis = pelvis_position;
        self.ik_rotation_pelvis = pelvis_rotation;

        let s = &self.settings;
        self.head_position = vec::lerp(head.solver_position, self.ik_position_head, s.position_weight);
        self.head_rotation = quat::lerp(head.solver_rotation, self.ik_rotation_head, s.rotation_weight);
        self.pelvis_rotation = quat::lerp(pelvis.solver_rotation, self.ik_rotation_pelvis, s.rotation_weight);
    }

    fn apply_offsets(&mut self) {
        self.head_position += self.head_position_offset;

        let root_position = self.chain.root_position;
        let root_up = self.chain.root_rotation * UP;
        let min_height = self.settings.min_head_height;

        if root_up.abs_diff_eq(UP, 1e-6) {
            self.head_position.y = self.head_position.y.max(root_position.y + min_height);
        } else {
            let to_head = self.head_position - root_position;
            let horizontal = vec::extract_horizontal(to_head, root_up, 1.0);
            let mut vertical = to_head - horizontal;
            if vertical.dot(root_up) > 0.0 {
                if vertical.length() < min_height {
                    vertical = vertical.normalize_or_zero() * min_height;
                }
            } else {
                vertical = -vertical.normalize_or_zero() * min_height;
            }
            self.head_position = root_position + horizontal + vertical;
        }

        self.head_rotation = self.head_rotation_offset * self.head_rotation;
        self.head_delta_position = self.head_position - self.head().solver_position;
        self.pelvis_delta_rotation = quat::difference(
            self.pelvis().solver_rotation,
            self.head_rotation * self.pelvis_relative_rotation,
        );

        let from_head = self.head_rotation * self.anchor_relative_to_head;
        let from_pelvis = self.pelvis_rotation * self.anchor_relative_to_pelvis;
        let w = self.settings.pelvis_rotation_weight;
        self.anchor_rotation = if w <= 0.0 {
            from_head
        } else if w >= 1.0 {
            from_pelvis
        } else {
            from_head.lerp(from_pelvis, w)
        };
    }

    fn reset_offsets(&mut self) {
        self.pelvis_position_offset = Vec3::ZERO;
        self.chest_position_offset = Vec3::ZERO;
        self.head_position_offset = self.locomotion_head_position_offset;
        self.pelvis_rotation_offset = Quat::IDENTITY;
        self.chest_rotation_offset = Quat::IDENTITY;
        self.head_rotation_offset = Quat::IDENTITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{JointName, References, Rig, Transform};

    fn reference_pose() -> (Pose, Layout) {
        let rig = Rig::reference_humanoid();
        let pose = Pose::from_rig(&rig, &References::from_rig_names(&rig));
        let layout = pose.layout().unwrap();
        (pose, layout)
    }

    fn root_bone(pose: &Pose) -> VirtualBone {
        let t = pose.get(JointName::Root).unwrap_or_default();
        VirtualBone::new(t.position, t.rotation)
    }

    fn solve_spine(spine: &mut Spine, pose: &Pose, layout: &Layout, targets: &Targets) -> VirtualBone {
        let mut root = root_bone(pose);
        spine.read(pose, layout, JointName::Root);
        spine.pre_solve(targets);
        spine.apply_offsets();
        spine.solve(&mut root, &mut [], &[]);
        root
    }

    fn assert_lengths_kept(spine: &Spine) {
        let bones = &spine.chain.bones;
        for i in 0..bones.len() - 1 {
            let d = bones[i].solver_position.distance(bones[i + 1].solver_position);
            assert!(
                (d - bones[i].length).abs() < 1e-4,
                "bone {} length {} changed to {}",
                i,
                bones[i].length,
                d
            );
        }
    }

    #[test]
    fn test_chain_indices_follow_layout() {
        let (pose, layout) = reference_pose();
        let mut spine = Spine::new(&SpineSettings::default());
        spine.read(&pose, &layout, JointName::Root);
        assert_eq!(spine.chain.bones.len(), 5);
        assert_eq!(spine.chest_index, 2);
        assert_eq!(spine.neck_index, 3);
        assert_eq!(spine.head_index, 4);
        assert!((spine.head_height() - 1.6).abs() < 1e-5);

        let mut no_chest = pose.clone();
        no_chest.clear(JointName::Chest);
        let layout = no_chest.layout().unwrap();
        let mut spine = Spine::new(&SpineSettings::default());
        spine.read(&no_chest, &layout, JointName::Root);
        assert_eq!(spine.chain.bones.len(), 4);
        assert_eq!(spine.chest_index, SPINE);
        assert_eq!(spine.neck_index, 2);
        assert_eq!(spine.head_index, 3);
    }

    #[test]
    fn test_weight_zero_reproduces_read_pose() {
        let (pose, layout) = reference_pose();
        let settings = SpineSettings {
            position_weight: 0.0,
            rotation_weight: 0.0,
            ..Default::default()
        };
        let mut spine = Spine::new(&settings);
        let targets = Targets {
            head: Some(Transform::new(Vec3::new(0.2, 1.3, 0.3), Quat::from_rotation_x(0.5))),
            ..Default::default()
        };

        solve_spine(&mut spine, &pose, &layout, &targets);

        for (bone, joint) in spine.chain.bones.iter().zip(&spine.chain.joints) {
            assert!(
                bone.solver_position.abs_diff_eq(pose.position(*joint), 1e-4),
                "{} moved to {:?}",
                joint.as_str(),
                bone.solver_position
            );
        }
    }

    #[test]
    fn test_targets_at_read_pose_keep_pose() {
        let (pose, layout) = reference_pose();
        let mut spine = Spine::new(&SpineSettings::default());
        let root = solve_spine(&mut spine, &pose, &layout, &Targets::from_pose(&pose));

        for (bone, joint) in spine.chain.bones.iter().zip(&spine.chain.joints) {
            assert!(
                bone.solver_position.abs_diff_eq(pose.position(*joint), 1e-4),
                "{} drifted to {:?}",
                joint.as_str(),
                bone.solver_position
            );
        }
        assert!(root.solver_rotation.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }

    #[test]
    fn test_repeated_solve_is_stable() {
        let (pose, layout) = reference_pose();
        let targets = Targets {
            head: Some(Transform::new(Vec3::new(0.05, 1.5, 0.15), Quat::from_rotation_x(0.2))),
            ..Default::default()
        };
        let mut spine = Spine::new(&SpineSettings::default());

        solve_spine(&mut spine, &pose, &layout, &targets);
        spine.reset_offsets();
        let first = spine.chain.bones.clone();
        solve_spine(&mut spine, &pose, &layout, &targets);

        for (a, b) in first.iter().zip(&spine.chain.bones) {
            assert!(a.solver_position.abs_diff_eq(b.solver_position, 1e-6));
            assert!(a.solver_rotation.abs_diff_eq(b.solver_rotation, 1e-6));
        }
    }

    #[test]
    fn test_head_follows_target() {
        let (pose, layout) = reference_pose();
        let goal = pose.position(JointName::Head) + Vec3::new(0.0, -0.1, 0.15);
        let targets = Targets {
            head: Some(Transform::from_position(goal)),
            ..Default::default()
        };
        let mut spine = Spine::new(&SpineSettings::default());

        solve_spine(&mut spine, &pose, &layout, &targets);

        let before = pose.position(JointName::Head).distance(goal);
        let after = spine.head().solver_position.distance(goal);
        assert!(after < 0.05, "head should reach its goal, {} away", after);
        assert!(after < before);
        assert_lengths_kept(&spine);
    }

    #[test]
    fn test_min_head_height() {
        let (pose, layout) = reference_pose();
        let targets = Targets {
            head: Some(Transform::from_position(Vec3::new(0.0, 0.3, 0.0))),
            ..Default::default()
        };
        let mut spine = Spine::new(&SpineSettings::default());
        spine.read(&pose, &layout, JointName::Root);
        spine.pre_solve(&targets);
        spine.apply_offsets();
        assert!(
            (spine.head_position.y - 0.8).abs() < 1e-5,
            "head goal should be clamped to 0.8, got {}",
            spine.head_position.y
        );
    }

    #[test]
    fn test_pelvis_target_is_reached() {
        let (pose, layout) = reference_pose();
        let settings = SpineSettings {
            pelvis_position_weight: 1.0,
            ..Default::default()
        };
        let pelvis_goal = pose.position(JointName::Pelvis) + Vec3::new(0.0, 0.05, 0.05);
        let head_rotation = Quat::from_rotation_y(0.1);
        let targets = Targets {
            head: Some(Transform::new(pose.position(JointName::Head), head_rotation)),
            pelvis: Some(Transform::from_position(pelvis_goal)),
            ..Default::default()
        };
        let mut spine = Spine::new(&settings);

        solve_spine(&mut spine, &pose, &layout, &targets);

        assert!(
            spine.pelvis().solver_position.abs_diff_eq(pelvis_goal, 1e-4),
            "pelvis at {:?}",
            spine.pelvis().solver_position
        );
        assert!(spine.head().solver_position.distance(pose.position(JointName::Head)) < 0.05);
        assert_lengths_kept(&spine);
    }

    #[test]
    fn test_root_turns_past_max_angle() {
        let (pose, layout) = reference_pose();
        let head = pose.position(JointName::Head);
        let targets = Targets {
            head: Some(Transform::new(head, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2))),
            ..Default::default()
        };
        let mut spine = Spine::new(&SpineSettings::default());

        let root = solve_spine(&mut spine, &pose, &layout, &targets);

        let turned = quat::angle(Quat::IDENTITY, root.solver_rotation);
        assert!((turned - 65.0).abs() < 0.5, "root should follow to 65 degrees, got {}", turned);
    }

    #[test]
    fn test_locomotion_head_offset_survives_reset() {
        let mut spine = Spine::new(&SpineSettings::default());
        spine.locomotion_head_position_offset = Vec3::X * 0.1;
        spine.pelvis_position_offset = Vec3::Y;
        spine.head_rotation_offset = Quat::from_rotation_x(0.3);
        spine.reset_offsets();
        assert_eq!(spine.head_position_offset, Vec3::X * 0.1);
        assert_eq!(spine.pelvis_position_offset, Vec3::ZERO);
        assert_eq!(spine.head_rotation_offset, Quat::IDENTITY);
    }

    #[test]
    fn test_bend_shares_sum_to_target() {
        let mut bones = vec![
            VirtualBone::new(Vec3::ZERO, Quat::IDENTITY),
            VirtualBone::new(Vec3::Y, Quat::IDENTITY),
            VirtualBone::new(Vec3::Y * 2.0, Quat::IDENTITY),
        ];
        virtual_bone::pre_solve(&mut bones);
        let goal = Quat::from_rotation_z(0.4);
        bend_uniform(&mut bones, 0, 2, goal, 0.0, 1.0);
        assert!(
            bones[2].solver_rotation.abs_diff_eq(goal, 1e-5),
            "last bone should land on the goal rotation"
        );
    }
}
