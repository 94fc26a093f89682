//! Full-body solver.
//!
//! [`BodyIk`] binds a humanoid once and then turns an animated input pose plus
//! a set of [`Targets`] into a solved pose on every call:
//!
//! ```text
//! read → pre_solve → apply_offsets → spine → locomotion → legs → arms
//!      → reset_offsets → write
//! ```
//!
//! The master `ik_position_weight` blends the solved pose back onto the input
//! on write. LOD 2 skips the bone solve entirely.

use glam::{Quat, Vec3};
use tracing::{debug, info, warn};

use crate::config::{ArmSettings, SolverConfig};
use crate::error::{Result, SkeletonError};
use crate::math::{quat, vec, FORWARD, UP};
use crate::skeleton::references::guess_wrist_to_palm;
use crate::skeleton::{HandAxes, JointName, Layout, Pose, References, Rig, Side, Transform};

use super::arm::Arm;
use super::body_part::BodyPart;
use super::leg::Leg;
use super::locomotion::Locomotion;
use super::spine::Spine;
use super::targets::{
    FootstepEvent, FrameContext, PositionOffset, RotationOffset, SolveOutput, Targets,
};
use super::virtual_bone::VirtualBone;

/// Humanoid full-body IK solver.
pub struct BodyIk {
    config: SolverConfig,
    layout: Layout,
    /// Resolved hand axes, left then right
    hand_axes: [HandAxes; 2],

    root: VirtualBone,
    spine: Spine,
    arms: Vec<Arm>,
    legs: Vec<Leg>,
    locomotion: Locomotion,

    support_leg: Option<usize>,
    root_velocity: Vec3,
    body_offset: Vec3,
    last_lod: u8,
    initiated: bool,
}

impl BodyIk {
    /// Binds the solver to the skeleton `pose` describes.
    ///
    /// Zero wrist-to-palm axes in `config` are guessed from the forearm and
    /// hand. Palm-to-thumb axes cannot be guessed without the rig; use
    /// [`BodyIk::from_rig`] or [`BodyIk::guess_hand_orientations`] for that.
    pub fn new(config: SolverConfig, pose: &Pose) -> Result<Self> {
        config.validate()?;
        let layout = pose.layout()?;

        let hand_axes = Side::ALL.map(|side| {
            let arm = arm_config(&config, side);
            let mut wrist_to_palm = arm.wrist_to_palm_axis;
            if wrist_to_palm == Vec3::ZERO {
                wrist_to_palm = guess_wrist_to_palm(pose, side);
            }
            HandAxes {
                wrist_to_palm,
                palm_to_thumb: arm.palm_to_thumb_axis,
            }
        });

        let mut ik = Self {
            spine: Spine::new(&config.spine),
            arms: Side::ALL
                .iter()
                .map(|&side| Arm::new(side, arm_config(&config, side)))
                .collect(),
            legs: if layout.has_legs {
                vec![
                    Leg::new(Side::Left, &config.left_leg),
                    Leg::new(Side::Right, &config.right_leg),
                ]
            } else {
                Vec::new()
            },
            locomotion: Locomotion::new(&config.locomotion, config.solver.seed),
            root: VirtualBone::new(Vec3::ZERO, Quat::IDENTITY),
            last_lod: config.solver.lod,
            config,
            layout,
            hand_axes,
            support_leg: None,
            root_velocity: Vec3::ZERO,
            body_offset: Vec3::ZERO,
            initiated: false,
        };
        ik.apply_hand_axes();
        ik.validate()?;

        for (side, axes) in Side::ALL.iter().zip(&ik.hand_axes) {
            if axes.palm_to_thumb == Vec3::ZERO {
                warn!(
                    "No palm-to-thumb axis for the {} hand, elbow bend ignores hand orientation",
                    side.as_str()
                );
            }
        }

        info!(
            "Bound humanoid (chest: {}, neck: {}, shoulders: {}, legs: {}, toes: {})",
            layout.has_chest, layout.has_neck, layout.has_shoulders, layout.has_legs, layout.has_toes
        );
        Ok(ik)
    }

    /// Binds the solver to a rig in its bind pose, guessing both hand axes
    /// from the rig's hierarchy.
    pub fn from_rig(mut config: SolverConfig, rig: &Rig, refs: &References) -> Result<Self> {
        refs.validate(rig)?;
        let pose = Pose::from_rig(rig, refs);

        for side in Side::ALL {
            let guessed = refs.guess_hand_axes(rig, &pose, side);
            let arm = arm_config_mut(&mut config, side);
            if arm.wrist_to_palm_axis == Vec3::ZERO {
                arm.wrist_to_palm_axis = guessed.wrist_to_palm;
            }
            if arm.palm_to_thumb_axis == Vec3::ZERO {
                arm.palm_to_thumb_axis = guessed.palm_to_thumb;
            }
        }

        Self::new(config, &pose)
    }

    /// Replaces the hand axes with ones guessed from `rig` in `pose`. Axes
    /// that cannot be guessed keep their current value.
    pub fn guess_hand_orientations(&mut self, rig: &Rig, refs: &References, pose: &Pose) {
        for (i, side) in Side::ALL.into_iter().enumerate() {
            let guessed = refs.guess_hand_axes(rig, pose, side);
            let axes = &mut self.hand_axes[i];
            if guessed.wrist_to_palm != Vec3::ZERO {
                axes.wrist_to_palm = guessed.wrist_to_palm;
            }
            if guessed.palm_to_thumb != Vec3::ZERO {
                axes.palm_to_thumb = guessed.palm_to_thumb;
            }
        }
        self.apply_hand_axes();
    }

    /// Checks what the solver needs beyond the pose layout.
    pub fn validate(&self) -> std::result::Result<(), SkeletonError> {
        for (side, axes) in Side::ALL.iter().zip(&self.hand_axes) {
            if axes.wrist_to_palm == Vec3::ZERO {
                return Err(SkeletonError::MissingHandAxis {
                    side: side.as_str(),
                    axis: "wrist_to_palm",
                });
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn hand_axes(&self, side: Side) -> HandAxes {
        self.hand_axes[side_index(side)]
    }

    /// Replaces the configuration. Weights are clamped by each part; zero hand
    /// axes keep the resolved ones.
    pub fn apply_config(&mut self, config: SolverConfig) -> Result<()> {
        config.validate()?;
        for (i, side) in Side::ALL.into_iter().enumerate() {
            let arm = arm_config(&config, side);
            if arm.wrist_to_palm_axis != Vec3::ZERO {
                self.hand_axes[i].wrist_to_palm = arm.wrist_to_palm_axis;
            }
            if arm.palm_to_thumb_axis != Vec3::ZERO {
                self.hand_axes[i].palm_to_thumb = arm.palm_to_thumb_axis;
            }
        }

        self.spine.apply_settings(&config.spine);
        for leg in &mut self.legs {
            let settings = match leg.side {
                Side::Left => &config.left_leg,
                Side::Right => &config.right_leg,
            };
            leg.apply_settings(settings);
        }
        self.locomotion.apply_settings(&config.locomotion);
        self.config = config;
        self.apply_hand_axes();
        Ok(())
    }

    /// Sets the level of detail: 0 full, 1 no stretching or twist, 2 culled.
    pub fn set_lod(&mut self, lod: u8) {
        self.config.solver.lod = lod.min(2);
    }

    pub fn lod(&self) -> u8 {
        self.config.solver.lod
    }

    pub fn set_ik_position_weight(&mut self, weight: f32) {
        self.config.solver.ik_position_weight = weight.clamp(0.0, 1.0);
    }

    pub fn spine(&self) -> &Spine {
        &self.spine
    }

    pub fn locomotion(&self) -> &Locomotion {
        &self.locomotion
    }

    /// Leg that carried the body at the end of the last solve.
    pub fn support_leg(&self) -> Option<Side> {
        self.support_leg.and_then(|i| self.legs.get(i)).map(|leg| leg.side)
    }

    /// Adds a position offset to a body part for the next solve call only.
    /// A call with zero master weight discards pending offsets unapplied.
    pub fn add_position_offset(&mut self, slot: PositionOffset, offset: Vec3) {
        match slot {
            PositionOffset::Pelvis => self.spine.pelvis_position_offset += offset,
            PositionOffset::Chest => self.spine.chest_position_offset += offset,
            PositionOffset::Head => self.spine.head_position_offset += offset,
            PositionOffset::LeftHand => self.arms[0].hand_position_offset += offset,
            PositionOffset::RightHand => self.arms[1].hand_position_offset += offset,
            PositionOffset::LeftFoot => {
                if let Some(leg) = self.legs.get_mut(0) {
                    leg.foot_position_offset += offset;
                }
            }
            PositionOffset::RightFoot => {
                if let Some(leg) = self.legs.get_mut(1) {
                    leg.foot_position_offset += offset;
                }
            }
            PositionOffset::LeftHeel => {
                if let Some(leg) = self.legs.get_mut(0) {
                    leg.heel_position_offset += offset;
                }
            }
            PositionOffset::RightHeel => {
                if let Some(leg) = self.legs.get_mut(1) {
                    leg.heel_position_offset += offset;
                }
            }
        }
    }

    /// Adds a rotation offset to a spine bone for the next solve call only.
    pub fn add_rotation_offset(&mut self, slot: RotationOffset, offset: Quat) {
        let target = match slot {
            RotationOffset::Pelvis => &mut self.spine.pelvis_rotation_offset,
            RotationOffset::Chest => &mut self.spine.chest_rotation_offset,
            RotationOffset::Head => &mut self.spine.head_rotation_offset,
        };
        *target = offset * *target;
    }

    /// Moves the planted feet and the facing direction with a platform the
    /// character stands on.
    pub fn add_platform_motion(&mut self, delta_position: Vec3, delta_rotation: Quat, pivot: Vec3) {
        self.locomotion.add_delta_position(delta_position);
        self.locomotion.add_delta_rotation(delta_rotation, pivot);
        self.spine.face_direction = delta_rotation * self.spine.face_direction;
    }

    /// Re-reads `pose` and replants both feet where it puts them.
    pub fn reset(&mut self, pose: &Pose) -> Result<()> {
        if !self.initiated {
            return Ok(());
        }
        self.check_layout(pose)?;

        self.read(pose);
        self.spine.face_direction = self.root.read_rotation * FORWARD;
        if self.layout.has_legs {
            self.locomotion.reset(pose);
        }
        self.root_velocity = Vec3::ZERO;
        self.body_offset = Vec3::ZERO;
        info!("Solver reset");
        Ok(())
    }

    /// Solves one frame.
    ///
    /// `pose` must have the layout the solver was bound with. The returned
    /// pose carries root motion when locomotion is active; feeding it (or a
    /// pose rebased onto its root) back in on the next call keeps the
    /// character moving.
    pub fn solve(&mut self, pose: &Pose, targets: &Targets, delta_time: f32) -> Result<SolveOutput> {
        self.check_layout(pose)?;

        let ctx = FrameContext {
            delta_time: delta_time.max(0.0),
            lod: self.config.solver.lod,
            ik_position_weight: self.config.solver.ik_position_weight.clamp(0.0, 1.0),
            plant_feet: self.config.solver.plant_feet,
        };

        if ctx.ik_position_weight <= 0.0 {
            self.reset_offsets();
            return Ok(SolveOutput {
                pose: pose.clone(),
                events: Vec::new(),
            });
        }

        if ctx.lod != self.last_lod {
            debug!("LOD {} -> {}", self.last_lod, ctx.lod);
        }

        let mut events = Vec::new();
        let output = if ctx.lod < 2 {
            let mut input = pose.clone();
            if self.last_lod == 2 && self.initiated {
                self.leave_culling(&mut input, targets);
            }
            self.read(&input);
            self.solve_body(&ctx, targets, &mut events);
            self.write(&ctx, &input)
        } else {
            self.follow_head(pose, targets)
        };
        self.last_lod = ctx.lod;

        Ok(SolveOutput {
            pose: output,
            events,
        })
    }

    fn check_layout(&self, pose: &Pose) -> Result<()> {
        let layout = pose.layout()?;
        if layout != self.layout {
            return Err(SkeletonError::LayoutChanged(format!(
                "bound with {:?}, got {:?}",
                self.layout, layout
            ))
            .into());
        }
        Ok(())
    }

    fn apply_hand_axes(&mut self) {
        for (i, side) in Side::ALL.into_iter().enumerate() {
            let mut settings = arm_config(&self.config, side).clone();
            settings.wrist_to_palm_axis = self.hand_axes[i].wrist_to_palm;
            settings.palm_to_thumb_axis = self.hand_axes[i].palm_to_thumb;
            self.arms[i].apply_settings(&settings);
        }
    }

    fn read(&mut self, pose: &Pose) {
        let root = pose.get(JointName::Root).unwrap_or_default();
        self.root.read(root.position, root.rotation);

        self.spine.read(pose, &self.layout, JointName::Root);
        let arm_root = self.layout.arm_root();
        for arm in &mut self.arms {
            arm.read(pose, &self.layout, arm_root);
        }
        for leg in &mut self.legs {
            leg.read(pose, &self.layout, JointName::Pelvis);
        }

        if !self.initiated {
            if self.layout.has_legs {
                self.locomotion.initiate(pose, self.layout.has_toes);
            }
            self.spine.face_direction = self.root.read_rotation * FORWARD;
            self.initiated = true;
        }
    }

    /// Coming back from LOD 2: the body was left behind while culled, so
    /// with locomotion the whole pose jumps under the head target.
    fn leave_culling(&mut self, input: &mut Pose, targets: &Targets) {
        self.spine.face_direction = self.root.read_rotation * FORWARD;

        if !self.layout.has_legs || self.config.locomotion.weight <= 0.0 {
            return;
        }
        let Some(head) = targets.head else {
            return;
        };

        let root = input.get(JointName::Root).unwrap_or_default();
        let up = root.rotation * UP;
        let forward = vec::extract_horizontal(self.spine.face_direction, up, 1.0);
        let rotation = if forward.length_squared() > 0.0 {
            quat::look_rotation(forward, up)
        } else {
            root.rotation
        };
        let position = Vec3::new(head.position.x, root.position.y, head.position.z);
        input.rebase(Transform::new(position, rotation));

        self.read(input);
        self.locomotion.reset(input);
        self.root_velocity = Vec3::ZERO;
        debug!("Teleported root under the head target after culling");
    }

    /// LOD 2: no bone solve, the root only trails the head target.
    fn follow_head(&self, pose: &Pose, targets: &Targets) -> Pose {
        let mut output = pose.clone();
        if self.config.locomotion.weight <= 0.0 {
            return output;
        }
        let Some(head) = targets.head else {
            return output;
        };

        let root = pose.get(JointName::Root).unwrap_or_default();
        let up = root.rotation * UP;
        let forward = vec::extract_horizontal(
            head.rotation * self.spine.anchor_relative_to_head() * FORWARD,
            up,
            1.0,
        );
        let rotation = if forward.length_squared() > 0.0 {
            quat::look_rotation(forward, up)
        } else {
            root.rotation
        };
        let position = Vec3::new(head.position.x, root.position.y, head.position.z);
        output.rebase(Transform::new(position, rotation));
        output
    }

    fn solve_body(&mut self, ctx: &FrameContext, targets: &Targets, events: &mut Vec<FootstepEvent>) {
        self.spine.set_lod(ctx.lod);
        for arm in &mut self.arms {
            arm.set_lod(ctx.lod);
        }
        for leg in &mut self.legs {
            leg.set_lod(ctx.lod);
        }

        self.spine.pre_solve(targets);
        for arm in &mut self.arms {
            arm.pre_solve(targets);
        }
        for leg in &mut self.legs {
            leg.pre_solve(targets);
        }

        for arm in &mut self.arms {
            arm.apply_offsets();
        }
        self.spine.apply_offsets();

        self.spine.solve(&mut self.root, &mut self.legs, &self.arms);

        if !self.legs.is_empty() && self.locomotion.settings.weight > 0.0 {
            self.solve_locomotion(ctx, events);
        } else {
            self.body_offset = Vec3::ZERO;
        }

        if self.legs.is_empty() {
            self.spine
                .inverse_translate_to_head(&mut self.legs, false, false, self.body_offset, 1.0);
        } else {
            for leg in &mut self.legs {
                leg.apply_offsets();
            }

            if !ctx.plant_feet || ctx.lod > 0 {
                self.spine
                    .inverse_translate_to_head(&mut self.legs, false, false, self.body_offset, 1.0);
                self.translate_legs_to_pelvis();
                for leg in &mut self.legs {
                    leg.solve(true);
                }
            } else {
                // Second pass fixes what the first one's stretch left over
                for pass in 0..2 {
                    self.spine
                        .inverse_translate_to_head(&mut self.legs, true, true, self.body_offset, 1.0);
                    self.translate_legs_to_pelvis();
                    for leg in &mut self.legs {
                        leg.solve(pass == 0);
                    }
                }
            }
        }

        let chest = *self.spine.chest();
        for arm in &mut self.arms {
            arm.chain.translate_root(chest.solver_position, chest.solver_rotation);
            let is_left = arm.side.is_left();
            arm.solve(is_left);
        }

        self.reset_offsets();
    }

    fn reset_offsets(&mut self) {
        self.spine.reset_offsets();
        for leg in &mut self.legs {
            leg.reset_offsets();
        }
        for arm in &mut self.arms {
            arm.reset_offsets();
        }
    }

    fn solve_locomotion(&mut self, ctx: &FrameContext, events: &mut Vec<FootstepEvent>) {
        let dt = ctx.delta_time;
        let weight = self.locomotion.settings.weight;
        let root_speed = self.locomotion.settings.root_speed;

        let placement = self.locomotion.solve(
            &self.root,
            &self.spine,
            &self.legs,
            &self.arms,
            self.support_leg,
            dt,
            events,
        );

        let root_up = self.root.read_rotation * UP;
        for leg in &mut self.legs {
            let side = leg.side;
            let position = placement.position(side) + root_up * placement.offset(side);
            let last = *leg.chain.last();

            let position_w = ctx.ik_position_weight * (1.0 - leg.settings.position_weight) * weight;
            leg.foot_position_offset += (position - last.solver_position) * position_w;
            leg.heel_position_offset += root_up * placement.heel_offset(side) * weight;

            let rotation_w = ctx.ik_position_weight * (1.0 - leg.settings.rotation_weight) * weight;
            let offset = quat::linear_blend(
                quat::difference(last.solver_rotation, placement.rotation(side)),
                rotation_w,
            );
            leg.foot_rotation_offset = offset * leg.foot_rotation_offset;
        }

        // Root motion: pull the root under the feet
        let feet_center = vec::lerp(
            self.legs[0].position + self.legs[0].foot_position_offset,
            self.legs[1].position + self.legs[1].foot_position_offset,
            0.5,
        );
        let feet_center = vec::point_to_plane(feet_center, self.root.solver_position, root_up);

        let mut p = self.root.solver_position + self.root_velocity * dt * 2.0 * weight;
        p = vec::lerp(p, feet_center, dt * root_speed * weight);
        self.root.solver_position = p;

        self.root_velocity += (feet_center - self.root.solver_position) * dt * 10.0;
        self.root_velocity -= vec::extract_vertical(self.root_velocity, root_up, 1.0);

        // Body bob follows the stepping feet
        let bob = root_up * (placement.left_offset + placement.right_offset);
        self.body_offset = vec::lerp(self.body_offset, bob, dt * 3.0);
        self.body_offset = vec::lerp(Vec3::ZERO, self.body_offset, weight);
    }

    fn translate_legs_to_pelvis(&mut self) {
        let pelvis = *self.spine.pelvis();
        for leg in &mut self.legs {
            leg.chain
                .translate_root(pelvis.solver_position, pelvis.solver_rotation);
        }
    }

    fn write(&mut self, ctx: &FrameContext, input: &Pose) -> Pose {
        let mut solved = input.clone();
        solved.set(
            JointName::Root,
            Transform::new(self.root.solver_position, self.root.solver_rotation),
        );
        self.spine.write(&mut solved);
        for leg in &self.legs {
            leg.write(&mut solved);
        }
        for arm in &self.arms {
            arm.write(&mut solved);
        }

        self.support_leg = self
            .legs
            .iter()
            .enumerate()
            .map(|(i, leg)| {
                let reach = leg
                    .chain
                    .last()
                    .solver_position
                    .distance_squared(leg.thigh().solver_position);
                (i, reach)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);

        blend_pose(input, &solved, &self.layout, ctx.ik_position_weight, ctx.lod)
    }
}

/// Blends `solved` onto `input` by `weight`.
///
/// Every rotation is blended. Positions are blended only for the root, the
/// pelvis and, at LOD 0, the bones that stretch; every other joint keeps its
/// input offset from its parent.
fn blend_pose(input: &Pose, solved: &Pose, layout: &Layout, weight: f32, lod: u8) -> Pose {
    let mut output = input.clone();

    for joint in JointName::ALL {
        if !layout.uses(joint) {
            continue;
        }
        let (Some(from), Some(to)) = (input.get(joint), solved.get(joint)) else {
            continue;
        };

        let rotation = quat::lerp(from.rotation, to.rotation, weight);
        let parent = layout
            .parent(joint)
            .filter(|_| !blends_position(joint, lod))
            .and_then(|p| Some((input.get(p)?, output.get(p)?)));
        let position = match parent {
            Some((parent_in, parent_out)) => {
                let local = parent_in.rotation.inverse() * (from.position - parent_in.position);
                parent_out.position + parent_out.rotation * local
            }
            None => vec::lerp(from.position, to.position, weight),
        };

        output.set(joint, Transform::new(position, rotation));
    }

    output
}

fn blends_position(joint: JointName, lod: u8) -> bool {
    use JointName::*;
    match joint {
        Root | Pelvis => true,
        LeftForearm | LeftHand | RightForearm | RightHand | LeftCalf | LeftFoot | LeftToes
        | RightCalf | RightFoot | RightToes => lod < 1,
        _ => false,
    }
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

fn arm_config(config: &SolverConfig, side: Side) -> &ArmSettings {
    match side {
        Side::Left => &config.left_arm,
        Side::Right => &config.right_arm,
    }
}

fn arm_config_mut(config: &mut SolverConfig, side: Side) -> &mut ArmSettings {
    match side {
        Side::Left => &mut config.left_arm,
        Side::Right => &mut config.right_arm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::targets::Target;

    fn reference() -> (Rig, References, Pose) {
        let rig = Rig::reference_humanoid();
        let refs = References::from_rig_names(&rig);
        let pose = Pose::from_rig(&rig, &refs);
        (rig, refs, pose)
    }

    /// Settings without locomotion so the body stays where the targets put it.
    fn static_config() -> SolverConfig {
        let mut config = SolverConfig::default();
        config.locomotion.weight = 0.0;
        config.solver.seed = Some(7);
        config
    }

    fn solver(config: SolverConfig) -> (BodyIk, Pose) {
        let (rig, refs, pose) = reference();
        let ik = BodyIk::from_rig(config, &rig, &refs).unwrap();
        (ik, pose)
    }

    fn assert_pose_eq(a: &Pose, b: &Pose, epsilon: f32) {
        for joint in JointName::ALL {
            match (a.get(joint), b.get(joint)) {
                (Some(x), Some(y)) => {
                    assert!(
                        x.position.abs_diff_eq(y.position, epsilon),
                        "{:?} position {:?} != {:?}",
                        joint,
                        x.position,
                        y.position
                    );
                    assert!(
                        x.rotation.abs_diff_eq(y.rotation, epsilon)
                            || x.rotation.abs_diff_eq(-y.rotation, epsilon),
                        "{:?} rotation {:?} != {:?}",
                        joint,
                        x.rotation,
                        y.rotation
                    );
                }
                (None, None) => {}
                _ => panic!("{:?} presence differs", joint),
            }
        }
    }

    #[test]
    fn test_from_rig_guesses_hand_axes() {
        let (ik, _) = solver(static_config());
        assert!(ik.is_valid());
        assert_eq!(ik.hand_axes(Side::Left).wrist_to_palm, -Vec3::X);
        assert_eq!(ik.hand_axes(Side::Right).wrist_to_palm, Vec3::X);
        assert_ne!(ik.hand_axes(Side::Left).palm_to_thumb, Vec3::ZERO);
    }

    #[test]
    fn test_new_without_rig_guesses_wrist_axis_only() {
        let (rig, refs, pose) = reference();
        let mut ik = BodyIk::new(static_config(), &pose).unwrap();
        assert_eq!(ik.hand_axes(Side::Right).wrist_to_palm, Vec3::X);
        assert_eq!(ik.hand_axes(Side::Right).palm_to_thumb, Vec3::ZERO);

        ik.guess_hand_orientations(&rig, &refs, &pose);
        assert_ne!(ik.hand_axes(Side::Right).palm_to_thumb, Vec3::ZERO);
    }

    #[test]
    fn test_degenerate_hand_fails_binding() {
        let (_, _, mut pose) = reference();
        // Hand on top of the forearm leaves no wrist direction
        let forearm = pose.get(JointName::LeftForearm).unwrap();
        pose.set(JointName::LeftHand, forearm);

        let err = BodyIk::new(static_config(), &pose).err().expect("binding should fail");
        assert!(
            matches!(
                err,
                crate::error::IkError::Skeleton(SkeletonError::MissingHandAxis { side: "left", .. })
            ),
            "unexpected error: {}",
            err
        );
    }

    #[test]
    fn test_missing_required_joint_fails_binding() {
        let (_, _, mut pose) = reference();
        pose.clear(JointName::Head);
        assert!(BodyIk::new(static_config(), &pose).is_err());
    }

    #[test]
    fn test_layout_change_is_rejected() {
        let (mut ik, mut pose) = solver(static_config());
        pose.clear(JointName::LeftToes);
        pose.clear(JointName::RightToes);
        let err = ik.solve(&pose, &Targets::default(), 1.0 / 60.0).unwrap_err();
        assert!(err.to_string().contains("layout"), "unexpected error: {}", err);
    }

    #[test]
    fn test_non_finite_pose_is_rejected() {
        let (mut ik, mut pose) = solver(static_config());
        pose.set(JointName::Head, Transform::from_position(Vec3::splat(f32::NAN)));
        assert!(ik.solve(&pose, &Targets::default(), 1.0 / 60.0).is_err());
    }

    #[test]
    fn test_weight_zero_reproduces_input() {
        let mut config = static_config();
        config.solver.ik_position_weight = 0.0;
        let (mut ik, pose) = solver(config);

        let mut targets = Targets::from_pose(&pose);
        targets.head = Some(Target::new(Vec3::new(0.5, 1.0, 0.5), Quat::from_rotation_y(1.0)));
        let output = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        assert_eq!(output.pose, pose);
        assert!(output.events.is_empty());
    }

    #[test]
    fn test_part_weights_zero_reproduce_input() {
        let mut config = static_config();
        config.spine.position_weight = 0.0;
        config.spine.rotation_weight = 0.0;
        config.spine.pelvis_position_weight = 0.0;
        config.spine.pelvis_rotation_weight = 0.0;
        for arm in [&mut config.left_arm, &mut config.right_arm] {
            arm.position_weight = 0.0;
            arm.rotation_weight = 0.0;
        }
        for leg in [&mut config.left_leg, &mut config.right_leg] {
            leg.position_weight = 0.0;
            leg.rotation_weight = 0.0;
        }
        let (mut ik, pose) = solver(config);

        // Targets well away from the pose; with zero part weights none may pull
        let mut targets = Targets::from_pose(&pose);
        targets.head = Some(Target::new(
            pose.position(JointName::Head) + Vec3::new(0.2, -0.1, 0.3),
            Quat::from_rotation_y(0.8),
        ));
        targets.left_hand = Some(Target::new(
            pose.position(JointName::LeftHand) + Vec3::new(0.3, 0.4, 0.2),
            Quat::from_rotation_z(1.2) * Quat::from_rotation_x(0.6),
        ));

        let output = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        assert_pose_eq(&output.pose, &pose, 1e-3);
    }

    #[test]
    fn test_targets_at_read_pose_keep_end_effectors() {
        let (mut ik, pose) = solver(static_config());
        let targets = Targets::from_pose(&pose);
        let first = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        for joint in [
            JointName::Head,
            JointName::Pelvis,
            JointName::LeftHand,
            JointName::RightHand,
            JointName::LeftFoot,
            JointName::RightFoot,
        ] {
            let moved = first.pose.position(joint).distance(pose.position(joint));
            assert!(moved < 0.02, "{:?} moved by {}", joint, moved);
        }

        // Same input, same output
        let second = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        assert_pose_eq(&first.pose, &second.pose, 1e-4);
    }

    #[test]
    fn test_absent_targets_follow_input() {
        let (mut a, pose) = solver(static_config());
        let (mut b, _) = solver(static_config());
        let with = a.solve(&pose, &Targets::from_pose(&pose), 1.0 / 60.0).unwrap();
        let without = b.solve(&pose, &Targets::default(), 1.0 / 60.0).unwrap();
        assert_pose_eq(&with.pose, &without.pose, 1e-4);
    }

    #[test]
    fn test_hand_target_is_reached() {
        let (mut ik, pose) = solver(static_config());
        let mut targets = Targets::from_pose(&pose);

        let hand = pose.get(JointName::LeftHand).unwrap();
        let shoulder = pose.position(JointName::LeftUpperArm);
        // Swing the hand forward, well within reach
        let goal = shoulder + Vec3::new(-0.2, -0.1, 0.3);
        targets.left_hand = Some(Target::new(goal, hand.rotation));

        let output = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        let reached = output.pose.position(JointName::LeftHand);
        assert!(reached.distance(goal) < 0.02, "hand at {:?}, goal {:?}", reached, goal);

        // Bone lengths survive the solve
        let upper = output.pose.position(JointName::LeftUpperArm);
        let fore = output.pose.position(JointName::LeftForearm);
        let bind_upper = pose
            .position(JointName::LeftUpperArm)
            .distance(pose.position(JointName::LeftForearm));
        assert!((upper.distance(fore) - bind_upper).abs() < 0.01);
    }

    #[test]
    fn test_head_target_is_followed() {
        let (mut ik, pose) = solver(static_config());
        let mut targets = Targets::from_pose(&pose);
        let head = pose.get(JointName::Head).unwrap();
        let goal = head.position + Vec3::new(0.05, -0.1, 0.05);
        targets.head = Some(Target::new(goal, head.rotation));

        let output = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        let reached = output.pose.position(JointName::Head);
        assert!(reached.distance(goal) < 0.05, "head at {:?}, goal {:?}", reached, goal);
    }

    #[test]
    fn test_half_weight_lands_between() {
        let mut config = static_config();
        config.solver.ik_position_weight = 0.5;
        let (mut ik, pose) = solver(config);
        let mut targets = Targets::from_pose(&pose);
        let hand = pose.get(JointName::RightHand).unwrap();
        let goal = pose.position(JointName::RightUpperArm) + Vec3::new(0.2, -0.1, 0.3);
        targets.right_hand = Some(Target::new(goal, hand.rotation));

        let output = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        let reached = output.pose.position(JointName::RightHand);
        assert!(reached.distance(goal) > 0.01, "half weight should not reach the goal");
        assert!(reached.distance(hand.position) > 0.01, "half weight should move the hand");
    }

    #[test]
    fn test_culled_lod_skips_solve() {
        let mut config = static_config();
        config.solver.lod = 2;
        let (mut ik, pose) = solver(config);
        let mut targets = Targets::from_pose(&pose);
        targets.left_hand = Some(Target::from_position(Vec3::new(-0.3, 1.4, 0.4)));

        let output = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        assert_eq!(output.pose, pose, "culled solver without locomotion passes the pose through");
    }

    #[test]
    fn test_culled_lod_follows_head_with_locomotion() {
        let mut config = SolverConfig::default();
        config.solver.seed = Some(1);
        let (mut ik, pose) = solver(config);
        let mut targets = Targets::from_pose(&pose);
        ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();

        ik.set_lod(2);
        let head = pose.get(JointName::Head).unwrap();
        targets.head = Some(Target::new(head.position + Vec3::new(1.0, 0.0, 2.0), head.rotation));
        let output = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();

        let root = output.pose.get(JointName::Root).unwrap();
        assert!((root.position.x - (head.position.x + 1.0)).abs() < 1e-5);
        assert!((root.position.z - (head.position.z + 2.0)).abs() < 1e-5);
        assert_eq!(root.position.y, pose.position(JointName::Root).y);
        // Whole body comes along
        let moved = output.pose.position(JointName::Pelvis) - pose.position(JointName::Pelvis);
        assert!(moved.abs_diff_eq(root.position - pose.position(JointName::Root), 1e-4));
    }

    #[test]
    fn test_set_lod_clamps() {
        let (mut ik, _) = solver(static_config());
        ik.set_lod(9);
        assert_eq!(ik.lod(), 2);
    }

    #[test]
    fn test_position_offset_applies_once() {
        let (mut ik, pose) = solver(static_config());
        let targets = Targets::from_pose(&pose);
        let hand = pose.position(JointName::LeftHand);

        // Towards the body and forward, inside the arm's reach
        let offset = Vec3::new(0.15, 0.0, 0.1);
        ik.add_position_offset(PositionOffset::LeftHand, offset);
        let moved = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        let offset_hand = moved.pose.position(JointName::LeftHand);
        assert!(
            offset_hand.distance(hand + offset) < 0.02,
            "hand at {:?}",
            offset_hand
        );

        let back = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        let back_hand = back.pose.position(JointName::LeftHand);
        assert!(back_hand.distance(hand) < 0.02, "offset should reset, hand at {:?}", back_hand);
    }

    #[test]
    fn test_offsets_queued_at_zero_weight_are_dropped() {
        let (mut ik, pose) = solver(static_config());
        let targets = Targets::from_pose(&pose);
        let hand = pose.position(JointName::LeftHand);

        ik.set_ik_position_weight(0.0);
        for _ in 0..5 {
            ik.add_position_offset(PositionOffset::LeftHand, Vec3::new(0.05, 0.0, 0.05));
            ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        }

        ik.set_ik_position_weight(1.0);
        let output = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        let solved = output.pose.position(JointName::LeftHand);
        assert!(solved.distance(hand) < 0.02, "stale offsets applied, hand at {:?}", solved);
    }

    #[test]
    fn test_rotation_offset_turns_head() {
        let (mut ik, pose) = solver(static_config());
        let targets = Targets::from_pose(&pose);
        let turn = Quat::from_rotation_y(0.5);
        ik.add_rotation_offset(RotationOffset::Head, turn);

        let output = ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        let head = output.pose.rotation(JointName::Head);
        let angle = quat::angle(head, pose.rotation(JointName::Head));
        assert!(angle > 5.0, "head turned only {} degrees", angle);
    }

    #[test]
    fn test_support_leg_is_reported() {
        let (mut ik, pose) = solver(static_config());
        assert_eq!(ik.support_leg(), None);

        let mut targets = Targets::from_pose(&pose);
        // A lifted foot sits closest to its thigh
        let toes = pose.get(JointName::RightToes).unwrap();
        targets.right_foot = Some(Target::new(toes.position + Vec3::new(0.0, 0.25, 0.1), toes.rotation));
        ik.solve(&pose, &targets, 1.0 / 60.0).unwrap();
        assert_eq!(ik.support_leg(), Some(Side::Right));
    }

    #[test]
    fn test_locomotion_steps_after_body() {
        let mut config = SolverConfig::default();
        config.solver.seed = Some(3);
        config.solver.plant_feet = false;
        config.locomotion.step_threshold = 0.2;
        let (mut ik, pose) = solver(config);

        let mut targets = Targets::default();
        let head = pose.get(JointName::Head).unwrap();
        let dt = 1.0 / 60.0;
        let mut events: Vec<FootstepEvent> = Vec::new();
        for frame in 0..120 {
            // Lean the head forward over half a second, then hold
            let lean = (frame as f32 / 30.0).min(1.0) * 0.4;
            targets.head = Some(Target::new(head.position + Vec3::Z * lean, head.rotation));
            let output = ik.solve(&pose, &targets, dt).unwrap();
            events.extend(output.events);
        }

        assert!(!events.is_empty(), "leaning forward should trigger a step");
        let stepped = Side::ALL
            .iter()
            .filter_map(|&side| ik.locomotion().footstep(side))
            .any(|f| f.position.z > pose.position(JointName::LeftToes).z + 0.1);
        assert!(stepped, "a foot should have moved forward");
    }

    #[test]
    fn test_reset_replants_feet() {
        let mut config = SolverConfig::default();
        config.solver.seed = Some(5);
        let (mut ik, pose) = solver(config);
        ik.solve(&pose, &Targets::default(), 1.0 / 60.0).unwrap();

        let mut moved = pose.clone();
        moved.rebase(Transform::from_position(Vec3::new(2.0, 0.0, 0.0)));
        ik.reset(&moved).unwrap();

        let left = ik.locomotion().footstep(Side::Left).unwrap();
        assert!((left.position.x - (moved.position(JointName::LeftToes).x)).abs() < 1e-4);
    }

    #[test]
    fn test_platform_motion_moves_feet() {
        let mut config = SolverConfig::default();
        config.solver.seed = Some(9);
        let (mut ik, pose) = solver(config);
        ik.solve(&pose, &Targets::default(), 1.0 / 60.0).unwrap();

        let before = ik.locomotion().footstep(Side::Left).unwrap().position;
        ik.add_platform_motion(Vec3::new(0.0, 0.1, 0.0), Quat::IDENTITY, Vec3::ZERO);
        let after = ik.locomotion().footstep(Side::Left).unwrap().position;
        assert!(after.abs_diff_eq(before + Vec3::new(0.0, 0.1, 0.0), 1e-6));
    }

    #[test]
    fn test_apply_config_keeps_guessed_axes() {
        let (mut ik, _) = solver(static_config());
        let guessed = ik.hand_axes(Side::Left);

        let mut config = static_config();
        config.left_arm.position_weight = 0.5;
        ik.apply_config(config).unwrap();
        assert_eq!(ik.hand_axes(Side::Left), guessed);
        assert_eq!(ik.config().left_arm.position_weight, 0.5);

        let mut bad = static_config();
        bad.solver.lod = 3;
        assert!(ik.apply_config(bad).is_err());
    }
}
