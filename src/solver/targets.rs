//! Per-call inputs and outputs of the solver.

use glam::{Quat, Vec3};

use crate::skeleton::{Pose, Side, Transform};

/// A world-space end-effector goal.
pub type Target = Transform;

/// Goals for one solve call. Absent targets leave the corresponding body
/// part following the animated pose.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Targets {
    pub head: Option<Target>,
    pub pelvis: Option<Target>,
    pub left_hand: Option<Target>,
    pub right_hand: Option<Target>,
    pub left_foot: Option<Target>,
    pub right_foot: Option<Target>,
    /// Points the elbows bend towards
    pub left_elbow_goal: Option<Vec3>,
    pub right_elbow_goal: Option<Vec3>,
    /// Points the knees bend towards
    pub left_knee_goal: Option<Vec3>,
    pub right_knee_goal: Option<Vec3>,
    /// Point the chest faces
    pub chest_goal: Option<Vec3>,
}

impl Targets {
    pub fn hand(&self, side: Side) -> Option<Target> {
        match side {
            Side::Left => self.left_hand,
            Side::Right => self.right_hand,
        }
    }

    pub fn foot(&self, side: Side) -> Option<Target> {
        match side {
            Side::Left => self.left_foot,
            Side::Right => self.right_foot,
        }
    }

    pub fn elbow_goal(&self, side: Side) -> Option<Vec3> {
        match side {
            Side::Left => self.left_elbow_goal,
            Side::Right => self.right_elbow_goal,
        }
    }

    pub fn knee_goal(&self, side: Side) -> Option<Vec3> {
        match side {
            Side::Left => self.left_knee_goal,
            Side::Right => self.right_knee_goal,
        }
    }

    /// Targets that pin every end effector to where `pose` already has it.
    pub fn from_pose(pose: &Pose) -> Self {
        use crate::skeleton::JointName as J;
        Self {
            head: pose.get(J::Head),
            pelvis: pose.get(J::Pelvis),
            left_hand: pose.get(J::LeftHand),
            right_hand: pose.get(J::RightHand),
            left_foot: pose.get(J::LeftToes).or(pose.get(J::LeftFoot)),
            right_foot: pose.get(J::RightToes).or(pose.get(J::RightFoot)),
            ..Default::default()
        }
    }
}

/// Slots that accept an additive position offset for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOffset {
    Pelvis,
    Chest,
    Head,
    LeftHand,
    RightHand,
    LeftFoot,
    RightFoot,
    LeftHeel,
    RightHeel,
}

/// Slots that accept an additive rotation offset for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOffset {
    Pelvis,
    Chest,
    Head,
}

/// A foot that finished its step during a solve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootstepEvent {
    Left,
    Right,
}

impl FootstepEvent {
    pub fn side(self) -> Side {
        match self {
            FootstepEvent::Left => Side::Left,
            FootstepEvent::Right => Side::Right,
        }
    }
}

/// Result of one solve call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveOutput {
    pub pose: Pose,
    /// Feet that planted during this call, in the order they landed
    pub events: Vec<FootstepEvent>,
}

/// Values shared by every stage of one solve call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub delta_time: f32,
    pub lod: u8,
    pub ik_position_weight: f32,
    pub plant_feet: bool,
}

/// Foot placement proposed by the stepping subsystem for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootPlacement {
    pub left_position: Vec3,
    pub right_position: Vec3,
    pub left_rotation: Quat,
    pub right_rotation: Quat,
    /// Foot lift from the step height curve
    pub left_offset: f32,
    pub right_offset: f32,
    /// Heel lift from the heel height curve
    pub left_heel_offset: f32,
    pub right_heel_offset: f32,
}

impl Default for FootPlacement {
    fn default() -> Self {
        Self {
            left_position: Vec3::ZERO,
            right_position: Vec3::ZERO,
            left_rotation: Quat::IDENTITY,
            right_rotation: Quat::IDENTITY,
            left_offset: 0.0,
            right_offset: 0.0,
            left_heel_offset: 0.0,
            right_heel_offset: 0.0,
        }
    }
}

impl FootPlacement {
    pub fn position(&self, side: Side) -> Vec3 {
        match side {
            Side::Left => self.left_position,
            Side::Right => self.right_position,
        }
    }

    pub fn rotation(&self, side: Side) -> Quat {
        match side {
            Side::Left => self.left_rotation,
            Side::Right => self.right_rotation,
        }
    }

    pub fn offset(&self, side: Side) -> f32 {
        match side {
            Side::Left => self.left_offset,
            Side::Right => self.right_offset,
        }
    }

    pub fn heel_offset(&self, side: Side) -> f32 {
        match side {
            Side::Left => self.left_heel_offset,
            Side::Right => self.right_heel_offset,
        }
    }
}
