//! Humanoid joint slots and their binding to rig bones.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::pose::Pose;
use super::rig::Rig;
use crate::error::SkeletonError;
use crate::math::axis;

/// The 22 humanoid slots the solver knows about, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointName {
    Root,
    Pelvis,
    Spine,
    Chest,
    Neck,
    Head,
    LeftShoulder,
    LeftUpperArm,
    LeftForearm,
    LeftHand,
    RightShoulder,
    RightUpperArm,
    RightForearm,
    RightHand,
    LeftThigh,
    LeftCalf,
    LeftFoot,
    LeftToes,
    RightThigh,
    RightCalf,
    RightFoot,
    RightToes,
}

impl JointName {
    pub const COUNT: usize = 22;

    pub const ALL: [JointName; Self::COUNT] = [
        Self::Root,
        Self::Pelvis,
        Self::Spine,
        Self::Chest,
        Self::Neck,
        Self::Head,
        Self::LeftShoulder,
        Self::LeftUpperArm,
        Self::LeftForearm,
        Self::LeftHand,
        Self::RightShoulder,
        Self::RightUpperArm,
        Self::RightForearm,
        Self::RightHand,
        Self::LeftThigh,
        Self::LeftCalf,
        Self::LeftFoot,
        Self::LeftToes,
        Self::RightThigh,
        Self::RightCalf,
        Self::RightFoot,
        Self::RightToes,
    ];

    /// Slot index, also the position in [`JointName::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Joints that a valid skeleton must always have.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Self::Root
                | Self::Pelvis
                | Self::Spine
                | Self::Head
                | Self::LeftUpperArm
                | Self::LeftForearm
                | Self::LeftHand
                | Self::RightUpperArm
                | Self::RightForearm
                | Self::RightHand
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Pelvis => "pelvis",
            Self::Spine => "spine",
            Self::Chest => "chest",
            Self::Neck => "neck",
            Self::Head => "head",
            Self::LeftShoulder => "left_shoulder",
            Self::LeftUpperArm => "left_upper_arm",
            Self::LeftForearm => "left_forearm",
            Self::LeftHand => "left_hand",
            Self::RightShoulder => "right_shoulder",
            Self::RightUpperArm => "right_upper_arm",
            Self::RightForearm => "right_forearm",
            Self::RightHand => "right_hand",
            Self::LeftThigh => "left_thigh",
            Self::LeftCalf => "left_calf",
            Self::LeftFoot => "left_foot",
            Self::LeftToes => "left_toes",
            Self::RightThigh => "right_thigh",
            Self::RightCalf => "right_calf",
            Self::RightFoot => "right_foot",
            Self::RightToes => "right_toes",
        }
    }

    /// Bone name used by Mixamo-exported rigs.
    pub fn mixamo_name(&self) -> &'static str {
        match self {
            Self::Root => "RootNode",
            Self::Pelvis => "Hips",
            Self::Spine => "Spine",
            Self::Chest => "Spine1",
            Self::Neck => "Neck",
            Self::Head => "Head",
            Self::LeftShoulder => "LeftShoulder",
            Self::LeftUpperArm => "LeftArm",
            Self::LeftForearm => "LeftForeArm",
            Self::LeftHand => "LeftHand",
            Self::RightShoulder => "RightShoulder",
            Self::RightUpperArm => "RightArm",
            Self::RightForearm => "RightForeArm",
            Self::RightHand => "RightHand",
            Self::LeftThigh => "LeftUpLeg",
            Self::LeftCalf => "LeftLeg",
            Self::LeftFoot => "LeftFoot",
            Self::LeftToes => "LeftToeBase",
            Self::RightThigh => "RightUpLeg",
            Self::RightCalf => "RightLeg",
            Self::RightFoot => "RightFoot",
            Self::RightToes => "RightToeBase",
        }
    }

    /// Accepts either the snake_case slot name or the Mixamo bone name.
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.strip_prefix("mixamorig:").unwrap_or(s);
        Self::ALL
            .iter()
            .copied()
            .find(|j| j.as_str().eq_ignore_ascii_case(s) || j.mixamo_name().eq_ignore_ascii_case(s))
    }
}

/// Which optional joints a bound skeleton has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout {
    pub has_chest: bool,
    pub has_neck: bool,
    pub has_shoulders: bool,
    pub has_toes: bool,
    pub has_legs: bool,
}

impl Layout {
    /// Checks required joints and leg completeness, then records which
    /// optional joints are present.
    pub fn detect(present: impl Fn(JointName) -> bool) -> Result<Self, SkeletonError> {
        for joint in JointName::ALL {
            if joint.is_required() && !present(joint) {
                return Err(SkeletonError::MissingJoint(joint.as_str()));
            }
        }

        let leg_joints = [
            JointName::LeftThigh,
            JointName::LeftCalf,
            JointName::LeftFoot,
            JointName::RightThigh,
            JointName::RightCalf,
            JointName::RightFoot,
        ];
        let any_leg = leg_joints.iter().any(|&j| present(j));
        if any_leg {
            if let Some(missing) = leg_joints.iter().find(|&&j| !present(j)) {
                return Err(SkeletonError::IncompleteLegs(missing.as_str()));
            }
        }

        Ok(Self {
            has_chest: present(JointName::Chest),
            has_neck: present(JointName::Neck),
            has_shoulders: present(JointName::LeftShoulder) && present(JointName::RightShoulder),
            has_toes: any_leg && present(JointName::LeftToes) && present(JointName::RightToes),
            has_legs: any_leg,
        })
    }

    /// Slot the arms hang from.
    pub fn arm_root(&self) -> JointName {
        if self.has_chest {
            JointName::Chest
        } else {
            JointName::Spine
        }
    }

    /// Spine chain slots, pelvis first.
    pub fn spine_joints(&self) -> Vec<JointName> {
        let mut joints = vec![JointName::Pelvis, JointName::Spine];
        if self.has_chest {
            joints.push(JointName::Chest);
        }
        if self.has_neck {
            joints.push(JointName::Neck);
        }
        joints.push(JointName::Head);
        joints
    }

    pub fn arm_joints(&self, side: Side) -> Vec<JointName> {
        let [shoulder, upper, fore, hand] = side.arm();
        let mut joints = Vec::with_capacity(4);
        if self.has_shoulders {
            joints.push(shoulder);
        }
        joints.extend([upper, fore, hand]);
        joints
    }

    pub fn leg_joints(&self, side: Side) -> Vec<JointName> {
        let [thigh, calf, foot, toes] = side.leg();
        let mut joints = vec![thigh, calf, foot];
        if self.has_toes {
            joints.push(toes);
        }
        joints
    }

    /// Closest used ancestor of `joint`. Slots in [`JointName::ALL`] order
    /// always come after their parent.
    pub fn parent(&self, joint: JointName) -> Option<JointName> {
        use JointName::*;
        let parent = match joint {
            Root => return None,
            Pelvis => Root,
            Spine => Pelvis,
            Chest => Spine,
            Neck => self.arm_root(),
            Head if self.has_neck => Neck,
            Head => self.arm_root(),
            LeftShoulder | RightShoulder => self.arm_root(),
            LeftUpperArm if self.has_shoulders => LeftShoulder,
            RightUpperArm if self.has_shoulders => RightShoulder,
            LeftUpperArm | RightUpperArm => self.arm_root(),
            LeftForearm => LeftUpperArm,
            LeftHand => LeftForearm,
            RightForearm => RightUpperArm,
            RightHand => RightForearm,
            LeftThigh | RightThigh => Pelvis,
            LeftCalf => LeftThigh,
            LeftFoot => LeftCalf,
            LeftToes => LeftFoot,
            RightCalf => RightThigh,
            RightFoot => RightCalf,
            RightToes => RightFoot,
        };
        Some(parent)
    }

    /// Whether `joint` takes part in the solve for this layout.
    pub fn uses(&self, joint: JointName) -> bool {
        match joint {
            JointName::Chest => self.has_chest,
            JointName::Neck => self.has_neck,
            JointName::LeftShoulder | JointName::RightShoulder => self.has_shoulders,
            JointName::LeftToes | JointName::RightToes => self.has_toes,
            JointName::LeftThigh
            | JointName::LeftCalf
            | JointName::LeftFoot
            | JointName::RightThigh
            | JointName::RightCalf
            | JointName::RightFoot => self.has_legs,
            _ => true,
        }
    }
}

/// Body side of a limb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub fn is_left(self) -> bool {
        self == Side::Left
    }

    /// Shoulder, upper arm, forearm, hand.
    pub fn arm(self) -> [JointName; 4] {
        match self {
            Side::Left => [
                JointName::LeftShoulder,
                JointName::LeftUpperArm,
                JointName::LeftForearm,
                JointName::LeftHand,
            ],
            Side::Right => [
                JointName::RightShoulder,
                JointName::RightUpperArm,
                JointName::RightForearm,
                JointName::RightHand,
            ],
        }
    }

    /// Thigh, calf, foot, toes.
    pub fn leg(self) -> [JointName; 4] {
        match self {
            Side::Left => [
                JointName::LeftThigh,
                JointName::LeftCalf,
                JointName::LeftFoot,
                JointName::LeftToes,
            ],
            Side::Right => [
                JointName::RightThigh,
                JointName::RightCalf,
                JointName::RightFoot,
                JointName::RightToes,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Hand axes in the hand bone's local space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HandAxes {
    pub wrist_to_palm: Vec3,
    pub palm_to_thumb: Vec3,
}

/// Binding of humanoid slots to bone indices in a [`Rig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct References {
    pub bones: [Option<usize>; JointName::COUNT],
}

impl References {
    pub fn get(&self, joint: JointName) -> Option<usize> {
        self.bones[joint.index()]
    }

    pub fn set(&mut self, joint: JointName, bone: Option<usize>) {
        self.bones[joint.index()] = bone;
    }

    /// Binds every slot whose snake_case or Mixamo name exists in the rig.
    pub fn from_rig_names(rig: &Rig) -> Self {
        let mut refs = Self::default();
        for (index, bone) in rig.bones.iter().enumerate() {
            if let Some(joint) = JointName::from_str(&bone.name) {
                if refs.get(joint).is_none() {
                    refs.set(joint, Some(index));
                }
            }
        }
        refs
    }

    /// Structural check; returns the detected layout.
    pub fn validate(&self, rig: &Rig) -> Result<Layout, SkeletonError> {
        for joint in JointName::ALL {
            if let Some(index) = self.get(joint) {
                if index >= rig.bones.len() {
                    return Err(SkeletonError::BoneOutOfRange {
                        joint: joint.as_str(),
                        index,
                    });
                }
            }
        }
        Layout::detect(|j| self.get(j).is_some())
    }

    /// Guesses both hand axes for `side` from the posed rig.
    ///
    /// The palm-to-thumb axis needs the hand's children; the closest child is
    /// taken to be the thumb. Without children that axis stays zero.
    pub fn guess_hand_axes(&self, rig: &Rig, pose: &Pose, side: Side) -> HandAxes {
        let [_, _, forearm, hand] = side.arm();
        let mut axes = HandAxes {
            wrist_to_palm: guess_wrist_to_palm(pose, side),
            ..Default::default()
        };

        let (Some(hand_bone), Some(hand_t), Some(forearm_t)) =
            (self.get(hand), pose.get(hand), pose.get(forearm))
        else {
            return axes;
        };

        let world = rig.world_transforms();
        let thumb = rig.bones[hand_bone]
            .children
            .iter()
            .map(|&c| world[c].position)
            .min_by(|a, b| {
                a.distance_squared(hand_t.position)
                    .total_cmp(&b.distance_squared(hand_t.position))
            });

        if let Some(thumb) = thumb {
            let hand_normal =
                (hand_t.position - forearm_t.position).cross(thumb - hand_t.position);
            let to_thumb = hand_normal.cross(hand_t.position - forearm_t.position);
            if to_thumb.length_squared() > 0.0 {
                axes.palm_to_thumb = axis::signed_axis_to_direction(hand_t.rotation, to_thumb);
            }
        }

        axes
    }
}

/// Local hand axis pointing from the wrist towards the palm, i.e. away from
/// the forearm. Zero when the hand and forearm coincide.
pub fn guess_wrist_to_palm(pose: &Pose, side: Side) -> Vec3 {
    let [_, _, forearm, hand] = side.arm();
    let (Some(hand_t), Some(forearm_t)) = (pose.get(hand), pose.get(forearm)) else {
        return Vec3::ZERO;
    };
    let to_forearm = forearm_t.position - hand_t.position;
    if to_forearm.length_squared() == 0.0 {
        return Vec3::ZERO;
    }
    -axis::signed_axis_to_direction(hand_t.rotation, to_forearm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_names_round_trip() {
        for joint in JointName::ALL {
            assert_eq!(JointName::from_str(joint.as_str()), Some(joint));
            assert_eq!(JointName::from_str(joint.mixamo_name()), Some(joint));
        }
        assert_eq!(JointName::from_str("mixamorig:Hips"), Some(JointName::Pelvis));
        assert_eq!(JointName::from_str("tail"), None);
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, joint) in JointName::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
        }
        assert_eq!(JointName::LeftThigh.index(), 14);
        assert_eq!(JointName::RightToes.index(), 21);
    }

    #[test]
    fn test_layout_requires_core_joints() {
        let err = Layout::detect(|j| j != JointName::Head).unwrap_err();
        assert_eq!(err, SkeletonError::MissingJoint("head"));
    }

    #[test]
    fn test_layout_rejects_partial_legs() {
        let err = Layout::detect(|j| j != JointName::RightCalf).unwrap_err();
        assert_eq!(err, SkeletonError::IncompleteLegs("right_calf"));
    }

    #[test]
    fn test_layout_optional_joints() {
        let layout = Layout::detect(|j| {
            j.is_required() || matches!(j, JointName::Chest | JointName::LeftShoulder)
        })
        .unwrap();
        assert!(layout.has_chest);
        assert!(!layout.has_neck);
        assert!(!layout.has_shoulders, "shoulders need both sides");
        assert!(!layout.has_legs);
        assert!(!layout.has_toes);
        assert_eq!(layout.arm_root(), JointName::Chest);
        assert_eq!(
            layout.spine_joints(),
            vec![JointName::Pelvis, JointName::Spine, JointName::Chest, JointName::Head]
        );
        assert_eq!(layout.arm_joints(Side::Left).len(), 3);
        assert_eq!(layout.parent(JointName::Head), Some(JointName::Chest));
        assert_eq!(layout.parent(JointName::LeftUpperArm), Some(JointName::Chest));
    }

    #[test]
    fn test_parents_precede_children() {
        let layout = Layout::detect(|_| true).unwrap();
        assert_eq!(layout.parent(JointName::Root), None);
        assert_eq!(layout.parent(JointName::Head), Some(JointName::Neck));
        for joint in JointName::ALL.into_iter().skip(1) {
            let parent = layout.parent(joint).unwrap();
            assert!(parent.index() < joint.index(), "{:?} before {:?}", parent, joint);
            assert!(layout.uses(parent), "{:?} is not used", parent);
        }
    }

    #[test]
    fn test_references_from_reference_rig() {
        let rig = Rig::reference_humanoid();
        let refs = References::from_rig_names(&rig);
        let layout = refs.validate(&rig).unwrap();
        assert!(layout.has_chest && layout.has_neck && layout.has_shoulders);
        assert!(layout.has_legs && layout.has_toes);
    }

    #[test]
    fn test_guess_hand_axes_on_reference_rig() {
        let rig = Rig::reference_humanoid();
        let refs = References::from_rig_names(&rig);
        let pose = Pose::from_rig(&rig, &refs);

        let left = refs.guess_hand_axes(&rig, &pose, Side::Left);
        // Left arm extends along -X, so the palm is further along -X
        assert_eq!(left.wrist_to_palm, -Vec3::X);
        assert_ne!(left.palm_to_thumb, Vec3::ZERO);

        let right = refs.guess_hand_axes(&rig, &pose, Side::Right);
        assert_eq!(right.wrist_to_palm, Vec3::X);
        assert_ne!(right.palm_to_thumb, Vec3::ZERO);
    }
}
