//! World-space humanoid pose: the solver's input and output format.

use std::collections::HashMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::references::{JointName, Layout, References};
use super::rig::Rig;
use crate::error::SkeletonError;
use crate::math::quat;

/// World position and rotation of one joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && quat::is_valid(self.rotation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One optional transform per humanoid slot, indexed by [`JointName`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pose {
    pub joints: [Option<Transform>; JointName::COUNT],
}

impl Pose {
    pub fn get(&self, joint: JointName) -> Option<Transform> {
        self.joints[joint.index()]
    }

    pub fn set(&mut self, joint: JointName, transform: Transform) {
        self.joints[joint.index()] = Some(transform);
    }

    pub fn clear(&mut self, joint: JointName) {
        self.joints[joint.index()] = None;
    }

    /// Position of `joint`, or zero if absent.
    pub fn position(&self, joint: JointName) -> Vec3 {
        self.get(joint).map(|t| t.position).unwrap_or(Vec3::ZERO)
    }

    /// Rotation of `joint`, or identity if absent.
    pub fn rotation(&self, joint: JointName) -> Quat {
        self.get(joint).map(|t| t.rotation).unwrap_or(Quat::IDENTITY)
    }

    /// Samples the rig's current local transforms into a world pose.
    pub fn from_rig(rig: &Rig, refs: &References) -> Self {
        let world = rig.world_transforms();
        let mut pose = Self::default();
        for joint in JointName::ALL {
            if let Some(t) = refs.get(joint).and_then(|i| world.get(i)) {
                pose.set(joint, *t);
            }
        }
        pose
    }

    /// Builds a pose from joint names (snake_case slot or Mixamo names).
    pub fn from_named<'a, I>(joints: I) -> Result<Self, SkeletonError>
    where
        I: IntoIterator<Item = (&'a str, Transform)>,
    {
        let mut pose = Self::default();
        for (name, transform) in joints {
            let joint =
                JointName::from_str(name).ok_or_else(|| SkeletonError::UnknownJoint(name.to_string()))?;
            pose.set(joint, transform);
        }
        Ok(pose)
    }

    /// Joint name → transform map of every present joint.
    pub fn to_named(&self) -> HashMap<&'static str, Transform> {
        JointName::ALL
            .iter()
            .filter_map(|&j| self.get(j).map(|t| (j.as_str(), t)))
            .collect()
    }

    /// Structural validation; returns the layout the pose implies.
    pub fn layout(&self) -> Result<Layout, SkeletonError> {
        for joint in JointName::ALL {
            if let Some(t) = self.get(joint) {
                if !t.is_finite() {
                    return Err(SkeletonError::NonFinite(joint.as_str()));
                }
            }
        }
        Layout::detect(|j| self.get(j).is_some())
    }

    /// Rigidly moves the whole pose so that the root lands on `root`.
    pub fn rebase(&mut self, root: Transform) {
        let Some(old) = self.get(JointName::Root) else {
            return;
        };
        let delta = quat::difference(old.rotation, root.rotation);
        for t in self.joints.iter_mut().flatten() {
            t.position = root.position + delta * (t.position - old.position);
            t.rotation = (delta * t.rotation).normalize();
        }
    }
}
