//! Bone arena: parent indices, ordered child lists and rest transforms.

use glam::{Quat, Vec3};

use super::pose::Transform;

/// A single bone of a [`Rig`].
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    /// Child bone indices in insertion order
    pub children: Vec<usize>,
    pub local_position: Vec3,
    pub local_rotation: Quat,
}

/// Flat bone hierarchy. Parents always precede their children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rig {
    pub bones: Vec<Bone>,
}

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a bone and links it under `parent`. Returns its index.
    ///
    /// A parent index that does not refer to an earlier bone makes the new
    /// bone a root.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<usize>,
        local_position: Vec3,
        local_rotation: Quat,
    ) -> usize {
        let index = self.bones.len();
        let parent = parent.filter(|&p| p < index);
        if let Some(p) = parent {
            self.bones[p].children.push(index);
        }
        self.bones.push(Bone {
            name: name.into(),
            parent,
            children: Vec::new(),
            local_position,
            local_rotation,
        });
        index
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn children(&self, index: usize) -> &[usize] {
        self.bones
            .get(index)
            .map(|b| b.children.as_slice())
            .unwrap_or(&[])
    }

    /// World transforms for every bone using forward kinematics.
    pub fn world_transforms(&self) -> Vec<Transform> {
        let mut world = vec![Transform::IDENTITY; self.bones.len()];
        let mut computed = vec![false; self.bones.len()];

        for i in 0..self.bones.len() {
            self.compute_bone(&mut world, &mut computed, i);
        }

        world
    }

    fn compute_bone(&self, world: &mut [Transform], computed: &mut [bool], idx: usize) {
        if computed[idx] {
            return;
        }

        let bone = &self.bones[idx];
        world[idx] = match bone.parent {
            Some(parent) => {
                self.compute_bone(world, computed, parent);
                let p = world[parent];
                Transform::new(
                    p.position + p.rotation * bone.local_position,
                    (p.rotation * bone.local_rotation).normalize(),
                )
            }
            None => Transform::new(bone.local_position, bone.local_rotation),
        };

        computed[idx] = true;
    }

    /// Procedural 1.7 m humanoid facing +Z with Mixamo bone names, arms out
    /// to the sides, knees slightly bent forward and two finger bones under
    /// each hand.
    pub fn reference_humanoid() -> Self {
        // (name, parent name, world position)
        let layout: &[(&str, Option<&str>, Vec3)] = &[
            ("RootNode", None, Vec3::ZERO),
            ("Hips", Some("RootNode"), Vec3::new(0.0, 1.0, 0.0)),
            ("Spine", Some("Hips"), Vec3::new(0.0, 1.1, 0.0)),
            ("Spine1", Some("Spine"), Vec3::new(0.0, 1.3, 0.0)),
            ("Neck", Some("Spine1"), Vec3::new(0.0, 1.5, 0.0)),
            ("Head", Some("Neck"), Vec3::new(0.0, 1.6, 0.0)),
            ("LeftShoulder", Some("Spine1"), Vec3::new(-0.05, 1.45, 0.0)),
            ("LeftArm", Some("LeftShoulder"), Vec3::new(-0.18, 1.45, 0.0)),
            ("LeftForeArm", Some("LeftArm"), Vec3::new(-0.46, 1.45, 0.0)),
            ("LeftHand", Some("LeftForeArm"), Vec3::new(-0.72, 1.45, 0.0)),
            ("LeftHandThumb1", Some("LeftHand"), Vec3::new(-0.75, 1.44, 0.04)),
            ("LeftHandMiddle1", Some("LeftHand"), Vec3::new(-0.81, 1.45, 0.0)),
            ("RightShoulder", Some("Spine1"), Vec3::new(0.05, 1.45, 0.0)),
            ("RightArm", Some("RightShoulder"), Vec3::new(0.18, 1.45, 0.0)),
            ("RightForeArm", Some("RightArm"), Vec3::new(0.46, 1.45, 0.0)),
            ("RightHand", Some("RightForeArm"), Vec3::new(0.72, 1.45, 0.0)),
            ("RightHandThumb1", Some("RightHand"), Vec3::new(0.75, 1.44, 0.04)),
            ("RightHandMiddle1", Some("RightHand"), Vec3::new(0.81, 1.45, 0.0)),
            ("LeftUpLeg", Some("Hips"), Vec3::new(-0.1, 0.95, 0.0)),
            ("LeftLeg", Some("LeftUpLeg"), Vec3::new(-0.1, 0.52, 0.02)),
            ("LeftFoot", Some("LeftLeg"), Vec3::new(-0.1, 0.08, 0.0)),
            ("LeftToeBase", Some("LeftFoot"), Vec3::new(-0.1, 0.02, 0.12)),
            ("RightUpLeg", Some("Hips"), Vec3::new(0.1, 0.95, 0.0)),
            ("RightLeg", Some("RightUpLeg"), Vec3::new(0.1, 0.52, 0.02)),
            ("RightFoot", Some("RightLeg"), Vec3::new(0.1, 0.08, 0.0)),
            ("RightToeBase", Some("RightFoot"), Vec3::new(0.1, 0.02, 0.12)),
        ];

        let mut rig = Rig::new();
        let mut world = Vec::with_capacity(layout.len());
        for &(name, parent, position) in layout {
            let parent = parent.and_then(|p| rig.find(p));
            let local = match parent {
                Some(p) => position - world[p],
                None => position,
            };
            rig.add_bone(name, parent, local, Quat::IDENTITY);
            world.push(position);
        }
        rig
    }
}
