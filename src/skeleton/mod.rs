//! Skeleton binding: bone arena, humanoid joint slots and pose I/O.

pub mod pose;
pub mod references;
pub mod rig;

pub use pose::{Pose, Transform};
pub use references::{HandAxes, JointName, Layout, References, Side};
pub use rig::{Bone, Rig};
