//! The solver: virtual bones, body parts, stepping and the full-body pipeline.

pub mod arm;
pub mod body_part;
pub mod footstep;
pub mod ik;
pub mod leg;
pub mod locomotion;
pub mod spine;
pub mod targets;
pub mod virtual_bone;

pub use arm::Arm;
pub use body_part::{BodyPart, Chain};
pub use footstep::Footstep;
pub use ik::BodyIk;
pub use leg::Leg;
pub use locomotion::Locomotion;
pub use spine::Spine;
pub use targets::{
    FootPlacement, FootstepEvent, FrameContext, PositionOffset, RotationOffset, SolveOutput, Target,
    Targets,
};
pub use virtual_bone::VirtualBone;
