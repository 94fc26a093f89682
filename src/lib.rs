//! bodyik - Humanoid full-body inverse kinematics
//!
//! A solver that poses a humanoid skeleton from a handful of targets:
//! - Head, pelvis, hand and foot targets with elbow/knee/chest bend goals
//! - Trigonometric arms and legs with stretching, FABRIK spine
//! - Procedural stepping with root motion when the feet are not tracked
//! - Level of detail, runtime offsets and moving-platform support

pub mod config;
pub mod error;
pub mod math;
pub mod presets;
pub mod skeleton;
pub mod solver;

pub use config::SolverConfig;
pub use error::{IkError, Result};
pub use presets::TrackingPreset;
pub use skeleton::{JointName, Pose, References, Rig, Side, Transform};
pub use solver::{BodyIk, FootstepEvent, PositionOffset, RotationOffset, SolveOutput, Target, Targets};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
