//! Configuration parsing and management for bodyik

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, IkError};
use crate::math::{FloatCurve, InterpolationMode};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub solver: GeneralSettings,
    pub spine: SpineSettings,
    pub left_arm: ArmSettings,
    pub right_arm: ArmSettings,
    pub left_leg: LegSettings,
    pub right_leg: LegSettings,
    pub locomotion: LocomotionSettings,
}

impl SolverConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IkError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> Result<Self, IkError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, IkError> {
        let paths = [
            PathBuf::from("bodyik.toml"),
            PathBuf::from("config/bodyik.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> Result<String, IkError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Validate the configuration.
    ///
    /// Weights outside [0, 1] are accepted here and clamped when applied;
    /// only values the solver cannot work with are rejected.
    pub fn validate(&self) -> Result<(), IkError> {
        if self.solver.lod > 2 {
            return Err(invalid("solver.lod", "LOD must be 0, 1 or 2"));
        }

        let finite: &[(&str, f32)] = &[
            ("solver.ik_position_weight", self.solver.ik_position_weight),
            ("spine.min_head_height", self.spine.min_head_height),
            ("spine.max_root_angle", self.spine.max_root_angle),
            ("spine.root_heading_offset", self.spine.root_heading_offset),
            ("left_arm.swivel_offset", self.left_arm.swivel_offset),
            ("right_arm.swivel_offset", self.right_arm.swivel_offset),
            ("left_leg.swivel_offset", self.left_leg.swivel_offset),
            ("right_leg.swivel_offset", self.right_leg.swivel_offset),
            ("locomotion.weight", self.locomotion.weight),
        ];
        for &(field, value) in finite {
            if !value.is_finite() {
                return Err(invalid(field, "Value must be finite"));
            }
        }

        let non_negative: &[(&str, f32)] = &[
            ("locomotion.foot_distance", self.locomotion.foot_distance),
            ("locomotion.step_threshold", self.locomotion.step_threshold),
            ("locomotion.angle_threshold", self.locomotion.angle_threshold),
            ("locomotion.com_angle_mlp", self.locomotion.com_angle_mlp),
            ("locomotion.max_velocity", self.locomotion.max_velocity),
            ("locomotion.velocity_factor", self.locomotion.velocity_factor),
            ("locomotion.max_leg_stretch", self.locomotion.max_leg_stretch),
            ("locomotion.root_speed", self.locomotion.root_speed),
            ("locomotion.step_speed", self.locomotion.step_speed),
            (
                "locomotion.relax_leg_twist_min_angle",
                self.locomotion.relax_leg_twist_min_angle,
            ),
            (
                "locomotion.relax_leg_twist_speed",
                self.locomotion.relax_leg_twist_speed,
            ),
        ];
        for &(field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(field, "Value must be a non-negative number"));
            }
        }

        let multipliers: &[(&str, f32)] = &[
            ("left_arm.arm_length_mlp", self.left_arm.arm_length_mlp),
            ("right_arm.arm_length_mlp", self.right_arm.arm_length_mlp),
            ("left_leg.leg_length_mlp", self.left_leg.leg_length_mlp),
            ("right_leg.leg_length_mlp", self.right_leg.leg_length_mlp),
        ];
        for &(field, value) in multipliers {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, "Length multiplier must be greater than 0"));
            }
        }

        let curves: &[(&str, &FloatCurve)] = &[
            ("left_arm.stretch_curve", &self.left_arm.stretch_curve),
            ("right_arm.stretch_curve", &self.right_arm.stretch_curve),
            ("left_leg.stretch_curve", &self.left_leg.stretch_curve),
            ("right_leg.stretch_curve", &self.right_leg.stretch_curve),
            ("locomotion.step_height", &self.locomotion.step_height),
            ("locomotion.heel_height", &self.locomotion.heel_height),
        ];
        for &(field, curve) in curves {
            if !curve.is_sorted() {
                return Err(invalid(field, "Curve keys must be sorted by time"));
            }
        }

        if self.solver.plant_feet && self.spine.pelvis_position_weight > 0.0 {
            tracing::warn!(
                "spine.pelvis_position_weight is used together with solver.plant_feet; the pelvis target will fight the planted feet"
            );
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> IkError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Whole-solver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Master blend between the input pose and the solved pose
    pub ik_position_weight: f32,
    /// 0 full quality, 1 no stretching/twist/chest-by-hands, 2 culled
    pub lod: u8,
    /// Keep the feet planted by limiting pelvis motion to leg reach
    pub plant_feet: bool,
    /// Seed for step speed randomization; None draws from entropy
    pub seed: Option<u64>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            ik_position_weight: 1.0,
            lod: 0,
            plant_feet: true,
            seed: None,
        }
    }
}

/// Spine, head and pelvis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpineSettings {
    pub position_weight: f32,
    pub rotation_weight: f32,
    pub pelvis_position_weight: f32,
    pub pelvis_rotation_weight: f32,
    pub chest_goal_weight: f32,
    /// Head stays at least this far above the root, in meters
    pub min_head_height: f32,
    pub body_pos_stiffness: f32,
    pub body_rot_stiffness: f32,
    pub neck_stiffness: f32,
    pub rotate_chest_by_hands: f32,
    pub chest_clamp_weight: f32,
    pub head_clamp_weight: f32,
    pub move_body_back_when_crouching: f32,
    pub maintain_pelvis_position: f32,
    /// Degrees the body may turn away from the root before the root follows
    pub max_root_angle: f32,
    /// Degrees
    pub root_heading_offset: f32,
}

impl Default for SpineSettings {
    fn default() -> Self {
        Self {
            position_weight: 1.0,
            rotation_weight: 1.0,
            pelvis_position_weight: 0.0,
            pelvis_rotation_weight: 0.0,
            chest_goal_weight: 0.0,
            min_head_height: 0.8,
            body_pos_stiffness: 0.55,
            body_rot_stiffness: 0.1,
            neck_stiffness: 0.2,
            rotate_chest_by_hands: 1.0,
            chest_clamp_weight: 0.5,
            head_clamp_weight: 0.6,
            move_body_back_when_crouching: 0.5,
            maintain_pelvis_position: 0.2,
            max_root_angle: 25.0,
            root_heading_offset: 0.0,
        }
    }
}

impl SpineSettings {
    /// Copy with every weight clamped into its valid range.
    pub fn clamped(&self) -> Self {
        Self {
            position_weight: unit(self.position_weight),
            rotation_weight: unit(self.rotation_weight),
            pelvis_position_weight: unit(self.pelvis_position_weight),
            pelvis_rotation_weight: unit(self.pelvis_rotation_weight),
            chest_goal_weight: unit(self.chest_goal_weight),
            body_pos_stiffness: unit(self.body_pos_stiffness),
            body_rot_stiffness: unit(self.body_rot_stiffness),
            neck_stiffness: unit(self.neck_stiffness),
            rotate_chest_by_hands: unit(self.rotate_chest_by_hands),
            chest_clamp_weight: unit(self.chest_clamp_weight),
            head_clamp_weight: unit(self.head_clamp_weight),
            move_body_back_when_crouching: unit(self.move_body_back_when_crouching),
            maintain_pelvis_position: unit(self.maintain_pelvis_position),
            max_root_angle: self.max_root_angle.clamp(0.0, 180.0),
            ..self.clone()
        }
    }
}

/// How the shoulder follows the hand target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShoulderRotationMode {
    /// Separate yaw and pitch with damped limits
    #[default]
    YawPitch,
    /// Single shortest-arc swing towards the hand
    FromTo,
}

impl ShoulderRotationMode {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "from_to" | "fromto" => Self::FromTo,
            _ => Self::YawPitch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YawPitch => "yaw_pitch",
            Self::FromTo => "from_to",
        }
    }
}

/// Per-arm settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmSettings {
    pub position_weight: f32,
    pub rotation_weight: f32,
    pub shoulder_rotation_mode: ShoulderRotationMode,
    pub shoulder_rotation_weight: f32,
    pub shoulder_twist_weight: f32,
    pub bend_goal_weight: f32,
    /// Degrees
    pub swivel_offset: f32,
    /// Local hand axis from the wrist towards the palm; zero means guess it
    pub wrist_to_palm_axis: Vec3,
    /// Local hand axis from the palm towards the thumb; zero means guess it
    pub palm_to_thumb_axis: Vec3,
    pub arm_length_mlp: f32,
    /// Stretch amount as a function of target distance over arm length
    pub stretch_curve: FloatCurve,
}

impl Default for ArmSettings {
    fn default() -> Self {
        Self {
            position_weight: 1.0,
            rotation_weight: 1.0,
            shoulder_rotation_mode: ShoulderRotationMode::YawPitch,
            shoulder_rotation_weight: 1.0,
            shoulder_twist_weight: 1.0,
            bend_goal_weight: 0.0,
            swivel_offset: 0.0,
            wrist_to_palm_axis: Vec3::ZERO,
            palm_to_thumb_axis: Vec3::ZERO,
            arm_length_mlp: 1.0,
            stretch_curve: FloatCurve::default(),
        }
    }
}

impl ArmSettings {
    pub fn clamped(&self) -> Self {
        Self {
            position_weight: unit(self.position_weight),
            rotation_weight: unit(self.rotation_weight),
            shoulder_rotation_weight: unit(self.shoulder_rotation_weight),
            shoulder_twist_weight: unit(self.shoulder_twist_weight),
            bend_goal_weight: unit(self.bend_goal_weight),
            swivel_offset: self.swivel_offset.clamp(-180.0, 180.0),
            arm_length_mlp: self.arm_length_mlp.max(0.01),
            ..self.clone()
        }
    }
}

/// Per-leg settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegSettings {
    pub position_weight: f32,
    pub rotation_weight: f32,
    pub bend_goal_weight: f32,
    /// Degrees
    pub swivel_offset: f32,
    /// Blend of the knee bend normal from pelvis-relative to foot-relative
    pub bend_to_target_weight: f32,
    pub leg_length_mlp: f32,
    pub stretch_curve: FloatCurve,
    /// Take the knee bend normal from the animated pose every frame
    pub use_animated_bend_normal: bool,
}

impl Default for LegSettings {
    fn default() -> Self {
        Self {
            position_weight: 0.0,
            rotation_weight: 0.0,
            bend_goal_weight: 0.0,
            swivel_offset: 0.0,
            bend_to_target_weight: 0.5,
            leg_length_mlp: 1.0,
            stretch_curve: FloatCurve::default(),
            use_animated_bend_normal: false,
        }
    }
}

impl LegSettings {
    pub fn clamped(&self) -> Self {
        Self {
            position_weight: unit(self.position_weight),
            rotation_weight: unit(self.rotation_weight),
            bend_goal_weight: unit(self.bend_goal_weight),
            swivel_offset: self.swivel_offset.clamp(-180.0, 180.0),
            bend_to_target_weight: unit(self.bend_to_target_weight),
            leg_length_mlp: self.leg_length_mlp.max(0.01),
            ..self.clone()
        }
    }
}

/// Procedural stepping settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionSettings {
    pub weight: f32,
    /// Lateral distance of each foot from the center of mass projection
    pub foot_distance: f32,
    pub step_threshold: f32,
    /// Degrees
    pub angle_threshold: f32,
    pub com_angle_mlp: f32,
    pub max_velocity: f32,
    pub velocity_factor: f32,
    pub max_leg_stretch: f32,
    pub root_speed: f32,
    pub step_speed: f32,
    /// Foot lift over step progress
    pub step_height: FloatCurve,
    /// Heel lift over step progress
    pub heel_height: FloatCurve,
    /// Degrees
    pub relax_leg_twist_min_angle: f32,
    /// Degrees per second
    pub relax_leg_twist_speed: f32,
    pub step_interpolation: InterpolationMode,
    /// Root-space offset of the center of mass
    pub offset: Vec3,
}

impl Default for LocomotionSettings {
    fn default() -> Self {
        Self {
            weight: 1.0,
            foot_distance: 0.3,
            step_threshold: 0.4,
            angle_threshold: 60.0,
            com_angle_mlp: 1.0,
            max_velocity: 0.4,
            velocity_factor: 0.4,
            max_leg_stretch: 1.0,
            root_speed: 20.0,
            step_speed: 3.0,
            step_height: FloatCurve::bump(0.03),
            heel_height: FloatCurve::bump(0.03),
            relax_leg_twist_min_angle: 20.0,
            relax_leg_twist_speed: 400.0,
            step_interpolation: InterpolationMode::InOutSine,
            offset: Vec3::ZERO,
        }
    }
}

impl LocomotionSettings {
    pub fn clamped(&self) -> Self {
        Self {
            weight: unit(self.weight),
            foot_distance: self.foot_distance.clamp(0.0, 0.5),
            step_threshold: self.step_threshold.clamp(0.0, 0.5),
            angle_threshold: self.angle_threshold.clamp(0.0, 180.0),
            com_angle_mlp: self.com_angle_mlp.clamp(0.0, 2.0),
            max_velocity: self.max_velocity.clamp(0.0, 1.0),
            velocity_factor: self.velocity_factor.clamp(0.0, 1.0),
            max_leg_stretch: self.max_leg_stretch.clamp(0.9, 1.0),
            root_speed: self.root_speed.clamp(0.0, 100.0),
            step_speed: self.step_speed.clamp(0.0, 100.0),
            relax_leg_twist_min_angle: self.relax_leg_twist_min_angle.clamp(0.0, 180.0),
            relax_leg_twist_speed: self.relax_leg_twist_speed.clamp(0.0, 400.0),
            ..self.clone()
        }
    }
}

fn unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SolverConfig::default();
        assert_eq!(config.solver.ik_position_weight, 1.0);
        assert!(config.solver.plant_feet);
        assert_eq!(config.spine.min_head_height, 0.8);
        assert_eq!(config.left_leg.position_weight, 0.0);
        assert_eq!(config.right_arm.position_weight, 1.0);
        assert_eq!(config.locomotion.step_speed, 3.0);
        assert!(config.left_arm.stretch_curve.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let config = SolverConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_lod() {
        let mut config = SolverConfig::default();
        config.solver.lod = 3;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("solver.lod"), "got {}", err);
    }

    #[test]
    fn test_validation_rejects_negative_threshold() {
        let mut config = SolverConfig::default();
        config.locomotion.step_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [solver]
            lod = 1
            plant_feet = false
            seed = 7

            [left_arm]
            shoulder_rotation_mode = "from_to"
            wrist_to_palm_axis = [-1.0, 0.0, 0.0]
            stretch_curve = [{ time = 1.0, value = 0.0 }, { time = 1.5, value = 0.5 }]

            [locomotion]
            step_interpolation = "in_out_quintic"
        "#;

        let config = SolverConfig::from_str(toml).unwrap();
        assert_eq!(config.solver.lod, 1);
        assert!(!config.solver.plant_feet);
        assert_eq!(config.solver.seed, Some(7));
        assert_eq!(config.left_arm.shoulder_rotation_mode, ShoulderRotationMode::FromTo);
        assert_eq!(config.left_arm.wrist_to_palm_axis, -Vec3::X);
        assert_eq!(config.left_arm.stretch_curve.keys.len(), 2);
        assert_eq!(config.right_arm.shoulder_rotation_mode, ShoulderRotationMode::YawPitch);
        assert_eq!(config.locomotion.step_interpolation, InterpolationMode::InOutQuintic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = SolverConfig::default();
        config.spine.pelvis_position_weight = 0.5;
        config.solver.plant_feet = false;
        let text = config.to_toml().unwrap();
        let parsed = SolverConfig::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = SolverConfig::from_file("no/such/bodyik.toml").unwrap_err();
        assert!(
            matches!(err, IkError::Config(ConfigError::ReadFile(ref msg)) if msg.contains("bodyik.toml")),
            "unexpected error: {}",
            err
        );
    }

    #[test]
    fn test_clamped_weights() {
        let leg = LegSettings {
            position_weight: 2.0,
            rotation_weight: -1.0,
            bend_to_target_weight: f32::NAN,
            ..Default::default()
        };
        let clamped = leg.clamped();
        assert_eq!(clamped.position_weight, 1.0);
        assert_eq!(clamped.rotation_weight, 0.0);
        assert_eq!(clamped.bend_to_target_weight, 0.0);
    }
}
