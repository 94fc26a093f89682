//! Tracking presets: which targets a tracking setup provides and the solver
//! weights that go with it.

use serde::{Deserialize, Serialize};

use crate::config::SolverConfig;
use crate::solver::Targets;

/// Common tracker setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingPreset {
    /// Head, hands and feet
    FiveTarget,
    /// Five targets plus the pelvis
    SixTarget,
    /// Six targets plus elbow and knee bend goals
    TenTarget,
    /// Ten targets plus the chest goal
    AllTarget,
}

/// Tunables the presets expose.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetOptions {
    /// Used by [`TrackingPreset::FiveTarget`], which has no pelvis to lean on
    pub body_pos_stiffness: f32,
    pub body_rot_stiffness: f32,
    pub maintain_pelvis_position: f32,
    /// Used by [`TrackingPreset::TenTarget`]
    pub elbow_bend_goal_weight: f32,
    pub knee_bend_goal_weight: f32,
}

impl Default for PresetOptions {
    fn default() -> Self {
        Self {
            body_pos_stiffness: 0.55,
            body_rot_stiffness: 0.1,
            maintain_pelvis_position: 0.2,
            elbow_bend_goal_weight: 1.0,
            knee_bend_goal_weight: 1.0,
        }
    }
}

impl TrackingPreset {
    pub const ALL: [TrackingPreset; 4] = [
        TrackingPreset::FiveTarget,
        TrackingPreset::SixTarget,
        TrackingPreset::TenTarget,
        TrackingPreset::AllTarget,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "five_target" | "five" | "5" => Some(Self::FiveTarget),
            "six_target" | "six" | "6" => Some(Self::SixTarget),
            "ten_target" | "ten" | "10" => Some(Self::TenTarget),
            "all_target" | "all" => Some(Self::AllTarget),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveTarget => "five_target",
            Self::SixTarget => "six_target",
            Self::TenTarget => "ten_target",
            Self::AllTarget => "all_target",
        }
    }

    pub fn has_pelvis(&self) -> bool {
        !matches!(self, Self::FiveTarget)
    }

    pub fn has_bend_goals(&self) -> bool {
        matches!(self, Self::TenTarget | Self::AllTarget)
    }

    pub fn has_chest_goal(&self) -> bool {
        matches!(self, Self::AllTarget)
    }

    pub fn apply(&self, config: &mut SolverConfig) {
        self.apply_with(config, &PresetOptions::default());
    }

    /// Sets the weights this preset solves with. Every preset turns off
    /// plant-feet and procedural stepping, since the feet are tracked.
    pub fn apply_with(&self, config: &mut SolverConfig, options: &PresetOptions) {
        config.solver.plant_feet = false;
        config.locomotion.weight = 0.0;
        config.spine.min_head_height = 0.0;

        config.spine.position_weight = 1.0;
        config.spine.rotation_weight = 1.0;
        let pelvis_weight = if self.has_pelvis() { 1.0 } else { 0.0 };
        config.spine.pelvis_position_weight = pelvis_weight;
        config.spine.pelvis_rotation_weight = pelvis_weight;

        for arm in [&mut config.left_arm, &mut config.right_arm] {
            arm.position_weight = 1.0;
            arm.rotation_weight = 1.0;
        }
        for leg in [&mut config.left_leg, &mut config.right_leg] {
            leg.position_weight = 1.0;
            leg.rotation_weight = 1.0;
        }

        match self {
            Self::FiveTarget => {
                config.spine.body_pos_stiffness = options.body_pos_stiffness;
                config.spine.body_rot_stiffness = options.body_rot_stiffness;
                config.spine.maintain_pelvis_position = options.maintain_pelvis_position;
            }
            Self::SixTarget => {}
            Self::TenTarget => {
                config.left_arm.bend_goal_weight = options.elbow_bend_goal_weight;
                config.right_arm.bend_goal_weight = options.elbow_bend_goal_weight;
                config.left_leg.bend_goal_weight = options.knee_bend_goal_weight;
                config.right_leg.bend_goal_weight = options.knee_bend_goal_weight;
            }
            Self::AllTarget => {
                for arm in [&mut config.left_arm, &mut config.right_arm] {
                    arm.bend_goal_weight = 1.0;
                }
                for leg in [&mut config.left_leg, &mut config.right_leg] {
                    leg.bend_goal_weight = 1.0;
                }
            }
        }
    }

    /// Drops the targets this preset does not track.
    pub fn filter_targets(&self, targets: &Targets) -> Targets {
        let mut filtered = *targets;
        if !self.has_pelvis() {
            filtered.pelvis = None;
        }
        if !self.has_bend_goals() {
            filtered.left_elbow_goal = None;
            filtered.right_elbow_goal = None;
            filtered.left_knee_goal = None;
            filtered.right_knee_goal = None;
        }
        if !self.has_chest_goal() {
            filtered.chest_goal = None;
        }
        filtered
    }
}

impl Default for TrackingPreset {
    fn default() -> Self {
        Self::SixTarget
    }
}
