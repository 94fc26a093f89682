//! Easing functions for footstep interpolation and damping.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Easing curve applied to a normalized time `t ∈ [0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMode {
    None,
    InOutCubic,
    InOutQuintic,
    InOutSine,
    InQuintic,
    InQuartic,
    InCubic,
    InQuadratic,
    InElastic,
    InElasticSmall,
    InElasticBig,
    InSine,
    InBack,
    OutQuintic,
    OutQuartic,
    OutCubic,
    OutInCubic,
    OutInQuartic,
    OutElastic,
    OutElasticSmall,
    OutElasticBig,
    OutSine,
    OutBack,
    OutBackCubic,
    OutBackQuartic,
    BackInCubic,
    BackInQuartic,
}

impl Default for InterpolationMode {
    fn default() -> Self {
        Self::InOutSine
    }
}

impl InterpolationMode {
    pub const ALL: [InterpolationMode; 27] = [
        Self::None,
        Self::InOutCubic,
        Self::InOutQuintic,
        Self::InOutSine,
        Self::InQuintic,
        Self::InQuartic,
        Self::InCubic,
        Self::InQuadratic,
        Self::InElastic,
        Self::InElasticSmall,
        Self::InElasticBig,
        Self::InSine,
        Self::InBack,
        Self::OutQuintic,
        Self::OutQuartic,
        Self::OutCubic,
        Self::OutInCubic,
        Self::OutInQuartic,
        Self::OutElastic,
        Self::OutElasticSmall,
        Self::OutElasticBig,
        Self::OutSine,
        Self::OutBack,
        Self::OutBackCubic,
        Self::OutBackQuartic,
        Self::BackInCubic,
        Self::BackInQuartic,
    ];

    /// Evaluate the easing at `t`. Values outside [0, 1] are not clamped, so
    /// overshooting curves can be sampled freely.
    pub fn eval(&self, t: f32) -> f32 {
        let ts = t * t;
        let tc = ts * t;
        match self {
            Self::None => t,
            Self::InOutCubic => -2.0 * tc + 3.0 * ts,
            Self::InOutQuintic => 6.0 * tc * ts - 15.0 * ts * ts + 10.0 * tc,
            Self::InOutSine => -0.5 * ((PI * t).cos() - 1.0),
            Self::InQuintic => tc * ts,
            Self::InQuartic => ts * ts,
            Self::InCubic => tc,
            Self::InQuadratic => ts,
            Self::InElasticSmall => 33.0 * tc * ts - 59.0 * ts * ts + 32.0 * tc - 5.0 * ts,
            Self::InElasticBig => 56.0 * tc * ts - 105.0 * ts * ts + 60.0 * tc - 10.0 * ts,
            Self::InSine => 1.0 - (t * PI * 0.5).cos(),
            Self::InBack => {
                let s = 1.70158;
                ts * ((s + 1.0) * t - s)
            }
            Self::OutQuintic => tc * ts - 5.0 * ts * ts + 10.0 * tc - 10.0 * ts + 5.0 * t,
            Self::OutQuartic => -ts * ts + 4.0 * tc - 6.0 * ts + 4.0 * t,
            Self::OutCubic => tc - 3.0 * ts + 3.0 * t,
            Self::OutInCubic => 4.0 * tc - 6.0 * ts + 3.0 * t,
            Self::OutInQuartic => 6.0 * tc - 9.0 * ts + 4.0 * t,
            Self::OutElasticSmall => 33.0 * tc * ts - 106.0 * ts * ts + 126.0 * tc - 67.0 * ts + 15.0 * t,
            Self::OutElasticBig => 56.0 * tc * ts - 175.0 * ts * ts + 200.0 * tc - 100.0 * ts + 20.0 * t,
            // Both elastic modes share the decaying out-elastic shape
            Self::InElastic | Self::OutElastic => out_elastic(t),
            Self::OutSine => (t * PI * 0.5).sin(),
            Self::OutBack => {
                let s = 1.70158;
                let t = t - 1.0;
                t * t * ((s + 1.0) * t + s) + 1.0
            }
            Self::OutBackCubic => 4.0 * tc - 9.0 * ts + 6.0 * t,
            Self::OutBackQuartic => -2.0 * ts * ts + 10.0 * tc - 15.0 * ts + 8.0 * t,
            Self::BackInCubic => 4.0 * tc - 3.0 * ts,
            Self::BackInQuartic => 2.0 * ts * ts + 2.0 * tc - 3.0 * ts,
        }
    }

    pub fn from_str(s: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::InOutCubic => "in_out_cubic",
            Self::InOutQuintic => "in_out_quintic",
            Self::InOutSine => "in_out_sine",
            Self::InQuintic => "in_quintic",
            Self::InQuartic => "in_quartic",
            Self::InCubic => "in_cubic",
            Self::InQuadratic => "in_quadratic",
            Self::InElastic => "in_elastic",
            Self::InElasticSmall => "in_elastic_small",
            Self::InElasticBig => "in_elastic_big",
            Self::InSine => "in_sine",
            Self::InBack => "in_back",
            Self::OutQuintic => "out_quintic",
            Self::OutQuartic => "out_quartic",
            Self::OutCubic => "out_cubic",
            Self::OutInCubic => "out_in_cubic",
            Self::OutInQuartic => "out_in_quartic",
            Self::OutElastic => "out_elastic",
            Self::OutElasticSmall => "out_elastic_small",
            Self::OutElasticBig => "out_elastic_big",
            Self::OutSine => "out_sine",
            Self::OutBack => "out_back",
            Self::OutBackCubic => "out_back_cubic",
            Self::OutBackQuartic => "out_back_quartic",
            Self::BackInCubic => "back_in_cubic",
            Self::BackInQuartic => "back_in_quartic",
        }
    }
}

fn out_elastic(t: f32) -> f32 {
    if t == 0.0 {
        return 0.0;
    }
    if t == 1.0 {
        return 1.0;
    }
    let p = 0.3;
    let s = p / 4.0;
    2f32.powf(-10.0 * t) * ((t - s) * (2.0 * PI) / p).sin() + 1.0
}
