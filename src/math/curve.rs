//! Piecewise-linear keyframe curves (stretch, step height, heel height).

use serde::{Deserialize, Serialize};

/// A single curve key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
}

impl Keyframe {
    pub const fn new(time: f32, value: f32) -> Self {
        Self { time, value }
    }
}

/// Keys sorted by time, evaluated with linear interpolation.
///
/// An empty curve evaluates to 0 everywhere. Outside the key range the curve
/// holds its first/last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FloatCurve {
    pub keys: Vec<Keyframe>,
}

impl FloatCurve {
    pub fn new(keys: Vec<Keyframe>) -> Self {
        Self { keys }
    }

    /// Three-key bump `0 → peak → 0` over `t ∈ [0, 1]`.
    pub fn bump(peak: f32) -> Self {
        Self::new(vec![
            Keyframe::new(0.0, 0.0),
            Keyframe::new(0.5, peak),
            Keyframe::new(1.0, 0.0),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True when key times never decrease.
    pub fn is_sorted(&self) -> bool {
        self.keys.windows(2).all(|w| w[0].time <= w[1].time)
    }

    pub fn evaluate(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 0.0;
        };
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        // Last segment whose start is at or before t
        let index = self
            .keys
            .windows(2)
            .rposition(|w| t >= w[0].time)
            .unwrap_or(0);
        let (a, b) = (self.keys[index], self.keys[index + 1]);

        let span = b.time - a.time;
        let s = if span <= 0.0 { 1.0 } else { (t - a.time) / span };
        a.value + (b.value - a.value) * s
    }
}
