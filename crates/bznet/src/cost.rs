//! Training cost: blend of eval regression and win/draw/loss target
//!
//! The target is a point in `[0, 1]`: the engine eval squashed through a
//! sigmoid, mixed with the game outcome. The blend is a tuning knob, not part
//! of the network contract.

use crate::activation::sigmoid;
use crate::error::{NetworkError, Result};

/// Centipawn → win-probability scale applied before the sigmoid.
pub const DEFAULT_SIGMOID_SCALE: f32 = 2.5 / 1024.0;
/// Weight of the game outcome in the blended target.
pub const DEFAULT_WDL_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostFunction {
    sigmoid_scale: f32,
    wdl_weight: f32,
}

impl CostFunction {
    pub fn new(sigmoid_scale: f32, wdl_weight: f32) -> Result<Self> {
        if !(sigmoid_scale.is_finite() && sigmoid_scale > 0.0) {
            return Err(NetworkError::InvalidConfig(format!(
                "sigmoid scale must be finite and > 0, got {sigmoid_scale}"
            )));
        }
        if !(0.0..=1.0).contains(&wdl_weight) {
            return Err(NetworkError::InvalidConfig(format!(
                "wdl weight must be within [0, 1], got {wdl_weight}"
            )));
        }
        Ok(Self {
            sigmoid_scale,
            wdl_weight,
        })
    }

    #[inline]
    pub fn sigmoid_scale(&self) -> f32 {
        self.sigmoid_scale
    }

    #[inline]
    pub fn wdl_weight(&self) -> f32 {
        self.wdl_weight
    }

    /// Blended training target in `[0, 1]`.
    #[inline]
    pub fn target(&self, eval: f32, wdl: f32) -> f32 {
        let eval_target = sigmoid(eval * self.sigmoid_scale);
        (1.0 - self.wdl_weight) * eval_target + self.wdl_weight * wdl
    }

    /// d(cost)/d(prediction) for the squared error against [`Self::target`].
    #[inline]
    pub fn gradient(&self, prediction: f32, eval: f32, wdl: f32) -> f32 {
        2.0 * (prediction - self.target(eval, wdl))
    }

    /// Squared error, reported for monitoring only.
    #[inline]
    pub fn validation_cost(&self, prediction: f32, eval: f32, wdl: f32) -> f32 {
        let diff = prediction - self.target(eval, wdl);
        diff * diff
    }
}

impl Default for CostFunction {
    fn default() -> Self {
        Self {
            sigmoid_scale: DEFAULT_SIGMOID_SCALE,
            wdl_weight: DEFAULT_WDL_WEIGHT,
        }
    }
}
