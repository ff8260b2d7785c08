// ============================================================
// Layer 5 — Mixed Precision
// ============================================================
// Dynamic loss scaling for --amp runs.
//
//   scaled loss = loss · scale        (before backward)
//   grads       = grads / scale       (before the optimizer)
//
//   non-finite grads → skip the step, scale ·= 0.5 (floor 1)
//   2000 clean steps → scale ·= 2
//
// The frozen backbone runs outside the autodiff tape. Under
// --amp its pooled features are rounded to f16 before they
// reach the full-precision head. The rounding goes through host
// memory (into_data → f16 → from_data), so on a GPU backend it
// costs one device round trip of an [N, D] tensor per batch.
//
// Reference: Micikevicius et al. (2018) Mixed Precision Training

use burn::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradScalerConfig {
    pub init_scale:      f64,
    pub growth_factor:   f64,
    pub backoff_factor:  f64,
    pub growth_interval: usize,
    pub min_scale:       f64,
}

impl Default for GradScalerConfig {
    fn default() -> Self {
        Self {
            init_scale:      65536.0,
            growth_factor:   2.0,
            backoff_factor:  0.5,
            growth_interval: 2000,
            min_scale:       1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GradScaler {
    cfg:            GradScalerConfig,
    scale:          f64,
    clean_steps:    usize,
    skipped_steps:  usize,
}

impl GradScaler {
    pub fn new(cfg: GradScalerConfig) -> Self {
        Self { scale: cfg.init_scale, cfg, clean_steps: 0, skipped_steps: 0 }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Steps skipped because of overflow so far.
    pub fn skipped_steps(&self) -> usize {
        self.skipped_steps
    }

    /// Record the outcome of one step and adjust the scale.
    pub fn update(&mut self, found_inf: bool) {
        if found_inf {
            self.scale         = (self.scale * self.cfg.backoff_factor).max(self.cfg.min_scale);
            self.clean_steps   = 0;
            self.skipped_steps += 1;
            tracing::debug!("Gradient overflow, loss scale backed off to {}", self.scale);
            return;
        }

        self.clean_steps += 1;
        if self.clean_steps >= self.cfg.growth_interval {
            self.scale       *= self.cfg.growth_factor;
            self.clean_steps  = 0;
            tracing::debug!("Loss scale grown to {}", self.scale);
        }
    }
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new(GradScalerConfig::default())
    }
}

/// Round a float tensor through f16 and back.
pub fn round_to_half<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    let device = tensor.device();
    let data   = tensor
        .into_data()
        .convert::<half::f16>()
        .convert::<f32>();
    Tensor::from_data(data, &device)
}

/// True when every element of `tensor` is finite.
pub fn all_finite<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> bool {
    let total = tensor.abs().sum().into_scalar().elem::<f64>();
    total.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_default_policy() {
        let s = GradScaler::default();
        assert_eq!(s.scale(), 65536.0);
        assert_eq!(s.skipped_steps(), 0);
    }

    #[test]
    fn test_overflow_backs_off_and_resets_growth() {
        let mut s = GradScaler::new(GradScalerConfig { growth_interval: 3, ..Default::default() });
        s.update(false);
        s.update(false);
        s.update(true);
        assert_eq!(s.scale(), 32768.0);
        assert_eq!(s.skipped_steps(), 1);

        // the counter restarted, so two more clean steps are not enough
        s.update(false);
        s.update(false);
        assert_eq!(s.scale(), 32768.0);
        s.update(false);
        assert_eq!(s.scale(), 65536.0);
    }

    #[test]
    fn test_scale_never_drops_below_minimum() {
        let mut s = GradScaler::new(GradScalerConfig { init_scale: 4.0, ..Default::default() });
        for _ in 0..10 {
            s.update(true);
        }
        assert_eq!(s.scale(), 1.0);
        assert_eq!(s.skipped_steps(), 10);
    }

    #[test]
    fn test_round_to_half_loses_precision() {
        let device = Default::default();
        let t      = Tensor::<NdArray, 1>::from_floats([1.0, 1.0001, 70000.0], &device);
        let r: Vec<f32> = round_to_half(t).into_data().iter::<f32>().collect();
        assert_eq!(r[0], 1.0);
        assert_eq!(r[1], 1.0);
        assert!(r[2].is_infinite());
    }

    #[test]
    fn test_all_finite() {
        let device = Default::default();
        assert!(all_finite(Tensor::<NdArray, 1>::from_floats([1.0, -2.0], &device)));
        assert!(!all_finite(Tensor::<NdArray, 1>::from_floats([1.0, f32::INFINITY], &device)));
        assert!(!all_finite(Tensor::<NdArray, 1>::from_floats([f32::NAN, 0.0], &device)));
    }
}
