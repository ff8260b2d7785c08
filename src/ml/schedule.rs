// ============================================================
// Layer 5 — Learning Rate Schedule
// ============================================================
// Epoch-indexed cosine decay with a linear warmup.
//
//   lr
//    │        ┌──╮
//    │       ╱    ╲_
//    │      ╱       ╲__
//    │     ╱           ╲___
//    │    ╱                ╲____
//    └───┴─────┴──────────────────── epoch
//        0  warmup_t            epochs
//
//   t < warmup_t : warmup_lr_init + t·(lr − warmup_lr_init)/warmup_t
//   t ≥ warmup_t : min_lr + ½(lr − min_lr)(1 + cos(π·(t − warmup_t)/decay))
//                  where decay = epochs − warmup_t
//
// Reference: Loshchilov & Hutter (2017) SGDR

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarmupCosineSchedule {
    pub base_lr:        f64,
    pub min_lr:         f64,
    pub warmup_t:       usize,
    pub warmup_lr_init: f64,
    /// Total number of epochs in the run
    pub epochs:         usize,
}

impl WarmupCosineSchedule {
    pub fn new(base_lr: f64, min_lr: f64, warmup_t: usize, warmup_lr_init: f64, epochs: usize) -> Self {
        Self { base_lr, min_lr, warmup_t, warmup_lr_init, epochs }
    }

    /// Learning rate for 0-based `epoch`.
    pub fn lr(&self, epoch: usize) -> f64 {
        if epoch < self.warmup_t {
            let step = (self.base_lr - self.warmup_lr_init) / self.warmup_t as f64;
            return self.warmup_lr_init + epoch as f64 * step;
        }

        let decay = self.epochs.saturating_sub(self.warmup_t);
        if decay == 0 {
            return self.base_lr;
        }

        let progress = ((epoch - self.warmup_t) as f64 / decay as f64).min(1.0);
        self.min_lr + 0.5 * (self.base_lr - self.min_lr) * (1.0 + (PI * progress).cos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn default_schedule() -> WarmupCosineSchedule {
        WarmupCosineSchedule::new(1e-4, 0.0, 5, 1e-5, 10)
    }

    #[test]
    fn test_warmup_endpoints() {
        let s = default_schedule();
        assert_relative_eq!(s.lr(0), 1e-5);
        assert_relative_eq!(s.lr(5), 1e-4);
    }

    #[test]
    fn test_warmup_is_linear() {
        let s = default_schedule();
        let step = (1e-4 - 1e-5) / 5.0;
        for t in 0..5 {
            assert_relative_eq!(s.lr(t), 1e-5 + t as f64 * step, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_cosine_decays_monotonically_towards_min() {
        let s = WarmupCosineSchedule::new(1e-3, 1e-5, 2, 0.0, 12);
        let lrs: Vec<f64> = (2..=12).map(|t| s.lr(t)).collect();
        assert!(lrs.windows(2).all(|w| w[1] < w[0]));
        assert_relative_eq!(s.lr(7), (1e-3 + 1e-5) / 2.0, max_relative = 1e-12);
        assert_relative_eq!(s.lr(12), 1e-5);
        assert_relative_eq!(s.lr(40), 1e-5);
    }

    #[test]
    fn test_no_warmup() {
        let s = WarmupCosineSchedule::new(1e-4, 0.0, 0, 1e-5, 4);
        assert_relative_eq!(s.lr(0), 1e-4);
    }

    #[test]
    fn test_warmup_covering_whole_run_holds_base_lr() {
        let s = WarmupCosineSchedule::new(1e-4, 0.0, 5, 1e-5, 5);
        assert_relative_eq!(s.lr(4), 1e-5 + 4.0 * (1e-4 - 1e-5) / 5.0);
        assert_relative_eq!(s.lr(5), 1e-4);
        assert_relative_eq!(s.lr(6), 1e-4);
    }
}
