// ============================================================
// Layer 5 — Optimization Driver
// ============================================================
// Owns everything that changes trainable weights:
//
//   AdamW over the head        (β1 0.9, β2 0.999, ε 1e-8,
//                               decoupled weight decay)
//   WarmupCosineSchedule       epoch → learning rate
//   GradScaler (optional)      dynamic loss scaling for --amp
//
// One call to step() per batch:
//
//   loss ──(· scale)──▶ backward ──▶ head grads
//        ──(/ scale)──▶ finite? ──yes──▶ AdamW update
//                           └──no───▶ skip, back off scale
//
// Reference: Loshchilov & Hutter (2019) Decoupled Weight Decay

use burn::{
    nn::Linear,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::ml::{
    precision::{all_finite, GradScaler},
    schedule::WarmupCosineSchedule,
};

/// What happened to the weights on one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// Non-finite gradients under loss scaling; weights unchanged
    SkippedOverflow,
}

pub fn adamw_config(weight_decay: f32) -> AdamWConfig {
    AdamWConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
        .with_weight_decay(weight_decay)
}

pub struct OptimizationDriver<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Linear<B>, B>,
{
    optim:    O,
    schedule: WarmupCosineSchedule,
    scaler:   Option<GradScaler>,
    lr:       f64,
    steps:    usize,
    _backend: std::marker::PhantomData<B>,
}

impl<B, O> OptimizationDriver<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Linear<B>, B>,
{
    pub fn new(optim: O, schedule: WarmupCosineSchedule, scaler: Option<GradScaler>) -> Self {
        Self {
            optim,
            lr: schedule.lr(0),
            schedule,
            scaler,
            steps: 0,
            _backend: std::marker::PhantomData,
        }
    }

    /// Set the learning rate for 0-based `epoch`; returns it.
    pub fn set_epoch(&mut self, epoch: usize) -> f64 {
        self.lr = self.schedule.lr(epoch);
        tracing::debug!("Epoch {} learning rate {:.3e}", epoch, self.lr);
        self.lr
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Optimizer updates applied so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn scaler(&self) -> Option<&GradScaler> {
        self.scaler.as_ref()
    }

    /// Backpropagate `loss` into `head` and update it.
    pub fn step(&mut self, head: Linear<B>, loss: Tensor<B, 1>) -> (Linear<B>, StepOutcome) {
        let Some(scaler) = self.scaler.as_mut() else {
            let grads = GradientsParams::from_grads(loss.backward(), &head);
            self.steps += 1;
            return (self.optim.step(self.lr, head, grads), StepOutcome::Applied);
        };

        let scale = scaler.scale();
        let grads = loss.mul_scalar(scale).backward();
        let mut grads = GradientsParams::from_grads(grads, &head);

        let (grads, finite) = unscale_head(&head, &mut grads, scale);
        scaler.update(!finite);

        if !finite {
            return (head, StepOutcome::SkippedOverflow);
        }
        self.steps += 1;
        (self.optim.step(self.lr, head, grads), StepOutcome::Applied)
    }
}

/// Divide the head's gradients by `scale` and report whether all are finite.
fn unscale_head<B: AutodiffBackend>(
    head:  &Linear<B>,
    grads: &mut GradientsParams,
    scale: f64,
) -> (GradientsParams, bool) {
    let mut out    = GradientsParams::new();
    let mut finite = true;

    let weight_id = head.weight.id;
    if let Some(g) = grads.remove::<B::InnerBackend, 2>(weight_id) {
        let g = g.div_scalar(scale);
        finite &= all_finite(g.clone());
        out.register(weight_id, g);
    }
    if let Some(bias) = &head.bias {
        if let Some(g) = grads.remove::<B::InnerBackend, 1>(bias.id) {
            let g = g.div_scalar(scale);
            finite &= all_finite(g.clone());
            out.register(bias.id, g);
        }
    }
    (out, finite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::precision::GradScalerConfig;
    use approx::assert_relative_eq;
    use burn::{
        backend::{Autodiff, NdArray},
        nn::LinearConfig,
    };

    type TB = Autodiff<NdArray>;

    fn driver(scaler: Option<GradScaler>) -> OptimizationDriver<TB, impl Optimizer<Linear<TB>, TB>> {
        let schedule = WarmupCosineSchedule::new(1e-2, 0.0, 2, 1e-3, 6);
        OptimizationDriver::new(adamw_config(0.05).init::<TB, Linear<TB>>(), schedule, scaler)
    }

    fn loss_of(head: &Linear<TB>, scale: f32) -> Tensor<TB, 1> {
        let device = Default::default();
        let x = Tensor::<TB, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device).mul_scalar(scale);
        head.forward(x).powf_scalar(2.0).mean()
    }

    fn weights(head: &Linear<TB>) -> Vec<f32> {
        head.weight.val().into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_set_epoch_follows_schedule() {
        let mut d = driver(None);
        assert_relative_eq!(d.lr(), 1e-3);
        assert_relative_eq!(d.set_epoch(2), 1e-2);
        assert_relative_eq!(d.lr(), 1e-2);
    }

    #[test]
    fn test_step_updates_head() {
        let device  = Default::default();
        let head    = LinearConfig::new(2, 3).init::<TB>(&device);
        let before  = weights(&head);
        let mut d   = driver(None);

        let loss            = loss_of(&head, 1.0);
        let (head, outcome) = d.step(head, loss);
        assert_eq!(outcome, StepOutcome::Applied);
        assert_eq!(d.steps(), 1);
        assert_ne!(weights(&head), before);
    }

    #[test]
    fn test_scaled_step_matches_unscaled_step() {
        let device = Default::default();
        let head   = LinearConfig::new(2, 3).init::<TB>(&device);

        let (plain, _)  = driver(None).step(head.clone(), loss_of(&head, 1.0));
        let scaler      = GradScaler::new(GradScalerConfig { init_scale: 1024.0, ..Default::default() });
        let (scaled, o) = driver(Some(scaler)).step(head.clone(), loss_of(&head, 1.0));

        assert_eq!(o, StepOutcome::Applied);
        for (a, b) in weights(&plain).into_iter().zip(weights(&scaled)) {
            assert_relative_eq!(a, b, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_overflow_skips_step_and_backs_off() {
        let device = Default::default();
        let head   = LinearConfig::new(2, 3).init::<TB>(&device);
        let before = weights(&head);
        let mut d  = driver(Some(GradScaler::default()));

        // squares of ~1e20 overflow f32
        let loss            = loss_of(&head, 1e20);
        let (head, outcome) = d.step(head, loss);

        assert_eq!(outcome, StepOutcome::SkippedOverflow);
        assert_eq!(weights(&head), before);
        assert_eq!(d.steps(), 0);
        let scaler = d.scaler().unwrap();
        assert_eq!(scaler.scale(), 32768.0);
        assert_eq!(scaler.skipped_steps(), 1);
    }
}
