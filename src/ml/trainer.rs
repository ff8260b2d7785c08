// ============================================================
// Layer 5 — Epoch Loop
// ============================================================
// INIT → (TRAIN pass → TEST pass) × epochs → DONE
//
// TRAIN pass, per batch:
//   frozen backbone (inner backend, no tape) → features
//   [--amp] round features through f16
//   head (autodiff backend) → logits → cross-entropy
//   OptimizationDriver::step → new head
//
// TEST pass, per batch:
//   backbone + head.valid() on the inner backend, plain
//   cross-entropy, no gradients
//
// After both passes:
//   loss     = loss sum / number of batches
//   accuracy = correct predictions / dataset size
//
// Key Burn insight:
//   - The backbone never changes, so it is moved to the inner
//     backend once with valid() and reused for both passes
//   - Tensor::from_inner hands features to the autodiff backend
//     as leaves, so the tape starts at the head
//   - argmax(1) returns [batch, 1] so we flatten before .equal()
//
// Reference: Burn Book §5

use anyhow::Result;
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::{
        loss::{CrossEntropyLoss, CrossEntropyLossConfig},
        Linear,
    },
    optim::Optimizer,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    loader::BatchLoader,
};
use crate::domain::sample::RawImage;
use crate::infra::metrics::{EpochMetrics, MetricsAccumulator, MetricsLogger};
use crate::ml::{
    model::{VisionTransformer, VitBackbone},
    optim::{OptimizationDriver, StepOutcome},
    precision::round_to_half,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TrainerOptions {
    /// Carry backbone features at half precision and scale the loss
    pub amp:       bool,
    /// Label smoothing for the training loss
    pub smoothing: Option<f32>,
}

/// Sums over one pass of a loader.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassStats {
    pub loss_sum: f64,
    pub batches:  usize,
    pub correct:  usize,
    pub samples:  usize,
    /// Optimizer steps skipped for overflow (train pass only)
    pub skipped:  usize,
}

impl PassStats {
    pub fn mean_loss(&self) -> f64 {
        if self.batches > 0 { self.loss_sum / self.batches as f64 } else { f64::NAN }
    }

    /// Correct predictions over `dataset_len`, not over samples seen.
    pub fn accuracy(&self, dataset_len: usize) -> f64 {
        if dataset_len > 0 { self.correct as f64 / dataset_len as f64 } else { 0.0 }
    }
}

pub struct Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Linear<B>, B>,
{
    backbone: VitBackbone<B::InnerBackend>,
    head:     Linear<B>,
    driver:   OptimizationDriver<B, O>,
    loss:     CrossEntropyLoss<B>,
    opts:     TrainerOptions,
    device:   B::Device,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Linear<B>, B>,
{
    pub fn new(
        model:  VisionTransformer<B>,
        driver: OptimizationDriver<B, O>,
        opts:   TrainerOptions,
        device: B::Device,
    ) -> Self {
        let loss = CrossEntropyLossConfig::new()
            .with_smoothing(opts.smoothing)
            .init(&device);
        tracing::debug!(
            "Trainer: {}-dim features → {} classes, amp={}",
            model.backbone.embed_dim(), model.num_classes(), opts.amp,
        );
        Self {
            backbone: model.backbone.valid(),
            head:     model.head,
            driver,
            loss,
            opts,
            device,
        }
    }

    /// Run every epoch, appending one entry per epoch to `metrics`.
    pub fn run<DT, DE>(
        &mut self,
        train:   &mut BatchLoader<DT>,
        test:    &mut BatchLoader<DE>,
        epochs:  usize,
        mut metrics: MetricsAccumulator,
        logger:  Option<&MetricsLogger>,
    ) -> Result<MetricsAccumulator>
    where
        DT: Dataset<RawImage> + 'static,
        DE: Dataset<RawImage> + 'static,
    {
        tracing::info!(
            "Starting {} epochs: {} train batches, {} test batches",
            epochs, train.num_batches(), test.num_batches(),
        );

        for epoch in 0..epochs {
            let lr = self.driver.set_epoch(epoch);

            let train_stats = self.train_epoch(train)?;
            let test_stats  = self.evaluate(test)?;

            let m = EpochMetrics::new(
                epoch + 1,
                lr,
                train_stats.mean_loss(),
                train_stats.accuracy(train.dataset_len()),
                test_stats.mean_loss(),
                test_stats.accuracy(test.dataset_len()),
            );
            metrics.push(&m);

            println!(
                "Epoch {:>3}/{} | lr={:.2e} | train_loss={:.4} | train_acc={:.2}% | test_loss={:.4} | test_acc={:.2}%",
                m.epoch, epochs, m.lr,
                m.train_loss, m.train_acc * 100.0,
                m.test_loss, m.test_acc * 100.0,
            );
            if train_stats.skipped > 0 {
                tracing::info!("Epoch {}: {} steps skipped for gradient overflow", m.epoch, train_stats.skipped);
            }

            if let Some(logger) = logger {
                logger.log(&m)?;
            }
        }

        tracing::info!("Training complete! {} optimizer steps", self.driver.steps());
        if let Some(scaler) = self.driver.scaler() {
            tracing::info!("Loss scale {:.0}, {} steps skipped", scaler.scale(), scaler.skipped_steps());
        }
        Ok(metrics)
    }

    /// One training traversal with an optimizer step per batch.
    pub fn train_epoch<D>(&mut self, loader: &mut BatchLoader<D>) -> Result<PassStats>
    where
        D: Dataset<RawImage> + 'static,
    {
        let batcher   = ImageBatcher::<B::InnerBackend>::new(self.device.clone());
        let mut stats = PassStats::default();

        for items in loader.iter() {
            let batch: ImageBatch<B::InnerBackend> = batcher.batch(items?);
            let n = batch.len();

            let features = self.backbone.forward(batch.images);
            let features = if self.opts.amp { round_to_half(features) } else { features };

            let labels = Tensor::<B, 1, Int>::from_inner(batch.labels.clone());
            let logits = self.head.forward(Tensor::from_inner(features));
            let loss   = self.loss.forward(logits.clone(), labels);

            stats.loss_sum += loss.clone().into_scalar().elem::<f64>();
            stats.correct  += count_correct(logits.inner(), batch.labels);
            stats.batches  += 1;
            stats.samples  += n;

            let (head, outcome) = self.driver.step(self.head.clone(), loss);
            self.head = head;
            if outcome == StepOutcome::SkippedOverflow {
                stats.skipped += 1;
            }
        }

        tracing::debug!("Train pass: {} batches, {} samples", stats.batches, stats.samples);
        Ok(stats)
    }

    /// One test traversal on the inner backend.
    pub fn evaluate<D>(&self, loader: &mut BatchLoader<D>) -> Result<PassStats>
    where
        D: Dataset<RawImage> + 'static,
    {
        let model   = self.valid_model();
        let batcher = ImageBatcher::<B::InnerBackend>::new(self.device.clone());
        let ce      = CrossEntropyLossConfig::new().init::<B::InnerBackend>(&self.device);
        let mut stats = PassStats::default();

        for items in loader.iter() {
            let batch  = batcher.batch(items?);
            let n      = batch.len();
            let logits = model.forward(batch.images);

            stats.loss_sum += ce
                .forward(logits.clone(), batch.labels.clone())
                .into_scalar()
                .elem::<f64>();
            stats.correct += count_correct(logits, batch.labels);
            stats.batches += 1;
            stats.samples += n;
        }

        tracing::debug!("Test pass: {} batches, {} samples", stats.batches, stats.samples);
        Ok(stats)
    }

    /// Current model on the inner backend.
    pub fn valid_model(&self) -> VisionTransformer<B::InnerBackend> {
        VisionTransformer {
            backbone: self.backbone.clone(),
            head:     self.head.valid(),
        }
    }

    pub fn driver(&self) -> &OptimizationDriver<B, O> {
        &self.driver
    }
}

/// Number of rows whose argmax equals the label.
fn count_correct<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns shape [batch, 1]
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{augment::Augmentation, loader::LoaderConfig};
    use crate::domain::sample::CIFAR_PIXELS;
    use crate::ml::{
        model::tests::tiny_config,
        optim::adamw_config,
        precision::GradScaler,
        schedule::WarmupCosineSchedule,
    };
    use burn::{
        backend::{Autodiff, NdArray},
        data::dataset::InMemDataset,
    };
    use std::sync::Arc;

    type TB = Autodiff<NdArray>;

    const CLASSES: usize = 4;

    fn dataset(n: usize, offset: usize) -> Arc<InMemDataset<RawImage>> {
        let items = (0..n)
            .map(|i| {
                let label  = i % CLASSES;
                let pixels = (0..CIFAR_PIXELS).map(|p| ((p * (label + 1) + i + offset) % 256) as u8).collect();
                RawImage::new(pixels, label)
            })
            .collect();
        Arc::new(InMemDataset::new(items))
    }

    fn loaders(seed: u64) -> (BatchLoader<InMemDataset<RawImage>>, BatchLoader<InMemDataset<RawImage>>) {
        let train = BatchLoader::new(
            dataset(12, 0),
            Arc::new(Augmentation::train(32)),
            LoaderConfig::train(5, 2, Some(seed)),
        )
        .unwrap();
        let test = BatchLoader::new(
            dataset(7, 100),
            Arc::new(Augmentation::test(32)),
            LoaderConfig::test(5, 2),
        )
        .unwrap();
        (train, test)
    }

    fn trainer(
        model: VisionTransformer<TB>,
        amp:   bool,
    ) -> Trainer<TB, impl Optimizer<Linear<TB>, TB>> {
        let schedule = WarmupCosineSchedule::new(1e-3, 0.0, 1, 1e-4, 2);
        let scaler   = amp.then(GradScaler::default);
        let driver   = OptimizationDriver::new(adamw_config(0.05).init::<TB, Linear<TB>>(), schedule, scaler);
        Trainer::new(model, driver, TrainerOptions { amp, smoothing: None }, Default::default())
    }

    fn frozen_model() -> VisionTransformer<TB> {
        let model = tiny_config(CLASSES).init::<TB>(&Default::default());
        crate::ml::arch::ModelAdapter.adapt(model).0
    }

    #[test]
    fn test_one_epoch_appends_one_entry() {
        let (mut train, mut test) = loaders(7);
        let mut t   = trainer(frozen_model(), false);
        let metrics = t.run(&mut train, &mut test, 1, MetricsAccumulator::new(), None).unwrap();

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics.test_accs.len(), 1);
        for acc in [metrics.train_accs[0], metrics.test_accs[0]] {
            assert!((0.0..=1.0).contains(&acc));
        }
        assert!(metrics.train_losses[0] >= 0.0);
        assert!(metrics.test_losses[0] >= 0.0);
    }

    #[test]
    fn test_train_pass_drops_partial_batch_but_divides_by_dataset() {
        let (mut train, mut test) = loaders(3);
        let mut t = trainer(frozen_model(), false);

        let stats = t.train_epoch(&mut train).unwrap();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.samples, 10);
        assert!(stats.accuracy(train.dataset_len()) <= 10.0 / 12.0);

        let stats = t.evaluate(&mut test).unwrap();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.samples, 7);
    }

    #[test]
    fn test_training_moves_head_only() {
        let (mut train, _) = loaders(1);
        let model          = frozen_model();
        let head_before: Vec<f32>     = model.head.weight.val().into_data().iter::<f32>().collect();
        let backbone_before: Vec<f32> = model.backbone.blocks[0].mlp.fc1.weight.val().into_data().iter::<f32>().collect();

        let mut t = trainer(model, false);
        t.train_epoch(&mut train).unwrap();
        assert_eq!(t.driver().steps(), 2);

        let after = t.valid_model();
        let head_after: Vec<f32>     = after.head.weight.val().into_data().iter::<f32>().collect();
        let backbone_after: Vec<f32> = after.backbone.blocks[0].mlp.fc1.weight.val().into_data().iter::<f32>().collect();
        assert_ne!(head_after, head_before);
        assert_eq!(backbone_after, backbone_before);
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let model = frozen_model();
        let run   = |model: VisionTransformer<TB>| {
            let (mut train, mut test) = loaders(42);
            trainer(model, false)
                .run(&mut train, &mut test, 2, MetricsAccumulator::new(), None)
                .unwrap()
        };
        let a = run(model.clone());
        let b = run(model);
        assert_eq!(a, b);
    }

    #[test]
    fn test_amp_run_stays_finite() {
        let (mut train, mut test) = loaders(5);
        let mut t   = trainer(frozen_model(), true);
        let metrics = t.run(&mut train, &mut test, 1, MetricsAccumulator::new(), None).unwrap();

        assert!(metrics.train_losses[0].is_finite());
        assert!(metrics.test_losses[0].is_finite());
        assert_eq!(t.driver().scaler().unwrap().skipped_steps(), 0);
    }

    #[test]
    fn test_metrics_csv_gets_a_row_per_epoch() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path().join("m.csv")).unwrap();
        let (mut train, mut test) = loaders(9);

        trainer(frozen_model(), false)
            .run(&mut train, &mut test, 2, MetricsAccumulator::new(), Some(&logger))
            .unwrap();

        let text = std::fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    /// Claims one more sample than it can return.
    struct TruncatedDataset(InMemDataset<RawImage>);

    impl Dataset<RawImage> for TruncatedDataset {
        fn get(&self, index: usize) -> Option<RawImage> { self.0.get(index) }

        fn len(&self) -> usize { self.0.len() + 1 }
    }

    #[test]
    fn test_loader_failure_aborts_the_run() {
        let (_, mut test) = loaders(4);
        let inner     = InMemDataset::new(dataset(9, 0).iter().collect());
        let mut train = BatchLoader::new(
            Arc::new(TruncatedDataset(inner)),
            Arc::new(Augmentation::test(32)),
            LoaderConfig::test(5, 1),
        )
        .unwrap();

        let mut t = trainer(frozen_model(), false);
        let err   = t.run(&mut train, &mut test, 1, MetricsAccumulator::new(), None).unwrap_err();
        assert!(err.to_string().contains("index 9"));
        assert_eq!(t.driver().steps(), 1);
    }

    #[test]
    fn test_count_correct() {
        let device = Default::default();
        let logits = Tensor::<NdArray, 2>::from_floats([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]], &device);
        let labels = Tensor::<NdArray, 1, Int>::from_ints([1, 1, 1], &device);
        assert_eq!(count_correct(logits, labels), 2);
    }
}
