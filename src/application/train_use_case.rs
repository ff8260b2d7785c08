// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one fine-tuning run in order:
//
//   Step 1: Load CIFAR train/test splits   (Layer 4 - data)
//   Step 2: Build the ViT for the classes  (Layer 5 - ml)
//   Step 3: Load pretrained weights        (Layer 6 - infra, Layer 5)
//   Step 4: Freeze the backbone            (Layer 5 - ml)
//   Step 5: Build the batch loaders        (Layer 4 - data)
//   Step 6: Build AdamW + schedule + scaler (Layer 5 - ml)
//   Step 7: Run the epoch loop             (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::{Context, Result};
use burn::{nn::Linear, prelude::*};
use serde::{Deserialize, Serialize};

use crate::data::{
    augment::Augmentation,
    dataset::CifarDataset,
    loader::{BatchLoader, LoaderConfig},
};
use crate::domain::dataset_kind::{DatasetKind, Split};
use crate::infra::{
    hub::resolve_weights,
    metrics::{MetricsAccumulator, MetricsLogger},
};
use crate::ml::{
    arch::{ModelAdapter, VitArch},
    optim::{adamw_config, OptimizationDriver},
    precision::GradScaler,
    pretrained::load_pretrained,
    schedule::WarmupCosineSchedule,
    trainer::{Trainer, TrainerOptions},
};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

// ─── Training Configuration ──────────────────────────────────────────────────
// Every knob of a run. Serialisable so the effective settings can
// be logged as JSON at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epoch:          usize,
    pub batch_size:     usize,
    pub lr:             f64,
    pub weight_decay:   f32,
    pub warmup_t:       usize,
    pub warmup_lr_init: f64,
    pub min_lr:         f64,
    pub dataset:        DatasetKind,
    pub amp:            bool,
    pub arch:           VitArch,
    pub data_dir:       PathBuf,
    /// Local safetensors file; the hub checkpoint is used when absent
    pub weights:        Option<PathBuf>,
    pub smoothing:      Option<f32>,
    pub num_workers:    usize,
    pub seed:           Option<u64>,
    pub metrics_csv:    Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epoch:          10,
            batch_size:     32,
            lr:             1e-4,
            weight_decay:   0.05,
            warmup_t:       5,
            warmup_lr_init: 1e-5,
            min_lr:         0.0,
            dataset:        DatasetKind::Cifar10,
            amp:            false,
            arch:           VitArch::Tiny,
            data_dir:       PathBuf::from("./data"),
            weights:        None,
            smoothing:      None,
            num_workers:    8,
            seed:           None,
            metrics_csv:    None,
        }
    }
}

impl TrainConfig {
    pub fn schedule(&self) -> WarmupCosineSchedule {
        WarmupCosineSchedule::new(self.lr, self.min_lr, self.warmup_t, self.warmup_lr_init, self.epoch)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.batch_size > 0, "--batch_size must be positive");
        anyhow::ensure!(self.lr > 0.0, "--lr must be positive");
        if let Some(s) = self.smoothing {
            anyhow::ensure!((0.0..1.0).contains(&s), "--smoothing must be in [0, 1)");
        }
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full fine-tuning run and return its metrics.
    pub fn execute(&self) -> Result<MetricsAccumulator> {
        let cfg   = &self.config;
        let start = Instant::now();
        cfg.validate()?;
        tracing::info!("Config: {}", serde_json::to_string(cfg)?);

        if let Some(seed) = cfg.seed {
            MyBackend::seed(seed);
        }

        // ── Step 1: Datasets ─────────────────────────────────────────────────
        let train_ds = CifarDataset::load(&cfg.data_dir, cfg.dataset, Split::Train, true)?;
        let test_ds  = CifarDataset::load(&cfg.data_dir, cfg.dataset, Split::Test, true)?;
        let classes  = train_ds.num_classes();

        println!("{:?}", train_ds.class_names());
        println!("Class: {}", classes);

        // ── Steps 2-4: Model ─────────────────────────────────────────────────
        let device    = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        let vit_cfg   = cfg.arch.config(classes);
        let model     = vit_cfg.init::<MyBackend>(&device);

        let weights   = resolve_weights(cfg.arch.hub_repo(), cfg.weights.as_deref())?;
        let (model, head_source) = load_pretrained(model, &weights, &device)?;
        tracing::info!("{} ready, head: {:?}", cfg.arch, head_source);

        let (model, counts) = ModelAdapter.adapt(model);
        println!("Total number of trainable parameters: {}", counts.trainable);

        // ── Step 5: Loaders ──────────────────────────────────────────────────
        let side = vit_cfg.image_size;
        let mut train_loader = BatchLoader::new(
            Arc::new(train_ds),
            Arc::new(Augmentation::train(side)),
            LoaderConfig::train(cfg.batch_size, cfg.num_workers, cfg.seed),
        )
        .context("Cannot build the training loader (check --batch_size)")?;
        let mut test_loader = BatchLoader::new(
            Arc::new(test_ds),
            Arc::new(Augmentation::test(side)),
            LoaderConfig::test(cfg.batch_size, cfg.num_workers),
        )?;

        // ── Step 6: Optimization ─────────────────────────────────────────────
        let optim  = adamw_config(cfg.weight_decay).init::<MyBackend, Linear<MyBackend>>();
        let scaler = cfg.amp.then(GradScaler::default);
        let driver = OptimizationDriver::new(optim, cfg.schedule(), scaler);

        let opts = TrainerOptions { amp: cfg.amp, smoothing: cfg.smoothing };
        let mut trainer = Trainer::new(model, driver, opts, device);

        // ── Step 7: Epoch loop ───────────────────────────────────────────────
        let logger = cfg
            .metrics_csv
            .as_ref()
            .map(MetricsLogger::new)
            .transpose()
            .context("Cannot open metrics CSV")?;

        let metrics = trainer.run(
            &mut train_loader,
            &mut test_loader,
            cfg.epoch,
            MetricsAccumulator::new(),
            logger.as_ref(),
        )?;

        if let Some((epoch, acc)) = metrics.best_test_acc() {
            tracing::info!("Best test accuracy {:.2}% at epoch {}", acc * 100.0, epoch);
        }
        println!("Elapsed time is {:.2}s", start.elapsed().as_secs_f64());
        Ok(metrics)
    }
}
