// ============================================================
// Layer 1 — CLI Arguments
// ============================================================
// Every flag of a fine-tuning run. Flag names keep their
// underscores (--batch_size, --warmup_t) so existing launch
// scripts keep working.
//
// clap's derive macros generate:
//   - help text (--help)
//   - type conversion (string → usize, f64, DatasetKind, ...)
//   - errors for unknown datasets and architectures, via FromStr
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::Args;

use crate::application::train_use_case::TrainConfig;
use crate::domain::dataset_kind::DatasetKind;
use crate::ml::arch::VitArch;

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Number of epochs (one train pass + one test pass each)
    #[arg(long, default_value_t = 10)]
    pub epoch: usize,

    /// Samples per batch; the last partial training batch is dropped
    #[arg(long = "batch_size", default_value_t = 32)]
    pub batch_size: usize,

    /// Peak learning rate, reached at the end of warmup
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Decoupled AdamW weight decay
    #[arg(long = "weight_decay", default_value_t = 0.05)]
    pub weight_decay: f32,

    /// Number of warmup epochs
    #[arg(long = "warmup_t", default_value_t = 5)]
    pub warmup_t: usize,

    /// Learning rate at epoch 0
    #[arg(long = "warmup_lr_init", default_value_t = 1e-5)]
    pub warmup_lr_init: f64,

    /// cifar10 or cifar100
    #[arg(long, default_value = "cifar10")]
    pub dataset: DatasetKind,

    /// Mixed precision with dynamic loss scaling
    #[arg(long)]
    pub amp: bool,

    /// vit_tiny_patch16_224, vit_small_patch16_224,
    /// vit_base_patch16_224 or vit_large_patch16_224
    #[arg(long, default_value = "vit_tiny_patch16_224")]
    pub arch: VitArch,

    /// Dataset cache directory
    #[arg(long = "data_dir", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Local safetensors checkpoint instead of the hub download
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// Floor of the cosine decay
    #[arg(long = "min_lr", default_value_t = 0.0)]
    pub min_lr: f64,

    /// Label smoothing for the training loss
    #[arg(long)]
    pub smoothing: Option<f32>,

    /// Threads running the augmentation pipeline
    #[arg(long = "num_workers", default_value_t = 8)]
    pub num_workers: usize,

    /// Seed for model init, shuffling and augmentation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Append per-epoch metrics to this CSV file
    #[arg(long = "metrics_csv")]
    pub metrics_csv: Option<PathBuf>,
}

/// Boundary between Layer 1 and Layer 2: the application layer
/// never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            epoch:          a.epoch,
            batch_size:     a.batch_size,
            lr:             a.lr,
            weight_decay:   a.weight_decay,
            warmup_t:       a.warmup_t,
            warmup_lr_init: a.warmup_lr_init,
            min_lr:         a.min_lr,
            dataset:        a.dataset,
            amp:            a.amp,
            arch:           a.arch,
            data_dir:       a.data_dir,
            weights:        a.weights,
            smoothing:      a.smoothing,
            num_workers:    a.num_workers,
            seed:           a.seed,
            metrics_csv:    a.metrics_csv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(args: &[&str]) -> Result<TrainConfig, clap::Error> {
        let argv = std::iter::once("vit-transfer").chain(args.iter().copied());
        Cli::try_parse_from(argv).map(|cli| cli.train.into())
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let parsed   = serde_json::to_value(parse(&[]).unwrap()).unwrap();
        let defaults = serde_json::to_value(TrainConfig::default()).unwrap();
        assert_eq!(parsed, defaults);
    }

    #[test]
    fn test_float_flags_accept_floats() {
        let cfg = parse(&["--lr", "3e-4", "--weight_decay", "0.1", "--warmup_lr_init", "1e-6"]).unwrap();
        assert_eq!(cfg.lr, 3e-4);
        assert_eq!(cfg.weight_decay, 0.1);
        assert_eq!(cfg.warmup_lr_init, 1e-6);
    }

    #[test]
    fn test_dataset_and_arch() {
        let cfg = parse(&["--dataset", "cifar100", "--arch", "vit_base_patch16_224", "--amp"]).unwrap();
        assert_eq!(cfg.dataset, DatasetKind::Cifar100);
        assert_eq!(cfg.arch, VitArch::Base);
        assert!(cfg.amp);
    }

    #[test]
    fn test_unknown_dataset_is_rejected() {
        let err = parse(&["--dataset", "mnist"]).unwrap_err();
        assert!(err.to_string().contains("cifar100"));
    }

    #[test]
    fn test_unknown_arch_is_rejected() {
        assert!(parse(&["--arch", "deit_tiny_patch16_224"]).is_err());
    }
}
