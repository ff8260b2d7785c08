// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands a TrainConfig to
// Layer 2. There is a single job, so the flags sit directly on
// the top-level command:
//
//   vit-transfer --dataset cifar100 --epoch 20 --amp
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::TrainArgs;

#[derive(Parser, Debug)]
#[command(
    name = "vit-transfer",
    version = "0.1.0",
    about = "Fine-tune the head of a pretrained Vision Transformer on CIFAR-10/100."
)]
pub struct Cli {
    #[command(flatten)]
    pub train: TrainArgs,
}

impl Cli {
    /// Convert the flags into a TrainConfig and run the job.
    pub fn run(self) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!("Fine-tuning {} on {}", self.train.arch, self.train.dataset);

        let use_case = TrainUseCase::new(self.train.into());
        let metrics  = use_case.execute()?;

        println!("Training complete. {} epochs recorded.", metrics.len());
        Ok(())
    }
}
