// ============================================================
// Layer 6 — Metrics
// ============================================================
// Per-epoch bookkeeping for the fine-tuning run.
//
//   MetricsAccumulator — four growing sequences, one entry per
//                        epoch, owned by the caller and threaded
//                        through the epoch loop
//   MetricsLogger      — optional CSV mirror of the same rows
//
// Example CSV output:
//   epoch,lr,train_loss,train_acc,test_loss,test_acc
//   1,0.000010,2.012345,0.312000,1.654321,0.455000
//   2,0.000028,1.402311,0.548000,1.203110,0.601000
//
// Loss is averaged over batches; accuracy is correct
// predictions over the dataset size.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

/// One epoch's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch number, starting at 1
    pub epoch:      usize,

    /// Learning rate used for this epoch's training pass
    pub lr:         f64,

    /// Mean cross-entropy over training batches
    pub train_loss: f64,

    /// Fraction of training samples predicted correctly, in [0, 1]
    pub train_acc:  f64,

    pub test_loss:  f64,
    pub test_acc:   f64,
}

impl EpochMetrics {
    pub fn new(
        epoch:      usize,
        lr:         f64,
        train_loss: f64,
        train_acc:  f64,
        test_loss:  f64,
        test_acc:   f64,
    ) -> Self {
        Self { epoch, lr, train_loss, train_acc, test_loss, test_acc }
    }
}

/// Loss and accuracy history of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsAccumulator {
    pub train_losses: Vec<f64>,
    pub train_accs:   Vec<f64>,
    pub test_losses:  Vec<f64>,
    pub test_accs:    Vec<f64>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one epoch to every sequence.
    pub fn push(&mut self, m: &EpochMetrics) {
        self.train_losses.push(m.train_loss);
        self.train_accs.push(m.train_acc);
        self.test_losses.push(m.test_loss);
        self.test_accs.push(m.test_acc);
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.train_losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_losses.is_empty()
    }

    /// Highest test accuracy seen so far, with its 1-based epoch.
    pub fn best_test_acc(&self) -> Option<(usize, f64)> {
        self.test_accs
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, acc)| match best {
                Some((_, b)) if b >= acc => best,
                _ => Some((i + 1, acc)),
            })
    }
}

/// Appends epoch metrics to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open `path` for appending, writing the header if the file is new.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let csv_path = path.as_ref().to_path_buf();

        if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        }

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "epoch,lr,train_loss,train_acc,test_loss,test_acc")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one row.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.8},{:.6},{:.6},{:.6},{:.6}",
            m.epoch,
            m.lr,
            m.train_loss,
            m.train_acc,
            m.test_loss,
            m.test_acc,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, test_acc={:.4}",
            m.epoch,
            m.train_loss,
            m.test_acc,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
