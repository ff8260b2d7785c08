// ============================================================
// Layer 4 — Batch Loader
// ============================================================
// Turns a Dataset<RawImage> into a lazy stream of batches of
// transformed samples.
//
//   main thread            producer thread         rayon pool
//   ───────────            ───────────────         ──────────
//   iter() ──spawn──────▶  for each index chunk ──▶ transform samples
//   next() ◀──bounded channel (prefetch)── Vec<ImageSample>
//
// Training traversal: shuffled, reshuffled on every call to
// iter(), final partial batch dropped.
// Test traversal: dataset order, nothing dropped.
//
// Workers only read the dataset and the transform; they never
// see tensors, the model or the optimizer. A missing sample or a
// panicking transform ends the traversal with an Err item, and a
// traversal that stops short of num_batches() is an error too.
//
// With a seed, the shuffle of traversal t and the augmentation
// RNG of sample i in traversal t are pure functions of
// (seed, t, i), so two seeded runs replay exactly no matter
// which worker finishes first.
//
// Reference: rayon (par_iter), crossbeam-channel (bounded)

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use anyhow::{anyhow, Context, Result};
use burn::data::dataset::Dataset;
use crossbeam_channel::{bounded, Receiver};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;

use crate::domain::{
    sample::{ImageSample, RawImage},
    traits::ImageTransform,
};

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size:  usize,
    pub shuffle:     bool,
    /// Drop the final batch when it holds fewer than `batch_size` samples
    pub drop_last:   bool,
    /// Threads in the transform pool
    pub num_workers: usize,
    /// Batches buffered ahead of the consumer
    pub prefetch:    usize,
    pub seed:        Option<u64>,
}

impl LoaderConfig {
    pub fn train(batch_size: usize, num_workers: usize, seed: Option<u64>) -> Self {
        Self { batch_size, shuffle: true, drop_last: true, num_workers, prefetch: 2, seed }
    }

    pub fn test(batch_size: usize, num_workers: usize) -> Self {
        Self { batch_size, shuffle: false, drop_last: false, num_workers, prefetch: 2, seed: None }
    }
}

pub struct BatchLoader<D> {
    dataset:   Arc<D>,
    transform: Arc<dyn ImageTransform>,
    pool:      Arc<rayon::ThreadPool>,
    cfg:       LoaderConfig,
    traversal: u64,
}

impl<D> BatchLoader<D>
where
    D: Dataset<RawImage> + 'static,
{
    pub fn new(dataset: Arc<D>, transform: Arc<dyn ImageTransform>, cfg: LoaderConfig) -> Result<Self> {
        anyhow::ensure!(cfg.batch_size > 0, "batch size must be positive");
        anyhow::ensure!(
            !cfg.drop_last || cfg.batch_size <= dataset.len(),
            "batch size {} exceeds the {} samples of the dataset, so every batch would be dropped",
            cfg.batch_size,
            dataset.len(),
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.num_workers.max(1))
            .thread_name(|i| format!("loader-{i}"))
            .build()
            .context("Cannot start loader worker pool")?;

        tracing::debug!(
            "Loader ready: {} samples, batch {}, {} workers, {}px output",
            dataset.len(), cfg.batch_size, cfg.num_workers.max(1), transform.output_side(),
        );
        Ok(Self { dataset, transform, pool: Arc::new(pool), cfg, traversal: 0 })
    }

    /// Number of samples in the underlying dataset.
    pub fn dataset_len(&self) -> usize {
        self.dataset.len()
    }

    /// Number of batches one traversal yields.
    pub fn num_batches(&self) -> usize {
        let n  = self.dataset.len();
        let bs = self.cfg.batch_size;
        if self.cfg.drop_last { n / bs } else { n.div_ceil(bs) }
    }

    /// Start a new traversal over the dataset.
    pub fn iter(&mut self) -> BatchIter {
        let traversal = self.traversal;
        self.traversal += 1;

        let bs      = self.cfg.batch_size;
        let order   = self.order(traversal);
        let batches: Vec<Vec<usize>> = order
            .chunks(bs)
            .filter(|c| !self.cfg.drop_last || c.len() == bs)
            .map(<[usize]>::to_vec)
            .collect();
        let remaining = batches.len();

        let (tx, rx)   = bounded(self.cfg.prefetch.max(1));
        let dataset    = Arc::clone(&self.dataset);
        let transform  = Arc::clone(&self.transform);
        let pool       = Arc::clone(&self.pool);
        let seed       = self.cfg.seed;
        let stochastic = transform.is_stochastic();

        thread::spawn(move || {
            for indices in batches {
                // collect() on an indexed parallel iterator keeps index order
                let produced = panic::catch_unwind(AssertUnwindSafe(|| {
                    pool.install(|| {
                        indices
                            .par_iter()
                            .map(|&i| -> Result<ImageSample> {
                                let raw = dataset
                                    .get(i)
                                    .ok_or_else(|| anyhow!("dataset has no sample at index {i}"))?;
                                let mut rng = if stochastic {
                                    sample_rng(seed, traversal, i)
                                } else {
                                    StdRng::seed_from_u64(0)
                                };
                                Ok(transform.apply(&raw, &mut rng))
                            })
                            .collect::<Result<Vec<ImageSample>>>()
                    })
                }));
                let batch = produced.unwrap_or_else(|payload| {
                    Err(anyhow!("loader worker panicked: {}", panic_message(payload.as_ref())))
                });
                let failed = batch.is_err();
                // receiver dropped: the consumer stopped early
                if tx.send(batch).is_err() || failed {
                    break;
                }
            }
        });

        tracing::debug!("Loader traversal {} started: {} batches", traversal, remaining);
        BatchIter { rx, remaining, failed: false }
    }

    fn order(&self, traversal: u64) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.cfg.shuffle {
            let seed = match self.cfg.seed {
                Some(s) => mix(s, traversal, u64::MAX),
                None => rand::thread_rng().gen(),
            };
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        order
    }
}

/// Batches of one traversal, in order. Yields at most one `Err`,
/// after which the traversal is over.
pub struct BatchIter {
    rx:        Receiver<Result<Vec<ImageSample>>>,
    remaining: usize,
    failed:    bool,
}

impl Iterator for BatchIter {
    type Item = Result<Vec<ImageSample>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let batch = match self.rx.recv() {
            Ok(batch) => batch,
            Err(_) if self.remaining == 0 => return None,
            Err(_) => Err(anyhow!(
                "loader stopped with {} batches still outstanding",
                self.remaining,
            )),
        };
        self.failed    = batch.is_err();
        self.remaining = if self.failed { 0 } else { self.remaining.saturating_sub(1) };
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn sample_rng(seed: Option<u64>, traversal: u64, index: usize) -> StdRng {
    let s = match seed {
        Some(s) => mix(s, traversal, index as u64),
        None => rand::thread_rng().gen(),
    };
    StdRng::seed_from_u64(s)
}

/// splitmix64 finaliser over the three coordinates.
fn mix(seed: u64, traversal: u64, index: u64) -> u64 {
    let mut z = seed
        ^ traversal.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ index.wrapping_add(1).wrapping_mul(0xD1B5_4A32_D192_ED03);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
