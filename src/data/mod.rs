// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from CIFAR files on disk to device-ready batches.
//
//   cifar-*-bin files
//       │
//       ▼
//   cifar::read_split   → decodes records + class names
//       │                 (downloads the archive if missing)
//       ▼
//   CifarDataset        → implements Burn's Dataset trait
//       │
//       ▼
//   BatchLoader         → shuffles, chunks, runs the
//       │                 Augmentation on worker threads
//       ▼
//   ImageBatcher        → stacks samples into tensors
//       │
//       ▼
//   epoch loop (ml::trainer)
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// CIFAR binary format reader
pub mod cifar;

/// Implements Burn's Dataset trait for one CIFAR split
pub mod dataset;

/// Train / test image transforms
pub mod augment;

/// Shuffled or ordered batch streams with parallel transforms
pub mod loader;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
