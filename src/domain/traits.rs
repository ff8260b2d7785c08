// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// ImageTransform is the contract between the batch loader and
// the augmentation pipeline. The loader owns the randomness and
// hands each call its own RNG, so a transform stays a pure
// function of (image, rng) and seeded runs replay exactly.
//
// Implementations:
//   - Augmentation::train() → crop + flip + resize + normalise
//   - Augmentation::test()  → resize + normalise
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use rand::RngCore;

use crate::domain::sample::{ImageSample, RawImage};

/// Turns a raw dataset image into a fixed-shape sample.
///
/// Must be `Send + Sync` because the loader runs transforms
/// on a pool of worker threads.
pub trait ImageTransform: Send + Sync {
    /// Transform one image. Stochastic transforms draw all of
    /// their randomness from `rng`.
    fn apply(&self, image: &RawImage, rng: &mut dyn RngCore) -> ImageSample;

    /// Edge length of the produced square image.
    fn output_side(&self) -> usize;

    /// True when two calls on the same image may differ.
    fn is_stochastic(&self) -> bool;
}
