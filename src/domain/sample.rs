// ============================================================
// Layer 3 — Image Sample Types
// ============================================================
// Two representations of one labelled image:
//
//   RawImage     — exactly what the CIFAR binary files store:
//                  32x32 pixels, planar RGB bytes
//                  (1024 red, then 1024 green, then 1024 blue)
//
//   ImageSample  — the output of the augmentation pipeline:
//                  a CHW float buffer of fixed size
//                  (3 x 224 x 224 for the default model)
//
// Both are immutable once produced.
//
// Reference: CIFAR binary format (Krizhevsky, 2009)

use serde::{Deserialize, Serialize};

/// Width and height of every CIFAR image.
pub const CIFAR_SIDE: usize = 32;

/// Number of colour channels (RGB).
pub const CHANNELS: usize = 3;

/// Bytes of pixel data in one CIFAR record.
pub const CIFAR_PIXELS: usize = CHANNELS * CIFAR_SIDE * CIFAR_SIDE;

/// One labelled image as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImage {
    /// Planar RGB bytes, length [`CIFAR_PIXELS`]
    pub pixels: Vec<u8>,

    /// Class index in `0..num_classes`
    pub label: usize,
}

impl RawImage {
    pub fn new(pixels: Vec<u8>, label: usize) -> Self {
        debug_assert_eq!(pixels.len(), CIFAR_PIXELS);
        Self { pixels, label }
    }

    /// Read the value of channel `c` at pixel (`x`, `y`).
    pub fn at(&self, c: usize, y: usize, x: usize) -> u8 {
        self.pixels[c * CIFAR_SIDE * CIFAR_SIDE + y * CIFAR_SIDE + x]
    }
}

/// One transformed sample, ready to be stacked into a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Normalised pixels in CHW order, length `3 * side * side`
    pub image: Vec<f32>,

    /// Edge length of the square image
    pub side: usize,

    /// Class index in `0..num_classes`
    pub label: usize,
}

impl ImageSample {
    pub fn shape(&self) -> [usize; 3] {
        [CHANNELS, self.side, self.side]
    }
}
