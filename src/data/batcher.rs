// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<ImageSample>
// into device tensors.
//
//   Input:  N samples, each a CHW buffer of 3 x S x S floats
//   Output: images [N, 3, S, S] and labels [N]
//
// All samples from one loader share the same side length, so
// the buffers are concatenated and reshaped in one go.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::sample::{ImageSample, CHANNELS};

/// A batch of images ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Normalised pixels — shape: [batch_size, 3, side, side]
    pub images: Tensor<B, 4>,

    /// Class indices — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }
}

/// Holds the target device so tensors are created on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ImageSample, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageSample>) -> ImageBatch<B> {
        let batch_size = items.len();
        let side       = items[0].side;

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|s| s.image.iter().copied())
            .collect();

        let labels: Vec<i32> = items
            .iter()
            .map(|s| s.label as i32)
            .collect();

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device)
            .reshape([batch_size, CHANNELS, side, side]);

        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        ImageBatch { images, labels }
    }
}
