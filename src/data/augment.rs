// ============================================================
// Layer 4 — Augmentation Pipeline
// ============================================================
// Converts a 32x32 CIFAR image into the normalised CHW float
// buffer the Vision Transformer expects.
//
// Train variant (applied in order):
//   1. Scale bytes to [0, 1]
//   2. Random 32x32 crop from the image padded by 4 px
//      (reflection padding by default)
//   3. Horizontal flip with probability 0.5
//   4. Bilinear resize to 224x224
//   5. Per-channel (x - mean) / std
//
// Test variant: steps 1, 4, 5 only.
//
// All randomness comes from the RNG the caller passes in,
// so the loader decides whether a run is seeded.
//
// Reference: image crate (imageops::resize, flip_horizontal)

use image::{imageops, imageops::FilterType, Rgb, Rgb32FImage};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::domain::{
    sample::{ImageSample, RawImage, CHANNELS, CIFAR_SIDE},
    traits::ImageTransform,
};

/// CIFAR channel statistics used by the normalisation step.
pub const CIFAR_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
pub const CIFAR_STD:  [f32; 3] = [0.2023, 0.1994, 0.2010];

/// How pixels outside the image are filled before random cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingMode {
    /// Mirror the image without repeating the edge pixel
    Reflect,
    /// Fill with zeros
    Constant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Edge length of the output image
    pub output_side:  usize,
    /// Padding added on every side before the random crop; 0 disables cropping
    pub crop_padding: usize,
    pub padding_mode: PaddingMode,
    /// Probability of a horizontal flip; 0 disables flipping
    pub flip_prob:    f32,
    pub mean:         [f32; 3],
    pub std:          [f32; 3],
}

impl AugmentationConfig {
    pub fn train(output_side: usize) -> Self {
        Self {
            output_side,
            crop_padding: 4,
            padding_mode: PaddingMode::Reflect,
            flip_prob:    0.5,
            mean:         CIFAR_MEAN,
            std:          CIFAR_STD,
        }
    }

    pub fn test(output_side: usize) -> Self {
        Self {
            crop_padding: 0,
            flip_prob:    0.0,
            ..Self::train(output_side)
        }
    }
}

/// The transform pipeline for one split.
#[derive(Debug, Clone)]
pub struct Augmentation {
    cfg: AugmentationConfig,
}

impl Augmentation {
    pub fn new(cfg: AugmentationConfig) -> Self {
        Self { cfg }
    }

    pub fn train(output_side: usize) -> Self {
        Self::new(AugmentationConfig::train(output_side))
    }

    pub fn test(output_side: usize) -> Self {
        Self::new(AugmentationConfig::test(output_side))
    }

    fn random_crop(&self, img: &Rgb32FImage, rng: &mut dyn RngCore) -> Rgb32FImage {
        let pad  = self.cfg.crop_padding as i64;
        let side = CIFAR_SIDE as i64;
        // offset of the crop window inside the padded image
        let top  = rng.gen_range(0..=2 * pad);
        let left = rng.gen_range(0..=2 * pad);
        let mode = self.cfg.padding_mode;

        Rgb32FImage::from_fn(CIFAR_SIDE as u32, CIFAR_SIDE as u32, |x, y| {
            let sy = y as i64 + top - pad;
            let sx = x as i64 + left - pad;
            match mode {
                PaddingMode::Reflect => {
                    *img.get_pixel(reflect(sx, side) as u32, reflect(sy, side) as u32)
                }
                PaddingMode::Constant => {
                    if (0..side).contains(&sx) && (0..side).contains(&sy) {
                        *img.get_pixel(sx as u32, sy as u32)
                    } else {
                        Rgb([0.0, 0.0, 0.0])
                    }
                }
            }
        })
    }

    fn normalise(&self, img: &Rgb32FImage) -> Vec<f32> {
        let (w, h) = img.dimensions();
        let plane  = (w * h) as usize;
        let mut chw = vec![0.0f32; CHANNELS * plane];
        for (x, y, pixel) in img.enumerate_pixels() {
            let base = (y * w + x) as usize;
            for c in 0..CHANNELS {
                chw[c * plane + base] = (pixel[c] - self.cfg.mean[c]) / self.cfg.std[c];
            }
        }
        chw
    }
}

impl ImageTransform for Augmentation {
    fn apply(&self, image: &RawImage, rng: &mut dyn RngCore) -> ImageSample {
        let mut img = to_unit_image(image);

        if self.cfg.crop_padding > 0 {
            img = self.random_crop(&img, rng);
        }

        if self.cfg.flip_prob > 0.0 && rng.gen::<f32>() < self.cfg.flip_prob {
            imageops::flip_horizontal_in_place(&mut img);
        }

        let side = self.cfg.output_side as u32;
        if img.dimensions() != (side, side) {
            img = imageops::resize(&img, side, side, FilterType::Triangle);
        }

        ImageSample {
            image: self.normalise(&img),
            side:  self.cfg.output_side,
            label: image.label,
        }
    }

    fn output_side(&self) -> usize {
        self.cfg.output_side
    }

    fn is_stochastic(&self) -> bool {
        self.cfg.crop_padding > 0 || self.cfg.flip_prob > 0.0
    }
}

/// Planar CIFAR bytes → interleaved float image in [0, 1].
fn to_unit_image(raw: &RawImage) -> Rgb32FImage {
    Rgb32FImage::from_fn(CIFAR_SIDE as u32, CIFAR_SIDE as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            raw.at(0, y, x) as f32 / 255.0,
            raw.at(1, y, x) as f32 / 255.0,
            raw.at(2, y, x) as f32 / 255.0,
        ])
    })
}

/// Mirror index `i` into `0..n` without repeating the border (n > 1).
fn reflect(i: i64, n: i64) -> i64 {
    let period = 2 * (n - 1);
    let m = i.rem_euclid(period);
    if m < n { m } else { period - m }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::CIFAR_PIXELS;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn gradient_image() -> RawImage {
        let pixels = (0..CIFAR_PIXELS).map(|i| (i % 251) as u8).collect();
        RawImage::new(pixels, 1)
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect(-1, 32), 1);
        assert_eq!(reflect(-4, 32), 4);
        assert_eq!(reflect(0, 32), 0);
        assert_eq!(reflect(31, 32), 31);
        assert_eq!(reflect(32, 32), 30);
        assert_eq!(reflect(35, 32), 27);
    }

    #[test]
    fn test_output_shape() {
        let aug    = Augmentation::test(224);
        let sample = aug.apply(&gradient_image(), &mut StdRng::seed_from_u64(0));
        assert_eq!(sample.shape(), [3, 224, 224]);
        assert_eq!(sample.image.len(), 3 * 224 * 224);
        assert_eq!(sample.label, 1);
    }

    #[test]
    fn test_constant_image_normalises_per_channel() {
        let raw    = RawImage::new(vec![255; CIFAR_PIXELS], 0);
        let sample = Augmentation::test(64).apply(&raw, &mut StdRng::seed_from_u64(0));
        let plane  = 64 * 64;
        for c in 0..3 {
            let expected = (1.0 - CIFAR_MEAN[c]) / CIFAR_STD[c];
            assert_relative_eq!(sample.image[c * plane], expected, epsilon = 1e-4);
            assert_relative_eq!(sample.image[c * plane + plane - 1], expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_test_transform_is_deterministic() {
        let aug = Augmentation::test(48);
        assert!(!aug.is_stochastic());
        let a = aug.apply(&gradient_image(), &mut StdRng::seed_from_u64(1));
        let b = aug.apply(&gradient_image(), &mut StdRng::seed_from_u64(2));
        assert_eq!(a, b);
    }

    #[test]
    fn test_train_transform_replays_with_same_seed() {
        let aug = Augmentation::train(32);
        assert!(aug.is_stochastic());
        let a = aug.apply(&gradient_image(), &mut StdRng::seed_from_u64(11));
        let b = aug.apply(&gradient_image(), &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn test_train_transform_varies_between_calls() {
        let aug     = Augmentation::train(32);
        let mut rng = StdRng::seed_from_u64(5);
        let first   = aug.apply(&gradient_image(), &mut rng);
        let differs = (0..20).any(|_| aug.apply(&gradient_image(), &mut rng) != first);
        assert!(differs);
    }

    #[test]
    fn test_reflection_padding_never_introduces_zeros() {
        let raw = RawImage::new(vec![255; CIFAR_PIXELS], 0);
        let aug = Augmentation::train(32);
        let mut rng = StdRng::seed_from_u64(3);
        let expected = (1.0 - CIFAR_MEAN[0]) / CIFAR_STD[0];
        for _ in 0..20 {
            let s = aug.apply(&raw, &mut rng);
            assert!(s.image[..32 * 32].iter().all(|&v| (v - expected).abs() < 1e-4));
        }
    }

    #[test]
    fn test_certain_flip_mirrors_rows() {
        let cfg = AugmentationConfig {
            crop_padding: 0,
            flip_prob:    1.0,
            ..AugmentationConfig::test(32)
        };
        let raw     = gradient_image();
        let plain   = Augmentation::test(32).apply(&raw, &mut StdRng::seed_from_u64(0));
        let flipped = Augmentation::new(cfg).apply(&raw, &mut StdRng::seed_from_u64(0));
        for x in 0..32 {
            assert_eq!(flipped.image[x], plain.image[31 - x]);
        }
    }
}
