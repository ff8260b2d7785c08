// ============================================================
// Layer 5 — Vision Transformer
// ============================================================
// ViT-*/16 as laid out by timm, so pretrained checkpoints map
// one-to-one onto these modules.
//
//   images [N, 3, 224, 224]
//       │  PatchEmbed: 16x16 patches, linear projection
//       ▼
//   tokens [N, 196, D]
//       │  prepend CLS token, add position embeddings
//       ▼
//   tokens [N, 197, D]
//       │  depth x Block (pre-norm attention + MLP)
//       ▼
//   LayerNorm, take CLS token        ← VitBackbone ends here
//       │
//       ▼
//   features [N, D] ── head (Linear) ──▶ logits [N, num_classes]
//
// Reference: Dosovitskiy et al. (2021) An Image is Worth 16x16 Words
//            Burn Book §3 (Building Blocks)

use burn::{
    module::Param,
    nn::{Initializer, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::{
        activation::{gelu, softmax},
        Distribution,
    },
};

use crate::domain::sample::CHANNELS;

/// Std of the truncated-normal init timm uses for heads and embeddings.
pub const INIT_STD: f64 = 0.02;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct VitConfig {
    pub num_classes: usize,
    pub embed_dim:   usize,
    pub depth:       usize,
    pub num_heads:   usize,
    #[config(default = 224)]
    pub image_size:  usize,
    #[config(default = 16)]
    pub patch_size:  usize,
    #[config(default = 4)]
    pub mlp_ratio:   usize,
    #[config(default = 1e-6)]
    pub norm_eps:    f64,
}

impl VitConfig {
    pub fn num_patches(&self) -> usize {
        let per_side = self.image_size / self.patch_size;
        per_side * per_side
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VisionTransformer<B> {
        VisionTransformer {
            backbone: self.init_backbone(device),
            head:     self.init_head(device),
        }
    }

    pub fn init_backbone<B: Backend>(&self, device: &B::Device) -> VitBackbone<B> {
        let d         = self.embed_dim;
        let patch_dim = CHANNELS * self.patch_size * self.patch_size;
        let tokens    = self.num_patches() + 1;

        let patch_embed = PatchEmbed {
            proj:       LinearConfig::new(patch_dim, d).init(device),
            patch_size: self.patch_size,
        };
        let cls_token = Param::from_tensor(Tensor::zeros([1, 1, d], device));
        let pos_embed = Param::from_tensor(Tensor::random(
            [1, tokens, d],
            Distribution::Normal(0.0, INIT_STD),
            device,
        ));
        let blocks = (0..self.depth).map(|_| self.init_block(device)).collect();
        let norm   = self.layer_norm(device);

        VitBackbone { patch_embed, cls_token, pos_embed, blocks, norm }
    }

    /// A freshly initialised classification head for `num_classes`.
    pub fn init_head<B: Backend>(&self, device: &B::Device) -> Linear<B> {
        LinearConfig::new(self.embed_dim, self.num_classes)
            .with_initializer(Initializer::Normal { mean: 0.0, std: INIT_STD })
            .init(device)
    }

    fn init_block<B: Backend>(&self, device: &B::Device) -> Block<B> {
        let d      = self.embed_dim;
        let hidden = d * self.mlp_ratio;
        Block {
            norm1: self.layer_norm(device),
            attn:  Attention {
                qkv:       LinearConfig::new(d, 3 * d).init(device),
                proj:      LinearConfig::new(d, d).init(device),
                num_heads: self.num_heads,
            },
            norm2: self.layer_norm(device),
            mlp:   Mlp {
                fc1: LinearConfig::new(d, hidden).init(device),
                fc2: LinearConfig::new(hidden, d).init(device),
            },
        }
    }

    fn layer_norm<B: Backend>(&self, device: &B::Device) -> LayerNorm<B> {
        LayerNormConfig::new(self.embed_dim)
            .with_epsilon(self.norm_eps)
            .init(device)
    }
}

// ─── Patch embedding ─────────────────────────────────────────────────────────

/// Non-overlapping patch projection. Equivalent to a stride-p p×p
/// convolution; the weight is stored as [C·p·p, D].
#[derive(Module, Debug)]
pub struct PatchEmbed<B: Backend> {
    pub proj:       Linear<B>,
    pub patch_size: usize,
}

impl<B: Backend> PatchEmbed<B> {
    /// images: [N, C, H, W] → tokens: [N, (H/p)·(W/p), D]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let [n, c, h, w] = images.dims();
        let p            = self.patch_size;
        let (gh, gw)     = (h / p, w / p);

        // flatten each patch in (channel, row, col) order, matching
        // the layout of a conv kernel [D, C, p, p]
        let patches = images
            .reshape([n, c, gh, p, gw, p])
            .permute([0, 2, 4, 1, 3, 5])
            .reshape([n, gh * gw, c * p * p]);

        self.proj.forward(patches)
    }
}

// ─── Attention ───────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Attention<B: Backend> {
    /// Fused query/key/value projection, D → 3D
    pub qkv:       Linear<B>,
    pub proj:      Linear<B>,
    pub num_heads: usize,
}

impl<B: Backend> Attention<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [n, t, d] = x.dims();
        let h         = self.num_heads;
        let hd        = d / h;

        // [N, T, 3D] → [3, N, H, T, hd]
        let qkv = self.qkv
            .forward(x)
            .reshape([n, t, 3, h, hd])
            .permute([2, 0, 3, 1, 4]);
        let take = |i: usize| {
            qkv.clone()
                .slice([i..i + 1, 0..n, 0..h, 0..t, 0..hd])
                .reshape([n, h, t, hd])
        };
        let (q, k, v) = (take(0), take(1), take(2));

        let scale  = (hd as f64).powf(-0.5);
        let scores = q.matmul(k.swap_dims(2, 3)).mul_scalar(scale); // [N, H, T, T]
        let attn   = softmax(scores, 3);

        let out = attn
            .matmul(v)           // [N, H, T, hd]
            .swap_dims(1, 2)     // [N, T, H, hd]
            .reshape([n, t, d]);
        self.proj.forward(out)
    }
}

// ─── MLP and block ───────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.fc2.forward(gelu(self.fc1.forward(x)))
    }
}

/// Pre-norm transformer block.
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    pub norm1: LayerNorm<B>,
    pub attn:  Attention<B>,
    pub norm2: LayerNorm<B>,
    pub mlp:   Mlp<B>,
}

impl<B: Backend> Block<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = x.clone() + self.attn.forward(self.norm1.forward(x));
        x.clone() + self.mlp.forward(self.norm2.forward(x))
    }
}

// ─── Backbone and full model ─────────────────────────────────────────────────

/// Everything up to and including the final norm and CLS pooling.
#[derive(Module, Debug)]
pub struct VitBackbone<B: Backend> {
    pub patch_embed: PatchEmbed<B>,
    /// [1, 1, D]
    pub cls_token:   Param<Tensor<B, 3>>,
    /// [1, 1 + num_patches, D]
    pub pos_embed:   Param<Tensor<B, 3>>,
    pub blocks:      Vec<Block<B>>,
    pub norm:        LayerNorm<B>,
}

impl<B: Backend> VitBackbone<B> {
    /// images: [N, 3, H, W] → pooled CLS features [N, D]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x         = self.patch_embed.forward(images);
        let [n, p, d] = x.dims();

        let cls = self.cls_token.val().expand([n, 1, d]);
        let x   = Tensor::cat(vec![cls, x], 1);
        let x   = x + self.pos_embed.val().expand([n, p + 1, d]);

        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.norm.forward(x);

        x.slice([0..n, 0..1, 0..d]).reshape([n, d])
    }

    pub fn embed_dim(&self) -> usize {
        self.cls_token.val().dims()[2]
    }
}

#[derive(Module, Debug)]
pub struct VisionTransformer<B: Backend> {
    pub backbone: VitBackbone<B>,
    pub head:     Linear<B>,
}

impl<B: Backend> VisionTransformer<B> {
    /// images: [N, 3, H, W] → logits [N, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(images))
    }

    pub fn num_classes(&self) -> usize {
        self.head.weight.val().dims()[1]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::NdArray;

    /// Two blocks, 32px input, 8px patches: 16 patches + CLS.
    pub(crate) fn tiny_config(num_classes: usize) -> VitConfig {
        VitConfig::new(num_classes, 16, 2, 2)
            .with_image_size(32)
            .with_patch_size(8)
            .with_mlp_ratio(2)
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let model: VisionTransformer<NdArray> = tiny_config(10).init(&device);
        let images = Tensor::<NdArray, 4>::random([3, 3, 32, 32], Distribution::Default, &device);

        assert_eq!(model.backbone.forward(images.clone()).dims(), [3, 16]);
        assert_eq!(model.forward(images).dims(), [3, 10]);
        assert_eq!(model.num_classes(), 10);
        assert_eq!(model.backbone.embed_dim(), 16);
    }

    #[test]
    fn test_patch_embed_matches_convolution_layout() {
        // identity-like projection: output channel j reads flattened input j
        let device = Default::default();
        let cfg    = VitConfig::new(2, 3 * 2 * 2, 1, 1).with_image_size(4).with_patch_size(2);
        let mut pe = cfg.init_backbone::<NdArray>(&device).patch_embed;
        let eye    = Tensor::<NdArray, 2>::eye(12, &device);
        pe.proj.weight = Param::from_tensor(eye);
        pe.proj.bias   = Some(Param::from_tensor(Tensor::zeros([12], &device)));

        let pixels: Vec<f32> = (0..48).map(|v| v as f32).collect();
        let images = Tensor::<NdArray, 1>::from_floats(pixels.as_slice(), &device).reshape([1, 3, 4, 4]);
        let tokens = pe.forward(images);
        assert_eq!(tokens.dims(), [1, 4, 12]);

        // second patch (row 0, col 1) starts at pixel (c=0, y=0, x=2)
        let first: Vec<f32> = tokens
            .slice([0..1, 1..2, 0..4])
            .into_data()
            .iter::<f32>()
            .collect();
        assert_eq!(first, vec![2.0, 3.0, 6.0, 7.0]);
    }

    #[test]
    fn test_head_is_sized_for_classes() {
        let device = Default::default();
        let head: Linear<NdArray> = tiny_config(100).init_head(&device);
        assert_eq!(head.weight.val().dims(), [16, 100]);
    }

    #[test]
    fn test_num_patches() {
        let cfg = VitConfig::new(10, 192, 12, 3);
        assert_eq!(cfg.num_patches(), 196);
        assert_eq!(tiny_config(10).num_patches(), 16);
    }
}
