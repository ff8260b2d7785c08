// ============================================================
// Layer 5 — Architectures and Model Adapter
// ============================================================
// The set of ViT variants this tool can fine-tune, and the
// adapter that turns a pretrained model into one where only
// the classification head trains.
//
//   name          embed  depth  heads  hub checkpoint
//   vit_tiny       192     12      3   augreg_in21k_ft_in1k
//   vit_small      384     12      6   augreg_in21k_ft_in1k
//   vit_base       768     12     12   augreg2_in21k_ft_in1k
//   vit_large     1024     24     16   augreg_in21k_ft_in1k
//
// All variants use 16x16 patches on 224x224 inputs. Unknown
// names are rejected; there is no fallback architecture.
//
// Freezing:
//   Module::no_grad() clears require_grad on every backbone
//   parameter, so the autodiff graph never records them and
//   GradientsParams only ever holds head gradients. The
//   optimizer is additionally typed over Linear<B> (the head)
//   so it cannot see backbone state at all.

use std::{fmt, str::FromStr};

use burn::{module::Module, nn::Linear, prelude::*};
use serde::{Deserialize, Serialize};

use crate::domain::error::FinetuneError;
use crate::ml::model::{VisionTransformer, VitBackbone, VitConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VitArch {
    #[default]
    #[serde(rename = "vit_tiny_patch16_224")]
    Tiny,
    #[serde(rename = "vit_small_patch16_224")]
    Small,
    #[serde(rename = "vit_base_patch16_224")]
    Base,
    #[serde(rename = "vit_large_patch16_224")]
    Large,
}

impl VitArch {
    pub const ALL: [VitArch; 4] = [Self::Tiny, Self::Small, Self::Base, Self::Large];

    pub fn name(self) -> &'static str {
        match self {
            Self::Tiny  => "vit_tiny_patch16_224",
            Self::Small => "vit_small_patch16_224",
            Self::Base  => "vit_base_patch16_224",
            Self::Large => "vit_large_patch16_224",
        }
    }

    /// (embed_dim, depth, num_heads)
    fn dims(self) -> (usize, usize, usize) {
        match self {
            Self::Tiny  => (192, 12, 3),
            Self::Small => (384, 12, 6),
            Self::Base  => (768, 12, 12),
            Self::Large => (1024, 24, 16),
        }
    }

    /// Hugging Face repository holding the default pretrained tag.
    pub fn hub_repo(self) -> &'static str {
        match self {
            Self::Tiny  => "timm/vit_tiny_patch16_224.augreg_in21k_ft_in1k",
            Self::Small => "timm/vit_small_patch16_224.augreg_in21k_ft_in1k",
            Self::Base  => "timm/vit_base_patch16_224.augreg2_in21k_ft_in1k",
            Self::Large => "timm/vit_large_patch16_224.augreg_in21k_ft_in1k",
        }
    }

    pub fn config(self, num_classes: usize) -> VitConfig {
        let (embed_dim, depth, num_heads) = self.dims();
        VitConfig::new(num_classes, embed_dim, depth, num_heads)
    }

    pub fn supported() -> String {
        Self::ALL.iter().map(|a| a.name()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for VitArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VitArch {
    type Err = FinetuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| FinetuneError::UnsupportedArchitecture {
                name:      s.to_string(),
                supported: Self::supported(),
            })
    }
}

// ─── Head split capability ───────────────────────────────────────────────────

/// A model that can be taken apart into a feature extractor and a
/// linear classification head, and put back together.
pub trait HeadSplit: Sized {
    type Backend: Backend;
    type Backbone: Module<Self::Backend>;

    fn backbone(&self) -> &Self::Backbone;
    fn head(&self) -> &Linear<Self::Backend>;
    fn into_parts(self) -> (Self::Backbone, Linear<Self::Backend>);
    fn from_parts(backbone: Self::Backbone, head: Linear<Self::Backend>) -> Self;
}

impl<B: Backend> HeadSplit for VisionTransformer<B> {
    type Backend  = B;
    type Backbone = VitBackbone<B>;

    fn backbone(&self) -> &VitBackbone<B> {
        &self.backbone
    }

    fn head(&self) -> &Linear<B> {
        &self.head
    }

    fn into_parts(self) -> (VitBackbone<B>, Linear<B>) {
        (self.backbone, self.head)
    }

    fn from_parts(backbone: VitBackbone<B>, head: Linear<B>) -> Self {
        Self { backbone, head }
    }
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamCounts {
    pub total:     usize,
    pub trainable: usize,
    pub frozen:    usize,
}

/// Freezes everything but the head of a `HeadSplit` model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelAdapter;

impl ModelAdapter {
    pub fn adapt<M: HeadSplit>(&self, model: M) -> (M, ParamCounts) {
        let frozen    = model.backbone().num_params();
        let trainable = model.head().num_params();
        let counts    = ParamCounts { total: frozen + trainable, trainable, frozen };

        let (backbone, head) = model.into_parts();
        let backbone = backbone.no_grad();

        tracing::info!(
            "Frozen backbone: {} params frozen, {} trainable of {}",
            counts.frozen, counts.trainable, counts.total,
        );
        (M::from_parts(backbone, head), counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::tests::tiny_config;
    use burn::{
        backend::{Autodiff, NdArray},
        tensor::Distribution,
    };

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_parse_supported_names() {
        for arch in VitArch::ALL {
            assert_eq!(arch.name().parse::<VitArch>().unwrap(), arch);
        }
        assert_eq!(VitArch::default(), VitArch::Tiny);
    }

    #[test]
    fn test_unknown_arch_is_rejected() {
        let err = "resnet50".parse::<VitArch>().unwrap_err();
        assert!(matches!(err, FinetuneError::UnsupportedArchitecture { .. }));
        assert!(err.to_string().contains("vit_tiny_patch16_224"));
    }

    #[test]
    fn test_configs() {
        let cfg = VitArch::Base.config(100);
        assert_eq!((cfg.embed_dim, cfg.depth, cfg.num_heads, cfg.num_classes), (768, 12, 12, 100));
        assert_eq!(VitArch::Large.config(10).depth, 24);
        assert!(VitArch::Tiny.hub_repo().starts_with("timm/vit_tiny_patch16_224"));
    }

    #[test]
    fn test_trainable_is_head_only() {
        let device        = Default::default();
        let model         = tiny_config(10).init::<TestBackend>(&device);
        let total         = model.num_params();
        let (_, counts)   = ModelAdapter.adapt(model);

        assert_eq!(counts.total, total);
        assert_eq!(counts.trainable, 16 * 10 + 10);
        assert_eq!(counts.frozen + counts.trainable, counts.total);
        assert!(counts.trainable < counts.total);
    }

    #[test]
    fn test_only_head_receives_gradients() {
        let device     = Default::default();
        let model      = tiny_config(4).init::<TestBackend>(&device);
        let (model, _) = ModelAdapter.adapt(model);

        let images = Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Default, &device);
        let grads  = model.forward(images).sum().backward();

        assert!(model.head.weight.val().grad(&grads).is_some());
        assert!(model.backbone.cls_token.val().grad(&grads).is_none());
        assert!(model.backbone.patch_embed.proj.weight.val().grad(&grads).is_none());
        assert!(model.backbone.blocks[0].attn.qkv.weight.val().grad(&grads).is_none());
    }
}
