// ============================================================
// Layer 5 — Pretrained Weight Loading
// ============================================================
// Copies a timm ViT checkpoint (safetensors) into a
// VisionTransformer built from the matching VitConfig.
//
// Key mapping (timm name → module, layout change):
//   cls_token, pos_embed          → backbone params, as-is
//   patch_embed.proj.weight       → [D, C, p, p] → [C·p·p, D]
//   blocks.{i}.norm{1,2}.*        → LayerNorm gamma / beta
//   blocks.{i}.attn.{qkv,proj}.*  → Linear, weight transposed
//   blocks.{i}.mlp.fc{1,2}.*      → Linear, weight transposed
//   norm.*                        → final LayerNorm
//   head.*                        → head, only when the class
//                                   count matches; otherwise the
//                                   freshly initialised head stays
//
// torch stores Linear weights as [out, in]; burn as [in, out].
// F32, F16 and BF16 tensors are accepted and widened to f32.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use burn::{
    module::Param,
    nn::{LayerNorm, Linear},
    prelude::*,
};
use safetensors::{Dtype, SafeTensors};

use crate::domain::error::{FinetuneError, FinetuneResult};
use crate::ml::model::{Block, VisionTransformer};

/// Where the classification head's weights came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadSource {
    Pretrained,
    /// Checkpoint head had a different class count
    Reinitialised { checkpoint_classes: usize },
}

/// Read `path` and load it into `model`.
pub fn load_pretrained<B: Backend>(
    model:  VisionTransformer<B>,
    path:   &Path,
    device: &B::Device,
) -> Result<(VisionTransformer<B>, HeadSource)> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot read weights '{}'", path.display()))?;
    let loaded = load_from_bytes(model, &bytes, device)
        .with_context(|| format!("Cannot load weights '{}'", path.display()))?;
    Ok(loaded)
}

pub fn load_from_bytes<B: Backend>(
    model:  VisionTransformer<B>,
    bytes:  &[u8],
    device: &B::Device,
) -> FinetuneResult<(VisionTransformer<B>, HeadSource)> {
    let st = SafeTensors::deserialize(bytes)
        .map_err(|e| FinetuneError::InvalidWeights(e.to_string()))?;
    let reader = WeightReader { st, device };
    reader.apply(model)
}

struct WeightReader<'a, B: Backend> {
    st:     SafeTensors<'a>,
    device: &'a B::Device,
}

impl<B: Backend> WeightReader<'_, B> {
    fn apply(&self, mut model: VisionTransformer<B>) -> FinetuneResult<(VisionTransformer<B>, HeadSource)> {
        let bb = &mut model.backbone;

        bb.cls_token = Param::from_tensor(self.tensor("cls_token", bb.cls_token.val().dims())?);
        bb.pos_embed = Param::from_tensor(self.tensor("pos_embed", bb.pos_embed.val().dims())?);

        // conv kernel [D, C, p, p] flattened to [D, C·p·p], then transposed
        let [patch_dim, d] = bb.patch_embed.proj.weight.val().dims();
        let p = bb.patch_embed.patch_size;
        let kernel: Tensor<B, 4> = self.tensor("patch_embed.proj.weight", [d, patch_dim / (p * p), p, p])?;
        bb.patch_embed.proj.weight = Param::from_tensor(kernel.reshape([d, patch_dim]).transpose());
        bb.patch_embed.proj.bias   = Some(Param::from_tensor(self.tensor("patch_embed.proj.bias", [d])?));

        for (i, block) in bb.blocks.iter_mut().enumerate() {
            self.load_block(&format!("blocks.{i}"), block)?;
        }
        self.load_norm("norm", &mut bb.norm)?;

        let head = self.load_head(&mut model.head)?;
        tracing::info!("Loaded {} pretrained tensors", self.st.len());
        Ok((model, head))
    }

    fn load_block(&self, prefix: &str, block: &mut Block<B>) -> FinetuneResult<()> {
        self.load_norm(&format!("{prefix}.norm1"), &mut block.norm1)?;
        self.load_linear(&format!("{prefix}.attn.qkv"), &mut block.attn.qkv)?;
        self.load_linear(&format!("{prefix}.attn.proj"), &mut block.attn.proj)?;
        self.load_norm(&format!("{prefix}.norm2"), &mut block.norm2)?;
        self.load_linear(&format!("{prefix}.mlp.fc1"), &mut block.mlp.fc1)?;
        self.load_linear(&format!("{prefix}.mlp.fc2"), &mut block.mlp.fc2)
    }

    fn load_head(&self, head: &mut Linear<B>) -> FinetuneResult<HeadSource> {
        let [d, classes] = head.weight.val().dims();
        let found = self.shape("head.weight")?;
        match found.as_slice() {
            [c, hd] if *c == classes && *hd == d => {
                self.load_linear("head", head)?;
                Ok(HeadSource::Pretrained)
            }
            [c, _] => {
                tracing::info!("Checkpoint head has {} classes, keeping fresh {}-class head", c, classes);
                Ok(HeadSource::Reinitialised { checkpoint_classes: *c })
            }
            _ => Err(FinetuneError::ShapeMismatch {
                name:     "head.weight".into(),
                expected: vec![classes, d],
                found:    found.clone(),
            }),
        }
    }

    fn load_linear(&self, prefix: &str, linear: &mut Linear<B>) -> FinetuneResult<()> {
        let [d_in, d_out] = linear.weight.val().dims();
        let weight: Tensor<B, 2> = self.tensor(&format!("{prefix}.weight"), [d_out, d_in])?;
        linear.weight = Param::from_tensor(weight.transpose());
        linear.bias   = Some(Param::from_tensor(self.tensor(&format!("{prefix}.bias"), [d_out])?));
        Ok(())
    }

    fn load_norm(&self, prefix: &str, norm: &mut LayerNorm<B>) -> FinetuneResult<()> {
        let [d] = norm.gamma.val().dims();
        norm.gamma = Param::from_tensor(self.tensor(&format!("{prefix}.weight"), [d])?);
        norm.beta  = Param::from_tensor(self.tensor(&format!("{prefix}.bias"), [d])?);
        Ok(())
    }

    fn shape(&self, name: &str) -> FinetuneResult<Vec<usize>> {
        self.st
            .tensor(name)
            .map(|view| view.shape().to_vec())
            .map_err(|_| FinetuneError::MissingTensor(name.to_string()))
    }

    fn tensor<const D: usize>(&self, name: &str, expected: [usize; D]) -> FinetuneResult<Tensor<B, D>> {
        let view = self
            .st
            .tensor(name)
            .map_err(|_| FinetuneError::MissingTensor(name.to_string()))?;

        if view.shape() != expected.as_slice() {
            return Err(FinetuneError::ShapeMismatch {
                name:     name.to_string(),
                expected: expected.to_vec(),
                found:    view.shape().to_vec(),
            });
        }

        let values = decode(name, view.dtype(), view.data())?;
        Ok(Tensor::from_data(TensorData::new(values, expected), self.device))
    }
}

/// Little-endian bytes → f32 values.
fn decode(name: &str, dtype: Dtype, bytes: &[u8]) -> FinetuneResult<Vec<f32>> {
    let values = match dtype {
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        Dtype::BF16 => bytes
            .chunks_exact(2)
            .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        other => {
            return Err(FinetuneError::UnsupportedDtype {
                name:  name.to_string(),
                dtype: format!("{other:?}"),
            })
        }
    };
    Ok(values)
}
