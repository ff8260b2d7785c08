// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model, optimisation and training-loop code.
//
//   model.rs      — Vision Transformer (patch embedding,
//                   pre-norm blocks, CLS pooling, linear head)
//
//   arch.rs       — supported ViT variants and the adapter
//                   that freezes everything but the head
//
//   pretrained.rs — timm safetensors checkpoint → model
//
//   schedule.rs   — cosine learning rate with linear warmup
//
//   precision.rs  — dynamic loss scaling and f16 rounding
//                   for --amp
//
//   optim.rs      — AdamW over the head + schedule + scaler
//
//   trainer.rs    — the epoch loop: train pass, test pass,
//                   metrics
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Dosovitskiy et al. (2021) ViT

/// Vision Transformer architecture
pub mod model;

/// Supported variants and backbone freezing
pub mod arch;

/// Pretrained weight loading
pub mod pretrained;

/// Warmup + cosine learning rate schedule
pub mod schedule;

/// Mixed precision loss scaling
pub mod precision;

/// Optimizer driver for the trainable head
pub mod optim;

/// Train / test epoch loop
pub mod trainer;
