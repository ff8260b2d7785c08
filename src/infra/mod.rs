// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by more than one layer:
//
//   archive.rs — streams the CIFAR .tar.gz from the web and
//                unpacks it into the dataset cache directory
//
//   hub.rs     — resolves pretrained ViT weights, either a
//                local safetensors file or the Hugging Face hub
//
//   metrics.rs — per-epoch MetricsAccumulator and an optional
//                CSV mirror of it
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Dataset archive download and extraction
pub mod archive;

/// Pretrained weight lookup on the Hugging Face hub
pub mod hub;

/// Epoch metrics accumulator and CSV logger
pub mod metrics;
