// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits that describe the fine-tuning
// problem: what an image sample is, which datasets exist,
// which errors can happen, and what an image transform does.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Raw CIFAR images and transformed samples
pub mod sample;

// Supported datasets and train/test splits
pub mod dataset_kind;

// Typed configuration and data errors
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
