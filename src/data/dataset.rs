use std::path::Path;

use anyhow::Result;
use burn::data::dataset::Dataset;

use crate::data::cifar::read_split;
use crate::domain::{
    dataset_kind::{DatasetKind, Split},
    error::FinetuneError,
    sample::RawImage,
};

/// One split of CIFAR-10/100 held in memory, plus its class names.
pub struct CifarDataset {
    images:      Vec<RawImage>,
    class_names: Vec<String>,
}

impl CifarDataset {
    /// Load a split from the cache root, downloading it if allowed.
    pub fn load(root: &Path, kind: DatasetKind, split: Split, download: bool) -> Result<Self> {
        let (images, class_names) = read_split(root, kind, split, download)?;
        tracing::info!("Loaded {} {} images ({} classes)", images.len(), split, class_names.len());
        Ok(Self::from_parts(kind, images, class_names)?)
    }

    pub fn from_parts(
        kind:        DatasetKind,
        images:      Vec<RawImage>,
        class_names: Vec<String>,
    ) -> Result<Self, FinetuneError> {
        if class_names.len() != kind.num_classes() {
            return Err(FinetuneError::ClassCount {
                expected: kind.num_classes(),
                found:    class_names.len(),
            });
        }
        Ok(Self { images, class_names })
    }

    pub fn class_names(&self) -> &[String] { &self.class_names }

    pub fn num_classes(&self) -> usize { self.class_names.len() }
}

impl Dataset<RawImage> for CifarDataset {
    fn get(&self, index: usize) -> Option<RawImage> {
        self.images.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}
