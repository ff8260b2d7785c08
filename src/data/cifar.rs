// ============================================================
// Layer 4 — CIFAR Binary Reader
// ============================================================
// Reads the official "binary version" of CIFAR-10 / CIFAR-100.
//
// On-disk layout after extracting the archive:
//
//   data/
//     cifar-10-batches-bin/
//       data_batch_1.bin .. data_batch_5.bin   (train, 10000 each)
//       test_batch.bin                         (test, 10000)
//       batches.meta.txt                       (10 class names)
//     cifar-100-binary/
//       train.bin                              (50000)
//       test.bin                               (10000)
//       fine_label_names.txt                   (100 class names)
//
// Record layout:
//   CIFAR-10:  [label][3072 pixel bytes]
//   CIFAR-100: [coarse label][fine label][3072 pixel bytes]
//
// Pixel bytes are planar: 1024 red, 1024 green, 1024 blue,
// each plane row-major 32x32. We keep the fine label.
//
// Reference: https://www.cs.toronto.edu/~kriz/cifar.html

use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};

use crate::domain::{
    dataset_kind::{DatasetKind, Split},
    error::{FinetuneError, FinetuneResult},
    sample::{RawImage, CIFAR_PIXELS},
};
use crate::infra::archive::download_and_unpack;

/// Where one dataset lives inside the cache root and where to fetch it.
#[derive(Debug, Clone, Copy)]
pub struct CifarLayout {
    pub dir:         &'static str,
    pub train_files: &'static [&'static str],
    pub test_files:  &'static [&'static str],
    pub meta_file:   &'static str,
    pub url:         &'static str,
}

impl CifarLayout {
    pub fn of(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Cifar10 => CifarLayout {
                dir:         "cifar-10-batches-bin",
                train_files: &[
                    "data_batch_1.bin",
                    "data_batch_2.bin",
                    "data_batch_3.bin",
                    "data_batch_4.bin",
                    "data_batch_5.bin",
                ],
                test_files:  &["test_batch.bin"],
                meta_file:   "batches.meta.txt",
                url:         "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz",
            },
            DatasetKind::Cifar100 => CifarLayout {
                dir:         "cifar-100-binary",
                train_files: &["train.bin"],
                test_files:  &["test.bin"],
                meta_file:   "fine_label_names.txt",
                url:         "https://www.cs.toronto.edu/~kriz/cifar-100-binary.tar.gz",
            },
        }
    }

    pub fn files(&self, split: Split) -> &'static [&'static str] {
        match split {
            Split::Train => self.train_files,
            Split::Test => self.test_files,
        }
    }

    /// All files this split needs, as absolute paths under `root`.
    pub fn required_paths(&self, root: &Path, split: Split) -> Vec<PathBuf> {
        let dir = root.join(self.dir);
        self.files(split)
            .iter()
            .chain(std::iter::once(&self.meta_file))
            .map(|f| dir.join(f))
            .collect()
    }
}

/// Read one split from `root`, downloading the archive first when
/// files are missing and `download` is set.
///
/// Returns the images in file order plus the ordered class names.
pub fn read_split(
    root:     &Path,
    kind:     DatasetKind,
    split:    Split,
    download: bool,
) -> Result<(Vec<RawImage>, Vec<String>)> {
    let layout  = CifarLayout::of(kind);
    let missing = layout
        .required_paths(root, split)
        .into_iter()
        .any(|p| !p.exists());

    if missing {
        if !download {
            anyhow::bail!(
                "{} {} split not found under '{}' and download is disabled",
                kind, split, root.display()
            );
        }
        tracing::info!("Downloading {} from {}", kind, layout.url);
        fs::create_dir_all(root)
            .with_context(|| format!("Cannot create dataset dir '{}'", root.display()))?;
        download_and_unpack(layout.url, root)?;
    }

    let dir = root.join(layout.dir);

    let mut images = Vec::with_capacity(kind.split_len(split));
    for file in layout.files(split) {
        let path  = dir.join(file);
        let bytes = fs::read(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        let mut records = parse_records(&bytes, kind, &path)?;
        tracing::debug!("Read {} records from {}", records.len(), path.display());
        images.append(&mut records);
    }

    let meta_path = dir.join(layout.meta_file);
    let meta = fs::read_to_string(&meta_path)
        .with_context(|| format!("Cannot read '{}'", meta_path.display()))?;
    let class_names = parse_class_names(&meta);
    if class_names.len() != kind.num_classes() {
        return Err(FinetuneError::ClassCount {
            expected: kind.num_classes(),
            found:    class_names.len(),
        }
        .into());
    }

    Ok((images, class_names))
}

/// Decode a whole CIFAR binary file into images.
pub fn parse_records(bytes: &[u8], kind: DatasetKind, path: &Path) -> FinetuneResult<Vec<RawImage>> {
    let label_bytes = kind.label_bytes();
    let record_len  = label_bytes + CIFAR_PIXELS;

    if bytes.len() % record_len != 0 {
        return Err(FinetuneError::MalformedData {
            path: path.to_path_buf(),
            msg:  format!(
                "length {} is not a multiple of the {}-byte record size",
                bytes.len(),
                record_len
            ),
        });
    }

    bytes
        .chunks_exact(record_len)
        .enumerate()
        .map(|(i, record)| {
            // CIFAR-100 puts the coarse label first; the fine label is the last label byte
            let label = record[label_bytes - 1] as usize;
            if label >= kind.num_classes() {
                return Err(FinetuneError::MalformedData {
                    path: path.to_path_buf(),
                    msg:  format!("record {i} has label {label} >= {}", kind.num_classes()),
                });
            }
            Ok(RawImage::new(record[label_bytes..].to_vec(), label))
        })
        .collect()
}

/// One class name per non-empty line, in label order.
pub fn parse_class_names(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
