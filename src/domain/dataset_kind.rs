use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::FinetuneError;

/// Datasets the provider knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Cifar10,
    Cifar100,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 2] = [DatasetKind::Cifar10, DatasetKind::Cifar100];

    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Cifar10 => "cifar10",
            DatasetKind::Cifar100 => "cifar100",
        }
    }

    pub fn num_classes(self) -> usize {
        match self {
            DatasetKind::Cifar10 => 10,
            DatasetKind::Cifar100 => 100,
        }
    }

    /// Number of samples in the given split of the official release.
    pub fn split_len(self, split: Split) -> usize {
        match split {
            Split::Train => 50_000,
            Split::Test => 10_000,
        }
    }

    /// Bytes in front of the pixel data of every record:
    /// CIFAR-10 stores one label, CIFAR-100 stores coarse + fine.
    pub fn label_bytes(self) -> usize {
        match self {
            DatasetKind::Cifar10 => 1,
            DatasetKind::Cifar100 => 2,
        }
    }

    /// Comma separated list of accepted identifiers, for error messages.
    pub fn supported() -> String {
        Self::ALL
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for DatasetKind {
    type Err = FinetuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cifar10" => Ok(DatasetKind::Cifar10),
            "cifar100" => Ok(DatasetKind::Cifar100),
            other => Err(FinetuneError::UnsupportedDataset {
                name:      other.to_string(),
                supported: Self::supported(),
            }),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Train or test partition of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => f.write_str("train"),
            Split::Test => f.write_str("test"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_counts() {
        assert_eq!(DatasetKind::Cifar10.num_classes(), 10);
        assert_eq!(DatasetKind::Cifar100.num_classes(), 100);
    }

    #[test]
    fn test_parse_supported_names() {
        assert_eq!("cifar10".parse::<DatasetKind>().unwrap(), DatasetKind::Cifar10);
        assert_eq!("cifar100".parse::<DatasetKind>().unwrap(), DatasetKind::Cifar100);
    }

    #[test]
    fn test_names_must_match_exactly() {
        for name in ["cifar-10", "CIFAR100", " cifar100", "cifar10 ", "Cifar-100", ""] {
            assert!(
                matches!(name.parse::<DatasetKind>(), Err(FinetuneError::UnsupportedDataset { .. })),
                "'{name}' should be rejected",
            );
        }
    }

    #[test]
    fn test_unsupported_name_lists_choices() {
        let err = "imagenet".parse::<DatasetKind>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("imagenet"));
        assert!(msg.contains("cifar10"));
        assert!(msg.contains("cifar100"));
    }

    #[test]
    fn test_split_sizes() {
        for kind in DatasetKind::ALL {
            assert_eq!(kind.split_len(Split::Train), 50_000);
            assert_eq!(kind.split_len(Split::Test), 10_000);
        }
    }
}
