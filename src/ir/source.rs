//! The capability shared by every dataset reader.

use std::fmt;
use std::str::FromStr;

use super::catalog::ClassCatalog;
use super::record::AnnotationRecord;
use crate::error::CanonlabelError;

/// A scanned dataset: canonical records plus the catalog they index into.
///
/// Implementors build everything once at construction and never mutate it
/// afterwards, so `&self` access is safe from any number of readers.
pub trait AnnotationSource {
    /// Records in load order.
    fn records(&self) -> &[AnnotationRecord];

    fn catalog(&self) -> &ClassCatalog;

    /// Short human-readable name of the format, used in logs and reports.
    fn format_name(&self) -> &'static str;
}

/// Marker for sources whose samples can feed detection evaluation.
///
/// Gates [`DetectionDataset::get_annotation`](crate::dataset::DetectionDataset::get_annotation).
pub trait EvaluationSource: AnnotationSource {}

/// Dataset split selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Split {
    #[default]
    Train,
    Val,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = CanonlabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            other => Err(CanonlabelError::UnsupportedFormat(format!(
                "split '{}' (supported: train, val)",
                other
            ))),
        }
    }
}
