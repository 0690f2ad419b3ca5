//! Dataset summary report.

use std::fmt;

use serde::Serialize;

use crate::ir::{AnnotationRecord, ClassCatalog};

/// Record count, balancing watermark and per-class box counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub images: usize,
    /// Set only when class balancing ran.
    pub min_images_per_class: Option<usize>,
    /// `(class name, box count)` in catalog order, background included.
    pub class_counts: Vec<(String, usize)>,
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset Summary:")?;
        writeln!(f, "Number of Images: {}", self.images)?;
        match self.min_images_per_class {
            Some(min) => writeln!(f, "Minimum Number of Images for a Class: {}", min)?,
            None => writeln!(f, "Minimum Number of Images for a Class: -1")?,
        }
        writeln!(f, "Label Distribution:")?;
        for (name, count) in &self.class_counts {
            writeln!(f, "\t{}: {}", name, count)?;
        }
        Ok(())
    }
}

/// Counts boxes per catalog index over `records`.
pub(crate) fn count_class_occurrences<'a>(
    records: impl Iterator<Item = &'a AnnotationRecord>,
    catalog: &ClassCatalog,
) -> Vec<usize> {
    let mut counts = vec![0usize; catalog.len()];
    for record in records {
        for label in record.labels() {
            if let Some(count) = counts.get_mut(label.as_usize()) {
                *count += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BBoxXYXY, ClassIndex, ImageId, ImageRef};

    #[test]
    fn counts_every_box() {
        let catalog = ClassCatalog::with_background(["cat", "dog"]).expect("catalog");
        let mut record = AnnotationRecord::new(ImageRef::Id(ImageId(1)), "a.jpg");
        record.push(BBoxXYXY::default(), ClassIndex(2));
        record.push(BBoxXYXY::default(), ClassIndex(2));
        record.push(BBoxXYXY::default(), ClassIndex(1));

        let counts = count_class_occurrences([record].iter(), &catalog);
        assert_eq!(counts, vec![0, 1, 2]);
    }

    #[test]
    fn display_uses_minus_one_when_unbalanced() {
        let summary = DatasetSummary {
            images: 3,
            min_images_per_class: None,
            class_counts: vec![("BACKGROUND".to_string(), 0), ("cat".to_string(), 4)],
        };
        let text = summary.to_string();
        assert!(text.starts_with("Dataset Summary:\n"));
        assert!(text.contains("Number of Images: 3\n"));
        assert!(text.contains("Minimum Number of Images for a Class: -1\n"));
        assert!(text.contains("\tcat: 4\n"));
    }
}
