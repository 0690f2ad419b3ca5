//! Canonical per-image annotation records.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::bbox::BBoxXYXY;
use super::ids::{ClassIndex, ImageId};
use super::space::Pixel;

/// How a record refers to its image.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ImageRef {
    /// An image id from a COCO annotation index.
    Id(ImageId),
    /// A path on disk (YOLO stills).
    Path(PathBuf),
}

impl ImageRef {
    pub fn as_id(&self) -> Option<ImageId> {
        match self {
            ImageRef::Id(id) => Some(*id),
            ImageRef::Path(_) => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ImageRef::Id(_) => None,
            ImageRef::Path(path) => Some(path),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Id(id) => write!(f, "image {}", id),
            ImageRef::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One image's boxes and labels after format-specific parsing.
///
/// Boxes are pixel XYXY; `labels[i]` is the class of `boxes[i]`. Fields are
/// private so the two sequences can only be built together.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationRecord {
    image: ImageRef,
    image_path: PathBuf,
    boxes: Vec<BBoxXYXY<Pixel>>,
    labels: Vec<ClassIndex>,
}

impl AnnotationRecord {
    /// Creates a record with no boxes.
    pub fn new(image: ImageRef, image_path: impl Into<PathBuf>) -> Self {
        Self {
            image,
            image_path: image_path.into(),
            boxes: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Appends one labelled box.
    pub fn push(&mut self, bbox: BBoxXYXY<Pixel>, label: ClassIndex) {
        self.boxes.push(bbox);
        self.labels.push(label);
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    /// File the image is decoded from.
    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn boxes(&self) -> &[BBoxXYXY<Pixel>] {
        &self.boxes
    }

    pub fn labels(&self) -> &[ClassIndex] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Returns true if any box carries `class`.
    pub fn contains_class(&self, class: ClassIndex) -> bool {
        self.labels.contains(&class)
    }
}
