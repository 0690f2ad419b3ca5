//! COCO-backed annotation source.
//!
//! A split is an images directory plus one JSON annotation index following
//! the usual `images` / `annotations` / `categories` schema. COCO boxes are
//! `[x, y, width, height]` with `(x, y)` the top-left corner in pixels; they
//! are converted to canonical XYXY on load.
//!
//! Images listed in the index but absent from disk are skipped with a
//! warning. Partial mirrors and filtered exports are common, so this is not
//! an error. A `file_name` that is absolute or climbs out of the images
//! directory with `..` is rejected.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use super::catalog::{ClassCatalog, RawCategoryMap};
use super::geometry::{xywh_extents_clamped, xywh_to_xyxy};
use super::ids::{ImageId, RawCategoryId};
use super::record::{AnnotationRecord, ImageRef};
use super::source::{AnnotationSource, EvaluationSource, Split};
use crate::error::CanonlabelError;

// ============================================================================
// COCO Schema Types (internal to this module)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CocoIndex {
    images: Vec<CocoImage>,

    #[serde(default)]
    annotations: Vec<CocoAnnotation>,

    categories: Vec<CocoCategory>,
}

#[derive(Debug, Deserialize)]
struct CocoImage {
    id: u64,
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct CocoCategory {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CocoAnnotation {
    #[serde(default)]
    id: Option<u64>,
    image_id: u64,
    category_id: u64,

    /// `[x, y, width, height]`, top-left corner in pixels.
    bbox: [f64; 4],
}

// ============================================================================
// Layout
// ============================================================================

/// Where a COCO split lives on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CocoLayout {
    /// The JSON annotation index.
    pub annotation_file: PathBuf,
    /// Directory the index's `file_name`s are relative to.
    pub images_dir: PathBuf,
}

impl CocoLayout {
    /// The COCO 2017 layout: `root/annotations/instances_<split>2017.json`
    /// with images in `root/<split>2017/`.
    pub fn standard(root: &Path, split: Split) -> Self {
        Self {
            annotation_file: root
                .join("annotations")
                .join(format!("instances_{}2017.json", split)),
            images_dir: root.join(format!("{}2017", split)),
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Canonical records read from a COCO split.
#[derive(Debug)]
pub struct CocoSource {
    layout: CocoLayout,
    records: Vec<AnnotationRecord>,
    catalog: ClassCatalog,
    category_map: RawCategoryMap,
    image_paths: HashMap<ImageId, PathBuf>,
    total_images: usize,
    skipped_images: usize,
}

impl CocoSource {
    /// Opens `split` of a dataset stored in the standard COCO 2017 layout.
    ///
    /// # Example
    /// ```no_run
    /// use std::path::Path;
    /// use canonlabel::ir::{io_coco_json::CocoSource, AnnotationSource, Split};
    ///
    /// let source = CocoSource::open(Path::new("/data/coco"), Split::Val)?;
    /// println!("{} records", source.records().len());
    /// # Ok::<(), canonlabel::CanonlabelError>(())
    /// ```
    pub fn open(root: &Path, split: Split) -> Result<Self, CanonlabelError> {
        Self::from_layout(CocoLayout::standard(root, split))
    }

    /// Reads the annotation index named by `layout` and scans its images.
    pub fn from_layout(layout: CocoLayout) -> Result<Self, CanonlabelError> {
        if !layout.annotation_file.is_file() {
            return Err(CanonlabelError::CocoLayoutInvalid {
                path: layout.annotation_file.clone(),
                message: "annotation index not found".to_string(),
            });
        }

        info!(
            "Loading annotations from {}",
            layout.annotation_file.display()
        );
        let file = File::open(&layout.annotation_file).map_err(CanonlabelError::Io)?;
        let index: CocoIndex = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            CanonlabelError::CocoJsonParse {
                path: layout.annotation_file.clone(),
                source,
            }
        })?;

        Self::build(index, layout)
    }

    /// Builds a source from an in-memory annotation index.
    pub fn from_coco_str(json: &str, images_dir: &Path) -> Result<Self, CanonlabelError> {
        Self::from_coco_slice(json.as_bytes(), images_dir)
    }

    /// Builds a source from raw annotation index bytes.
    pub fn from_coco_slice(bytes: &[u8], images_dir: &Path) -> Result<Self, CanonlabelError> {
        let layout = CocoLayout {
            annotation_file: PathBuf::from("<memory>"),
            images_dir: images_dir.to_path_buf(),
        };
        let index: CocoIndex =
            serde_json::from_slice(bytes).map_err(|source| CanonlabelError::CocoJsonParse {
                path: layout.annotation_file.clone(),
                source,
            })?;
        Self::build(index, layout)
    }

    pub fn layout(&self) -> &CocoLayout {
        &self.layout
    }

    /// Path of any image listed in the index, retained or not.
    pub fn image_path(&self, id: ImageId) -> Option<&Path> {
        self.image_paths.get(&id).map(PathBuf::as_path)
    }

    pub fn image_paths(&self) -> &HashMap<ImageId, PathBuf> {
        &self.image_paths
    }

    pub fn category_map(&self) -> &RawCategoryMap {
        &self.category_map
    }

    /// Number of images listed in the index.
    pub fn total_images(&self) -> usize {
        self.total_images
    }

    /// Number of listed images skipped because their file was missing.
    pub fn skipped_images(&self) -> usize {
        self.skipped_images
    }

    fn build(index: CocoIndex, layout: CocoLayout) -> Result<Self, CanonlabelError> {
        let catalog =
            ClassCatalog::with_background(index.categories.iter().map(|cat| cat.name.clone()))?;
        let category_map = RawCategoryMap::from_ordered(
            index
                .categories
                .iter()
                .map(|cat| RawCategoryId::new(cat.id)),
        )?;

        let mut annotations_by_image: HashMap<u64, Vec<&CocoAnnotation>> = HashMap::new();
        for ann in &index.annotations {
            annotations_by_image
                .entry(ann.image_id)
                .or_default()
                .push(ann);
        }

        let resolved = index
            .images
            .iter()
            .map(|img| resolve_image_path(&layout, img))
            .collect::<Result<Vec<_>, _>>()?;
        let image_paths: HashMap<ImageId, PathBuf> = index
            .images
            .iter()
            .zip(&resolved)
            .map(|(img, path)| (ImageId::new(img.id), path.clone()))
            .collect();

        let mut records = Vec::with_capacity(index.images.len());
        let mut skipped_images = 0usize;

        for (image, image_path) in index.images.iter().zip(resolved) {
            let image_id = ImageId::new(image.id);
            if !image_path.is_file() {
                warn!(
                    "Skipping image_id: {} ({} not found)",
                    image_id,
                    image_path.display()
                );
                skipped_images += 1;
                continue;
            }

            let mut record = AnnotationRecord::new(ImageRef::Id(image_id), image_path);
            for ann in annotations_by_image
                .get(&image.id)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                let [x, y, w, h] = ann.bbox;
                if xywh_extents_clamped(w, h) {
                    warn!(
                        "Annotation {} on image_id {} has negative extent ({}x{}); clamped to zero",
                        ann.id.map_or_else(|| "?".to_string(), |id| id.to_string()),
                        image_id,
                        w,
                        h
                    );
                }
                let label = category_map.remap(RawCategoryId::new(ann.category_id), || {
                    format!(
                        "annotation {} of image_id {}",
                        ann.id.map_or_else(|| "?".to_string(), |id| id.to_string()),
                        image_id
                    )
                })?;
                record.push(xywh_to_xyxy(x, y, w, h), label);
            }
            records.push(record);
        }

        let total_images = index.images.len();
        let retained = total_images - skipped_images;
        if skipped_images > 0 {
            warn!(
                "Out of {} images, {} have been skipped, leaving {} to be used",
                total_images, skipped_images, retained
            );
        } else {
            info!(
                "Out of {} images, {} have been skipped, leaving {} to be used",
                total_images, skipped_images, retained
            );
        }

        Ok(Self {
            layout,
            records,
            catalog,
            category_map,
            image_paths,
            total_images,
            skipped_images,
        })
    }
}

/// Joins `file_name` onto the images directory, refusing anything that could
/// resolve outside it.
fn resolve_image_path(layout: &CocoLayout, image: &CocoImage) -> Result<PathBuf, CanonlabelError> {
    let relative = Path::new(&image.file_name);
    let contained = relative.components().next().is_some()
        && relative
            .components()
            .all(|part| matches!(part, Component::Normal(_) | Component::CurDir));
    if !contained {
        return Err(CanonlabelError::CocoLayoutInvalid {
            path: layout.annotation_file.clone(),
            message: format!(
                "image_id {} has file_name '{}'; expected a relative path inside {}",
                image.id,
                image.file_name,
                layout.images_dir.display()
            ),
        });
    }
    Ok(layout.images_dir.join(relative))
}

impl AnnotationSource for CocoSource {
    fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    fn format_name(&self) -> &'static str {
        "coco"
    }
}

impl EvaluationSource for CocoSource {}
