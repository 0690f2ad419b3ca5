//! Indexed access to canonical records with lazy image loading.
//!
//! A [`DetectionDataset`] wraps one [`AnnotationSource`]. Each access decodes
//! the image from disk, copies the record's boxes and labels, runs the
//! optional sample transform, scales boxes to the unit interval using the
//! *output* image's width and height, and finally runs the target encoder.
//!
//! ```no_run
//! use std::path::Path;
//! use canonlabel::dataset::{BalancePolicy, DetectionDataset};
//! use canonlabel::ir::{io_yolo::YoloSource, Split};
//!
//! let source = YoloSource::open(Path::new("/data/frames"), Split::Train)?;
//! let dataset = DetectionDataset::builder(source)
//!     .balance(BalancePolicy::KeepEarliest)
//!     .build();
//!
//! let sample = dataset.get(0)?;
//! println!("{} boxes, {}", sample.targets.boxes.len(), dataset.summary());
//! # Ok::<(), canonlabel::CanonlabelError>(())
//! ```

pub mod balance;
mod decode;
mod summary;

pub use balance::{balance_records, images_per_class, BalanceOutcome, BalancePolicy};
pub use decode::{decode_image, AxisOrder, ImageArray};
pub use summary::DatasetSummary;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use log::info;
use serde::Serialize;

use crate::diagnostics::{build_panels, Visualizer};
use crate::error::CanonlabelError;
use crate::ir::{
    AnnotationRecord, AnnotationSource, BBoxXYXY, ClassCatalog, ClassIndex, EvaluationSource,
    ImageRef, Normalized, Pixel,
};

/// Image + box + label transform (crop, flip, jitter, resize, to-tensor...).
///
/// Returned boxes must be in pixel coordinates of the returned image, and
/// one label must remain per box.
pub type SampleTransform = Box<
    dyn Fn(
            ImageArray,
            Vec<BBoxXYXY<Pixel>>,
            Vec<ClassIndex>,
        )
            -> Result<(ImageArray, Vec<BBoxXYXY<Pixel>>, Vec<ClassIndex>), CanonlabelError>
        + Send
        + Sync,
>;

/// Boxes with one label each.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(bound = "")]
pub struct BoxTargets<TSpace> {
    pub boxes: Vec<BBoxXYXY<TSpace>>,
    pub labels: Vec<ClassIndex>,
}

/// Ground truth in the shape detection evaluation expects.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationTargets {
    pub boxes: Vec<BBoxXYXY<Normalized>>,
    pub labels: Vec<ClassIndex>,
    /// Always zero; the supported formats carry no "difficult" flag.
    pub is_difficult: Vec<u8>,
}

/// One served sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample<T> {
    pub image_ref: ImageRef,
    pub image: ImageArray,
    pub targets: T,
}

/// Turns normalized boxes and labels into training targets.
///
/// Implemented for any `Fn(BoxTargets<Normalized>) -> Result<T, _>`.
pub trait TargetEncoder: Send + Sync {
    type Output;

    fn encode(&self, targets: BoxTargets<Normalized>) -> Result<Self::Output, CanonlabelError>;
}

/// Returns normalized boxes and labels unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThrough;

impl TargetEncoder for PassThrough {
    type Output = BoxTargets<Normalized>;

    fn encode(&self, targets: BoxTargets<Normalized>) -> Result<Self::Output, CanonlabelError> {
        Ok(targets)
    }
}

impl<F, T> TargetEncoder for F
where
    F: Fn(BoxTargets<Normalized>) -> Result<T, CanonlabelError> + Send + Sync,
{
    type Output = T;

    fn encode(&self, targets: BoxTargets<Normalized>) -> Result<T, CanonlabelError> {
        self(targets)
    }
}

/// Configures and builds a [`DetectionDataset`].
pub struct DatasetBuilder<S, E = PassThrough> {
    source: S,
    transform: Option<SampleTransform>,
    encoder: E,
    balance: Option<BalancePolicy>,
    visualizer: Option<Arc<dyn Visualizer>>,
}

impl<S: AnnotationSource> DatasetBuilder<S, PassThrough> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            transform: None,
            encoder: PassThrough,
            balance: None,
            visualizer: None,
        }
    }
}

impl<S: AnnotationSource, E: TargetEncoder> DatasetBuilder<S, E> {
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(
                ImageArray,
                Vec<BBoxXYXY<Pixel>>,
                Vec<ClassIndex>,
            )
                -> Result<(ImageArray, Vec<BBoxXYXY<Pixel>>, Vec<ClassIndex>), CanonlabelError>
            + Send
            + Sync
            + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Drops whole records at build time so classes are evenly represented.
    pub fn balance(mut self, policy: BalancePolicy) -> Self {
        self.balance = Some(policy);
        self
    }

    /// Enables per-access diagnostics.
    pub fn visualizer(mut self, visualizer: Arc<dyn Visualizer>) -> Self {
        self.visualizer = Some(visualizer);
        self
    }

    pub fn target_encoder<E2: TargetEncoder>(self, encoder: E2) -> DatasetBuilder<S, E2> {
        DatasetBuilder {
            source: self.source,
            transform: self.transform,
            encoder,
            balance: self.balance,
            visualizer: self.visualizer,
        }
    }

    pub fn build(self) -> DetectionDataset<S, E> {
        let records = self.source.records();
        let (retained, min_images_per_class) = match self.balance {
            Some(policy) => {
                let outcome = balance_records(records, self.source.catalog().len(), policy);
                info!(
                    "Balanced {} dataset: kept {} of {} record(s), at most {} per class",
                    self.source.format_name(),
                    outcome.retained.len(),
                    records.len(),
                    outcome.min_images_per_class
                );
                (outcome.retained, Some(outcome.min_images_per_class))
            }
            None => ((0..records.len()).collect(), None),
        };

        DetectionDataset {
            source: self.source,
            retained,
            min_images_per_class,
            transform: self.transform,
            encoder: self.encoder,
            visualizer: self.visualizer,
            class_counts: OnceLock::new(),
        }
    }
}

/// Read-only, indexable view over an annotation source.
///
/// Safe to share across threads: the only lazily filled state is the class
/// statistics cache, which is guarded by a [`OnceLock`].
pub struct DetectionDataset<S, E = PassThrough> {
    source: S,
    retained: Vec<usize>,
    min_images_per_class: Option<usize>,
    transform: Option<SampleTransform>,
    encoder: E,
    visualizer: Option<Arc<dyn Visualizer>>,
    class_counts: OnceLock<Vec<usize>>,
}

impl<S: AnnotationSource> DetectionDataset<S, PassThrough> {
    pub fn builder(source: S) -> DatasetBuilder<S, PassThrough> {
        DatasetBuilder::new(source)
    }

    /// A dataset with no transform, encoder, balancing or diagnostics.
    pub fn new(source: S) -> Self {
        DatasetBuilder::new(source).build()
    }
}

impl<S: AnnotationSource, E: TargetEncoder> DetectionDataset<S, E> {
    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn catalog(&self) -> &ClassCatalog {
        self.source.catalog()
    }

    pub fn class_dict(&self) -> &HashMap<String, ClassIndex> {
        self.source.catalog().class_dict()
    }

    /// The balancing watermark, if balancing ran.
    pub fn min_images_per_class(&self) -> Option<usize> {
        self.min_images_per_class
    }

    /// Retained records in order.
    pub fn records(&self) -> impl Iterator<Item = &AnnotationRecord> + '_ {
        let all = self.source.records();
        self.retained.iter().map(move |&i| &all[i])
    }

    pub fn record(&self, index: usize) -> Result<&AnnotationRecord, CanonlabelError> {
        let position = self
            .retained
            .get(index)
            .copied()
            .ok_or(CanonlabelError::IndexOutOfRange {
                index,
                len: self.len(),
            })?;
        Ok(&self.source.records()[position])
    }

    /// Transformed sample with boxes still in pixel coordinates.
    pub fn get_pixel(&self, index: usize) -> Result<Sample<BoxTargets<Pixel>>, CanonlabelError> {
        self.load(index, true)
    }

    /// Transformed sample with unit-interval boxes, passed through the
    /// target encoder.
    pub fn get(&self, index: usize) -> Result<Sample<E::Output>, CanonlabelError> {
        let sample = self.get_pixel(index)?;
        let targets = normalize_targets(&sample.image, sample.targets)?;
        let targets = self.encoder.encode(targets)?;
        Ok(Sample {
            image_ref: sample.image_ref,
            image: sample.image,
            targets,
        })
    }

    /// Decoded and transformed image only.
    pub fn get_image(&self, index: usize) -> Result<ImageArray, CanonlabelError> {
        Ok(self.load(index, false)?.image)
    }

    /// Per-class box counts in catalog order, computed on first use.
    pub fn class_counts(&self) -> &[usize] {
        self.class_counts.get_or_init(|| {
            summary::count_class_occurrences(self.records(), self.source.catalog())
        })
    }

    pub fn summary(&self) -> DatasetSummary {
        let class_counts = self
            .catalog()
            .names()
            .iter()
            .cloned()
            .zip(self.class_counts().iter().copied())
            .collect();
        DatasetSummary {
            images: self.len(),
            min_images_per_class: self.min_images_per_class,
            class_counts,
        }
    }

    fn load(
        &self,
        index: usize,
        visualize: bool,
    ) -> Result<Sample<BoxTargets<Pixel>>, CanonlabelError> {
        let record = self.record(index)?;
        let decoded = decode_image(record.image_path())?;
        let boxes = record.boxes().to_vec();
        let labels = record.labels().to_vec();

        let visualizer = self.visualizer.as_ref().filter(|_| visualize);
        let before = visualizer.map(|_| (decoded.clone(), boxes.clone()));

        let image = ImageArray::from_rgb(&decoded)?;
        let (image, boxes, labels) = match &self.transform {
            Some(transform) => transform(image, boxes, labels)?,
            None => (image, boxes, labels),
        };

        if boxes.len() != labels.len() {
            return Err(CanonlabelError::TransformMismatch {
                index,
                boxes: boxes.len(),
                labels: labels.len(),
            });
        }

        if let (Some(visualizer), Some((before_image, before_boxes))) = (visualizer, before) {
            let panels = build_panels(
                &before_image,
                &before_boxes,
                &image,
                &boxes,
                &labels,
                self.source.catalog(),
            )?;
            visualizer.show(&panels)?;
        }

        Ok(Sample {
            image_ref: record.image().clone(),
            image,
            targets: BoxTargets { boxes, labels },
        })
    }
}

impl<S: EvaluationSource, E: TargetEncoder> DetectionDataset<S, E> {
    /// Image reference plus normalized boxes, labels and all-zero
    /// `is_difficult` flags. The target encoder is not applied.
    pub fn get_annotation(
        &self,
        index: usize,
    ) -> Result<(ImageRef, AnnotationTargets), CanonlabelError> {
        let sample = self.get_pixel(index)?;
        let targets = normalize_targets(&sample.image, sample.targets)?;
        let is_difficult = vec![0u8; targets.boxes.len()];
        Ok((
            sample.image_ref,
            AnnotationTargets {
                boxes: targets.boxes,
                labels: targets.labels,
                is_difficult,
            },
        ))
    }
}

impl<S: AnnotationSource, E: TargetEncoder> fmt::Display for DetectionDataset<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

impl<S: AnnotationSource, E> fmt::Debug for DetectionDataset<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionDataset")
            .field("format", &self.source.format_name())
            .field("len", &self.retained.len())
            .field("min_images_per_class", &self.min_images_per_class)
            .field("transform", &self.transform.is_some())
            .field("visualizer", &self.visualizer.is_some())
            .finish_non_exhaustive()
    }
}

/// Divides x by the image width and y by the image height.
fn normalize_targets(
    image: &ImageArray,
    targets: BoxTargets<Pixel>,
) -> Result<BoxTargets<Normalized>, CanonlabelError> {
    let (width, height) = (image.width(), image.height());
    crate::ir::geometry::check_dimensions(width, height)?;
    let boxes = targets
        .boxes
        .iter()
        .map(|bbox| bbox.to_normalized(width as f64, height as f64))
        .collect();
    Ok(BoxTargets {
        boxes,
        labels: targets.labels,
    })
}
