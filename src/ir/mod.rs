//! Canonical representation of detection annotations.
//!
//! Every reader turns its on-disk format into the same shape: an ordered
//! list of [`AnnotationRecord`]s (pixel-space XYXY boxes with parallel
//! class indices) plus a [`ClassCatalog`] whose index 0 is `BACKGROUND`.
//!
//! # Design Principles
//!
//! 1. **Type Safety**: pixel and unit-interval boxes are different types,
//!    and raw source category ids never mix with catalog indices.
//!
//! 2. **One Coordinate System**: records always hold XYXY pixel boxes;
//!    normalized boxes are derived on access and never stored.
//!
//! 3. **Fail Loudly on Structure**: layout and category problems abort the
//!    load with the offending path; only missing COCO images are skipped.
//!
//! # Example
//!
//! ```
//! use canonlabel::ir::{geometry, ClassCatalog};
//!
//! let catalog = ClassCatalog::with_background(["person", "car"]).unwrap();
//! assert_eq!(catalog.names()[0], "BACKGROUND");
//!
//! let bbox = geometry::xywh_to_xyxy(10.0, 20.0, 30.0, 40.0);
//! assert_eq!(bbox.to_array(), [10.0, 20.0, 40.0, 60.0]);
//! ```

mod bbox;
mod catalog;
pub mod geometry;
mod ids;
pub mod io_coco_json;
pub mod io_yolo;
mod record;
mod source;
mod space;

pub use bbox::BBoxXYXY;
pub use catalog::{ClassCatalog, RawCategoryMap, BACKGROUND};
pub use ids::{ClassIndex, ImageId, RawCategoryId};
pub use record::{AnnotationRecord, ImageRef};
pub use source::{AnnotationSource, EvaluationSource, Split};
pub use space::{Normalized, Pixel};
