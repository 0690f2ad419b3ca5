//! Stateless coordinate transforms shared by the dataset readers.

use super::bbox::BBoxXYXY;
use super::space::{Normalized, Pixel};
use crate::error::CanonlabelError;

/// Converts a top-left corner plus extents into an XYXY pixel box.
///
/// Negative extents (seen in exports from noisy detectors) are clamped to
/// zero, so the result is a degenerate box anchored at `(x, y)` instead of
/// an unordered one. Use [`xywh_extents_clamped`] to find out whether that
/// happened.
pub fn xywh_to_xyxy(x: f64, y: f64, width: f64, height: f64) -> BBoxXYXY<Pixel> {
    BBoxXYXY::from_xywh(x, y, width.max(0.0), height.max(0.0))
}

/// Returns true if [`xywh_to_xyxy`] or [`yolo_to_xyxy`] would clamp either extent.
pub fn xywh_extents_clamped(width: f64, height: f64) -> bool {
    width < 0.0 || height < 0.0
}

/// Converts a YOLO center/extent box into a unit-interval XYXY box.
///
/// Negative extents are clamped to zero like in [`xywh_to_xyxy`], leaving a
/// degenerate box at the center. Corners outside `[0, 1]` pass through.
pub fn yolo_to_xyxy(x_center: f64, y_center: f64, width: f64, height: f64) -> BBoxXYXY<Normalized> {
    BBoxXYXY::from_cxcywh(x_center, y_center, width.max(0.0), height.max(0.0))
}

/// Scales a unit-interval box to the pixel grid of a `width` x `height` image.
pub fn xyxy_norm_to_abs(
    bbox: &BBoxXYXY<Normalized>,
    width: u32,
    height: u32,
) -> Result<BBoxXYXY<Pixel>, CanonlabelError> {
    check_dimensions(width as usize, height as usize)?;
    Ok(bbox.to_pixel(f64::from(width), f64::from(height)))
}

/// Scales a pixel box of a `width` x `height` image to the unit interval.
pub fn xyxy_norm(
    bbox: &BBoxXYXY<Pixel>,
    width: u32,
    height: u32,
) -> Result<BBoxXYXY<Normalized>, CanonlabelError> {
    check_dimensions(width as usize, height as usize)?;
    Ok(bbox.to_normalized(f64::from(width), f64::from(height)))
}

pub(crate) fn check_dimensions(width: usize, height: usize) -> Result<(), CanonlabelError> {
    if width == 0 || height == 0 {
        return Err(CanonlabelError::InvalidImageDimensions { width, height });
    }
    Ok(())
}
