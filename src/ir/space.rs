//! Coordinate space markers.
//!
//! Uninhabited types used only as type parameters, so a pixel box can never
//! be passed where a unit-interval box is expected.

/// Absolute pixel coordinates of a specific image, origin at the top-left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Coordinates expressed as fractions of the image width and height.
///
/// Values inside the image fall in `[0, 1]`; nothing forces them to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Normalized {}
