//! Per-sample visual diagnostics.
//!
//! When a dataset has a [`Visualizer`] configured, every access builds three
//! panels for manual inspection: the image before the transform (squared to
//! [`PANEL_SIZE`]) with its boxes, the transformed image, and the
//! transformed image with boxes and class names. Panels are built from
//! copies, so a visualizer can never change what the dataset returns.
//!
//! Rendering belongs to the visualizer. [`GridFileVisualizer`] draws box
//! outlines, plus label captions when given a font, and writes each request
//! as a PNG strip.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ab_glyph::{Font, FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::debug;

use crate::dataset::ImageArray;
use crate::error::CanonlabelError;
use crate::ir::{BBoxXYXY, ClassCatalog, ClassIndex, Pixel};

/// Side length of the squared pre-transform panel.
pub const PANEL_SIZE: u32 = 300;

const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const CAPTION_TEXT: Rgb<u8> = Rgb([0, 0, 0]);
const CAPTION_SCALE: f32 = 14.0;

/// A rectangle to draw over a panel, optionally captioned.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub bbox: BBoxXYXY<Pixel>,
    pub label: Option<String>,
}

/// One image of a comparison grid.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualPanel {
    pub image: RgbImage,
    pub overlays: Vec<Overlay>,
}

/// Renders an ordered sequence of panels as a comparison grid.
pub trait Visualizer: Send + Sync {
    fn show(&self, panels: &[VisualPanel]) -> Result<(), CanonlabelError>;
}

/// Pads `image` to a centred square filled with `fill`, then resizes it to
/// `size` x `size`.
///
/// Returns the square image and the function mapping a box of the input
/// onto it.
pub fn make_square(
    image: &RgbImage,
    fill: Rgb<u8>,
    size: u32,
) -> (RgbImage, impl Fn(&BBoxXYXY<Pixel>) -> BBoxXYXY<Pixel>) {
    let (width, height) = image.dimensions();
    let side = width.max(height).max(1);
    let offset_x = (side - width) / 2;
    let offset_y = (side - height) / 2;

    let mut canvas = RgbImage::from_pixel(side, side, fill);
    imageops::replace(&mut canvas, image, i64::from(offset_x), i64::from(offset_y));
    let squared = imageops::resize(&canvas, size, size, FilterType::Triangle);

    let scale = f64::from(size) / f64::from(side);
    let (ox, oy) = (f64::from(offset_x), f64::from(offset_y));
    let map_box = move |bbox: &BBoxXYXY<Pixel>| {
        BBoxXYXY::from_xyxy(
            (bbox.xmin() + ox) * scale,
            (bbox.ymin() + oy) * scale,
            (bbox.xmax() + ox) * scale,
            (bbox.ymax() + oy) * scale,
        )
    };
    (squared, map_box)
}

/// Builds the before / after / after-with-labels panels for one sample.
pub fn build_panels(
    before: &RgbImage,
    before_boxes: &[BBoxXYXY<Pixel>],
    after: &ImageArray,
    after_boxes: &[BBoxXYXY<Pixel>],
    after_labels: &[ClassIndex],
    catalog: &ClassCatalog,
) -> Result<Vec<VisualPanel>, CanonlabelError> {
    let (square, map_box) = make_square(before, Rgb([0, 0, 0]), PANEL_SIZE);
    let before_panel = VisualPanel {
        image: square,
        overlays: before_boxes
            .iter()
            .map(|bbox| Overlay {
                bbox: map_box(bbox),
                label: None,
            })
            .collect(),
    };

    let after_image = after.to_rgb_image()?;
    let after_panel = VisualPanel {
        image: after_image.clone(),
        overlays: Vec::new(),
    };

    let labelled_panel = VisualPanel {
        image: after_image,
        overlays: after_boxes
            .iter()
            .zip(after_labels)
            .map(|(bbox, label)| Overlay {
                bbox: *bbox,
                label: Some(
                    catalog
                        .name(*label)
                        .map(str::to_string)
                        .unwrap_or_else(|| label.to_string()),
                ),
            })
            .collect(),
    };

    Ok(vec![before_panel, after_panel, labelled_panel])
}

/// Draws the outline of every overlay onto `image`, clipped to its bounds.
pub fn draw_overlays(image: &mut RgbImage, overlays: &[Overlay], color: Rgb<u8>) {
    for overlay in overlays {
        if let Some(rect) = clip_to_image(image, &overlay.bbox) {
            draw_outline(image, rect, color, BOX_THICKNESS);
        }
    }
}

/// Writes each overlay's label on a filled tag above its top-left corner.
/// Overlays without a label are skipped.
pub fn draw_captions(image: &mut RgbImage, overlays: &[Overlay], color: Rgb<u8>, font: &impl Font) {
    let scale = PxScale::from(CAPTION_SCALE);
    for overlay in overlays {
        let (Some(label), Some(rect)) = (&overlay.label, clip_to_image(image, &overlay.bbox)) else {
            continue;
        };
        let (text_w, text_h) = text_size(scale, font, label);
        let tag_h = text_h + 2;
        let tag_y = (rect.top() - tag_h as i32).max(0);
        draw_filled_rect_mut(image, Rect::at(rect.left(), tag_y).of_size(text_w + 4, tag_h), color);
        draw_text_mut(image, CAPTION_TEXT, rect.left() + 2, tag_y + 1, scale, font, label);
    }
}

fn clip_to_image(image: &RgbImage, bbox: &BBoxXYXY<Pixel>) -> Option<Rect> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || !bbox.is_finite() {
        return None;
    }
    let clamp_x = |v: f64| v.round().clamp(0.0, f64::from(width - 1)) as i32;
    let clamp_y = |v: f64| v.round().clamp(0.0, f64::from(height - 1)) as i32;
    let (x0, x1) = (clamp_x(bbox.xmin()), clamp_x(bbox.xmax()));
    let (y0, y1) = (clamp_y(bbox.ymin()), clamp_y(bbox.ymax()));
    if x1 < x0 || y1 < y0 {
        return None;
    }
    Some(Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32))
}

// Thickness grows inwards as nested hollow rectangles.
fn draw_outline(image: &mut RgbImage, rect: Rect, color: Rgb<u8>, thickness: u32) {
    draw_hollow_rect_mut(image, rect, color);
    let (w, h) = (rect.width(), rect.height());
    let inset_limit = thickness.min(w / 2).min(h / 2);
    for t in 1..inset_limit {
        let inner = Rect::at(rect.left() + t as i32, rect.top() + t as i32)
            .of_size((w - 2 * t).max(1), (h - 2 * t).max(1));
        draw_hollow_rect_mut(image, inner, color);
    }
}

/// Writes each request as `sample_NNNNNN.png`, panels side by side.
pub struct GridFileVisualizer {
    dir: PathBuf,
    font: Option<FontVec>,
    written: AtomicUsize,
}

impl GridFileVisualizer {
    /// Creates `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CanonlabelError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(CanonlabelError::Io)?;
        Ok(Self {
            dir,
            font: None,
            written: AtomicUsize::new(0),
        })
    }

    /// Loads a TrueType/OpenType font used to caption labelled overlays.
    pub fn with_font(mut self, path: impl AsRef<Path>) -> Result<Self, CanonlabelError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(CanonlabelError::Io)?;
        let font = FontVec::try_from_vec(bytes).map_err(|err| {
            CanonlabelError::Visualization(format!("{}: {}", path.display(), err))
        })?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of grids written so far.
    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for GridFileVisualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridFileVisualizer")
            .field("dir", &self.dir)
            .field("font", &self.font.is_some())
            .field("written", &self.written)
            .finish()
    }
}

impl Visualizer for GridFileVisualizer {
    fn show(&self, panels: &[VisualPanel]) -> Result<(), CanonlabelError> {
        let width: u32 = panels.iter().map(|p| p.image.width()).sum();
        let height = panels.iter().map(|p| p.image.height()).max().unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(CanonlabelError::Visualization(
                "nothing to draw: all panels are empty".to_string(),
            ));
        }

        let mut grid = RgbImage::new(width, height);
        let mut x = 0i64;
        for panel in panels {
            let mut image = panel.image.clone();
            draw_overlays(&mut image, &panel.overlays, BOX_COLOR);
            if let Some(font) = &self.font {
                draw_captions(&mut image, &panel.overlays, BOX_COLOR, font);
            }
            imageops::replace(&mut grid, &image, x, 0);
            x += i64::from(panel.image.width());
        }

        let n = self.written.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("sample_{:06}.png", n));
        debug!("Writing diagnostic grid {}", path.display());
        grid.save(&path)
            .map_err(|err| CanonlabelError::Visualization(format!("{}: {}", path.display(), err)))
    }
}
